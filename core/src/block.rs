//! Block content hashing, mining, and per-block validation (C5, minus
//! chain-wide concerns which live in `chain.rs` and `state.rs`).

use log::debug;
use serde::{Deserialize, Serialize};
use smellycoin_consensus::matches_difficulty;
use smellycoin_crypto::sha256_hex;

use crate::Transaction;

/// The fixed genesis block hash, reused so chain validation can compare
/// against it without recomputing.
pub const GENESIS_BLOCK_HASH: &str =
    "91a73664bc84c0baa1fc75ea6e4aa6d1d20c5df664c724e3159aefc2e1186627";

/// The genesis block's Unix timestamp.
pub const GENESIS_TIMESTAMP: u64 = 1465154705;

const GENESIS_TX_ID: &str = "e655f6a5f26dc9b4cac6e46f52336428287759cf81ef5ff10854f69d68f43fa3";
const GENESIS_ADDRESS: &str = "04bfcab8722991ae774db48f934ca79cfb7dd991229153b9f732ba5334aafcd8e7266e47076996b55a14bf9913ee3145ce0cfc1372ada8ada74bd287450313534a";

/// Clock skew tolerance applied to both sides of timestamp validity checks.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub hash: String,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    pub timestamp: u64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// The fixed genesis block, matching §6 byte-for-byte.
    pub fn genesis() -> Self {
        let coinbase_in = crate::transaction::TxIn {
            tx_out_id: String::new(),
            tx_out_index: 0,
            signature: String::new(),
        };
        let coinbase_out = crate::transaction::TxOut {
            address: GENESIS_ADDRESS.to_string(),
            amount: 50,
        };
        let genesis_tx = Transaction {
            id: GENESIS_TX_ID.to_string(),
            tx_ins: vec![coinbase_in],
            tx_outs: vec![coinbase_out],
        };

        Block {
            index: 0,
            hash: GENESIS_BLOCK_HASH.to_string(),
            previous_hash: String::new(),
            timestamp: GENESIS_TIMESTAMP,
            data: vec![genesis_tx],
            difficulty: 1,
            nonce: 0,
        }
    }

    /// Recompute this block's content hash from its seven fields plus the
    /// sorted transaction-id list.
    ///
    /// Note: the block's own `data` order is not sorted (coinbase first);
    /// only the ids folded into the hash are sorted lexicographically.
    pub fn recompute_hash(&self) -> String {
        compute_block_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }

    pub fn matches_own_difficulty(&self) -> bool {
        matches_difficulty(&self.hash, self.difficulty)
    }

    /// `new.index == prev.index+1`; linkage; recomputed hash equality;
    /// timestamp validity; proof-of-work match.
    pub fn validate_new_block(new: &Block, prev: &Block, now: u64) -> bool {
        if new.index != prev.index + 1 {
            debug!("block {} rejected: wrong index", new.index);
            return false;
        }
        if new.previous_hash != prev.hash {
            debug!("block {} rejected: previousHash mismatch", new.index);
            return false;
        }
        if new.recompute_hash() != new.hash {
            debug!("block {} rejected: hash mismatch", new.index);
            return false;
        }
        if !is_valid_timestamp(new.timestamp, prev.timestamp, now) {
            debug!("block {} rejected: timestamp out of range", new.index);
            return false;
        }
        if !new.matches_own_difficulty() {
            debug!("block {} rejected: does not meet difficulty", new.index);
            return false;
        }
        true
    }
}

/// `prev.timestamp - 60 < new.timestamp` AND `new.timestamp - 60 < now`.
/// Both strict; the 60-second tolerance absorbs clock skew.
pub fn is_valid_timestamp(new_timestamp: u64, prev_timestamp: u64, now: u64) -> bool {
    let lower_ok = (prev_timestamp as i128 - TIMESTAMP_TOLERANCE_SECS as i128)
        < new_timestamp as i128;
    let upper_ok = (new_timestamp as i128 - TIMESTAMP_TOLERANCE_SECS as i128) < now as i128;
    lower_ok && upper_ok
}

/// Concatenate `decimal(index) || previousHash || decimal(timestamp) ||
/// txIdConcat || decimal(difficulty) || decimal(nonce)` and SHA-256 it,
/// where `txIdConcat` is the block's transaction ids sorted ascending.
pub fn compute_block_hash(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: &[Transaction],
    difficulty: u32,
    nonce: u64,
) -> String {
    let mut ids: Vec<&str> = data.iter().map(|tx| tx.id.as_str()).collect();
    ids.sort_unstable();
    let tx_id_concat = ids.concat();

    let content = format!(
        "{}{}{}{}{}{}",
        index, previous_hash, timestamp, tx_id_concat, difficulty, nonce
    );
    sha256_hex(content.as_bytes())
}

/// Exhaustive nonce search: increment from zero until the content hash
/// matches `difficulty`.
pub fn find_block(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: Vec<Transaction>,
    difficulty: u32,
) -> Block {
    let mut nonce: u64 = 0;
    loop {
        let hash = compute_block_hash(index, previous_hash, timestamp, &data, difficulty, nonce);
        if matches_difficulty(&hash, difficulty) {
            return Block {
                index,
                hash,
                previous_hash: previous_hash.to_string(),
                timestamp,
                data,
                difficulty,
                nonce,
            };
        }
        nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_carries_the_fixed_literal_hash() {
        // The genesis hash is a literal carried over from the original
        // naivecoin chain, not reproducible by `compute_block_hash` (its
        // `data` was stringified differently there) and not a valid
        // proof-of-work for its own difficulty. `validate_chain` never
        // recomputes or PoW-checks it — genesis is compared structurally
        // and `validate_new_block` only ever runs for index > 0.
        let genesis = Block::genesis();
        assert_eq!(genesis.hash, GENESIS_BLOCK_HASH);
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "");
    }

    #[test]
    fn block_one_hash_matches_spec_vector() {
        let hash = compute_block_hash(1, GENESIS_BLOCK_HASH, 1465154715, &[], 0, 0);
        assert_eq!(
            hash,
            "a5d76fec271299ff42eb51d3666f102c34ab9fc86ebb1dbb3edb64a393b1435b"
        );
    }

    #[test]
    fn mining_is_deterministic_for_known_vector() {
        let block = find_block(
            1,
            "9cbfae34f219c6c217ea85a24e94b912a7ec1dc894248bab67fcb27497533a7e",
            1465154725,
            vec![],
            6,
        );
        assert_eq!(block.nonce, 24);
    }

    #[test]
    fn timestamp_validity_is_strict_both_sides() {
        assert!(is_valid_timestamp(1000, 950, 1010));
        // equal to prev - 60 boundary is invalid (strict <)
        assert!(!is_valid_timestamp(890, 950, 1010));
        // too far in the future relative to now
        assert!(!is_valid_timestamp(2000, 950, 1010));
    }
}
