//! The single process-wide mutable state triple: chain, UTXO set, mempool.
//!
//! `NodeState` owns all three and only ever moves them forward together
//! (§5: no state transition is partial). Callers are expected to hold it
//! behind one exclusion primitive (a mutex, in this workspace); mining must
//! snapshot via [`NodeState::mining_template`], search outside the lock,
//! then call [`NodeState::append`] to install a result.

use log::{debug, info};
use smellycoin_consensus::{next_difficulty, RETARGET_INTERVAL};

use crate::block::Block;
use crate::chain::{cumulative_work, validate_chain};
use crate::transaction::Transaction;
use crate::{current_timestamp, CoreError, Mempool, UtxoSet};

pub struct NodeState {
    chain: Vec<Block>,
    utxo_set: UtxoSet,
    mempool: Mempool,
}

impl NodeState {
    /// Start a fresh node at genesis. Matches the Non-goal that a restart
    /// implies genesis: there is no persistent chain storage.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let utxo_set = UtxoSet::new()
            .apply(&genesis.data, genesis.index)
            .expect("genesis block must apply cleanly");
        NodeState {
            chain: vec![genesis],
            utxo_set,
            mempool: Mempool::new(),
        }
    }

    pub fn latest_block(&self) -> &Block {
        self.chain.last().expect("chain is never empty")
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn cumulative_work(&self) -> u128 {
        cumulative_work(&self.chain)
    }

    /// The next block's difficulty, per the retarget rule.
    pub fn next_difficulty(&self) -> u32 {
        let latest = self.latest_block();
        if latest.index % RETARGET_INTERVAL == 0 && latest.index != 0 {
            let ref_block = &self.chain[self.chain.len() - RETARGET_INTERVAL as usize];
            next_difficulty(
                latest.index,
                latest.difficulty,
                latest.timestamp,
                ref_block.difficulty,
                ref_block.timestamp,
            )
        } else {
            latest.difficulty
        }
    }

    /// A snapshot of the inputs mining needs: the candidate block's index,
    /// previous hash, a fresh timestamp, the transaction list (coinbase
    /// first, then the current mempool), and the target difficulty. Taken
    /// under the lock; mining itself must run outside it.
    pub fn mining_template(&self, miner_address: &str) -> (u64, String, u64, Vec<Transaction>, u32) {
        let latest = self.latest_block();
        let index = latest.index + 1;
        let mut data = vec![Transaction::coinbase(miner_address, index)];
        data.extend(self.mempool.snapshot());
        (index, latest.hash.clone(), current_timestamp(), data, self.next_difficulty())
    }

    /// Validate `new_block` against the current tip and, on success,
    /// install the new block, the transitioned UTXO set, and a refreshed
    /// mempool — atomically, as one state update.
    pub fn append(&mut self, new_block: Block) -> bool {
        let now = current_timestamp();
        if !Block::validate_new_block(&new_block, self.latest_block(), now) {
            debug!("append: block {} failed validation", new_block.index);
            return false;
        }
        let next_utxo_set = match self.utxo_set.apply(&new_block.data, new_block.index) {
            Ok(u) => u,
            Err(e) => {
                debug!("append: block {} transactions invalid: {}", new_block.index, e);
                return false;
            }
        };

        info!("accepted block {} ({})", new_block.index, new_block.hash);
        self.chain.push(new_block);
        self.utxo_set = next_utxo_set;
        self.mempool.refresh(&self.utxo_set);
        true
    }

    /// Fully re-validate `candidate` and, if it validates and carries
    /// strictly more cumulative work than the current chain, swap to it.
    /// Equal work never replaces (strict `>` tie-breaking).
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        let candidate_work = cumulative_work(&candidate);
        let current_work = self.cumulative_work();
        if candidate_work <= current_work {
            debug!(
                "replace_chain: candidate work {} does not exceed current {}",
                candidate_work, current_work
            );
            return false;
        }

        match validate_chain(&candidate) {
            Some(utxo_set) => {
                info!(
                    "replacing chain: {} blocks, cumulative work {} -> {}",
                    candidate.len(),
                    current_work,
                    candidate_work
                );
                self.chain = candidate;
                self.utxo_set = utxo_set;
                self.mempool.refresh(&self.utxo_set);
                true
            }
            None => {
                debug!("replace_chain: candidate chain failed full validation");
                false
            }
        }
    }

    /// Admit a transaction into the mempool against the current UTXO set.
    pub fn add_to_mempool(&mut self, tx: Transaction) -> Result<(), CoreError> {
        self.mempool.add(tx, &self.utxo_set)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::find_block;

    fn mine_next(state: &NodeState, miner: &str) -> Block {
        let (index, prev_hash, timestamp, data, difficulty) = state.mining_template(miner);
        find_block(index, &prev_hash, timestamp, data, difficulty)
    }

    #[test]
    fn genesis_state_has_one_utxo() {
        let state = NodeState::new();
        assert_eq!(state.chain().len(), 1);
        assert_eq!(state.utxo_set().len(), 1);
    }

    #[test]
    fn append_extends_chain_and_utxo_set() {
        let mut state = NodeState::new();
        let miner = format!("04{}", "1".repeat(128));
        // difficulty 1 keeps the test's mining loop short
        let mut block = mine_next(&state, &miner);
        // genesis difficulty is 1; mining_template already carries it
        assert_eq!(block.difficulty, state.next_difficulty());

        assert!(state.append(block.clone()));
        assert_eq!(state.chain().len(), 2);
        assert_eq!(state.latest_block().index, 1);

        // a stale block that loses the race is simply rejected, not retried
        block.nonce += 1000;
        assert!(!state.append(block));
    }

    #[test]
    fn replace_chain_requires_strictly_more_work() {
        let mut state = NodeState::new();
        let same_work = vec![Block::genesis()];
        assert!(!state.replace_chain(same_work));
    }
}
