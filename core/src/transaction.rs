//! Transaction types, id computation, signing, and validation (C2).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use smellycoin_crypto::{sha256_hex, sign, verify};

use crate::utxo::{UtxoKey, UtxoSet};
use crate::CoreError;

/// Fixed block reward paid to the single coinbase output.
pub const COINBASE_AMOUNT: u64 = 50;

/// A reference to a prior output, plus the signature authorizing its spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub signature: String,
}

impl TxIn {
    pub fn key(&self) -> UtxoKey {
        UtxoKey {
            tx_out_id: self.tx_out_id.clone(),
            tx_out_index: self.tx_out_index,
        }
    }
}

/// A transfer of `amount` coins to `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "txIns")]
    pub tx_ins: Vec<TxIn>,
    #[serde(rename = "txOuts")]
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Deterministic id: SHA-256 of the inputs' `(txOutId, decimal(txOutIndex))`
    /// concatenation, in list order, followed by the outputs'
    /// `(address, decimal(amount))` concatenation, in list order. Neither
    /// list is sorted for this computation.
    pub fn compute_id(tx_ins: &[TxIn], tx_outs: &[TxOut]) -> String {
        let mut content = String::new();
        for input in tx_ins {
            content.push_str(&input.tx_out_id);
            content.push_str(&input.tx_out_index.to_string());
        }
        for output in tx_outs {
            content.push_str(&output.address);
            content.push_str(&output.amount.to_string());
        }
        sha256_hex(content.as_bytes())
    }

    pub fn tx_id(&self) -> String {
        Self::compute_id(&self.tx_ins, &self.tx_outs)
    }

    /// Build the single-input, single-output coinbase transaction for
    /// `block_index`, minting `COINBASE_AMOUNT` to `address`.
    pub fn coinbase(address: &str, block_index: u64) -> Self {
        let tx_ins = vec![TxIn {
            tx_out_id: String::new(),
            tx_out_index: block_index,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: address.to_string(),
            amount: COINBASE_AMOUNT,
        }];
        let id = Self::compute_id(&tx_ins, &tx_outs);
        Transaction { id, tx_ins, tx_outs }
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].tx_out_id.is_empty()
    }

    /// Sign input `index`, returning the DER hex signature over the
    /// transaction's id bytes. Fails with `ReferencedOutputMissing` if the
    /// input's UTXO is gone, and `KeyMismatch` if `priv_key` doesn't derive
    /// the UTXO's address.
    pub fn sign_input(
        &self,
        index: usize,
        priv_key: &str,
        utxo_set: &UtxoSet,
    ) -> Result<String, CoreError> {
        let input = &self.tx_ins[index];
        let key = input.key();
        let utxo = utxo_set
            .get(&key)
            .ok_or_else(|| CoreError::ReferencedOutputMissing(key.clone()))?;

        let derived = smellycoin_crypto::public_key_from_private(priv_key)?;
        if derived != utxo.address {
            return Err(CoreError::KeyMismatch);
        }

        Ok(sign(priv_key, self.id.as_bytes())?)
    }

    /// `true` iff id integrity, every input's signature verification, and
    /// value conservation all hold. Non-coinbase transactions only.
    pub fn validate(&self, utxo_set: &UtxoSet) -> bool {
        if self.id != self.tx_id() {
            return false;
        }

        let mut input_total: u64 = 0;
        for input in &self.tx_ins {
            let utxo = match utxo_set.get(&input.key()) {
                Some(u) => u,
                None => return false,
            };
            match verify(&utxo.address, self.id.as_bytes(), &input.signature) {
                Ok(true) => {}
                _ => return false,
            }
            input_total += utxo.amount;
        }

        let output_total: u64 = self.tx_outs.iter().map(|o| o.amount).sum();
        input_total == output_total
    }

    /// Structural coinbase validation: one input carrying `block_index` as
    /// its pseudo-index, one output of exactly `COINBASE_AMOUNT`, and id
    /// integrity. Not signature-checked: there is no real key behind it.
    pub fn validate_coinbase(&self, block_index: u64) -> bool {
        if self.tx_ins.len() != 1 || self.tx_outs.len() != 1 {
            return false;
        }
        if self.id != self.tx_id() {
            return false;
        }
        if self.tx_ins[0].tx_out_index != block_index {
            return false;
        }
        self.tx_outs[0].amount == COINBASE_AMOUNT
    }
}

/// `txs[0]` must be a valid coinbase for `block_index`; no two non-coinbase
/// inputs across the whole block may reference the same output; every
/// remaining transaction must independently validate against `utxo_set`.
pub fn validate_block_transactions(txs: &[Transaction], utxo_set: &UtxoSet, block_index: u64) -> bool {
    let Some(coinbase) = txs.first() else {
        return false;
    };
    if !coinbase.validate_coinbase(block_index) {
        return false;
    }

    let mut seen: HashSet<UtxoKey> = HashSet::new();
    for tx in &txs[1..] {
        for input in &tx.tx_ins {
            if !seen.insert(input.key()) {
                return false;
            }
        }
    }

    txs[1..].iter().all(|tx| tx.validate(utxo_set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::UnspentTxOut;

    fn utxo_set_with(address: &str, tx_out_id: &str, amount: u64) -> UtxoSet {
        let mut set = UtxoSet::new();
        set.insert(UnspentTxOut {
            tx_out_id: tx_out_id.to_string(),
            tx_out_index: 0,
            address: address.to_string(),
            amount,
        });
        set
    }

    #[test]
    fn tx_id_is_deterministic_and_order_sensitive() {
        let tx_ins = vec![TxIn {
            tx_out_id: "abc".into(),
            tx_out_index: 0,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: "04aa".into(),
            amount: 10,
        }];
        let id1 = Transaction::compute_id(&tx_ins, &tx_outs);
        let id2 = Transaction::compute_id(&tx_ins, &tx_outs);
        assert_eq!(id1, id2);

        let mut tx_outs_mutated = tx_outs.clone();
        tx_outs_mutated[0].amount = 11;
        let id3 = Transaction::compute_id(&tx_ins, &tx_outs_mutated);
        assert_ne!(id1, id3);
    }

    #[test]
    fn coinbase_validates_structurally() {
        let address = format!("04{}", "b".repeat(128));
        let cb = Transaction::coinbase(&address, 1);
        assert!(cb.is_coinbase());
        assert!(cb.validate_coinbase(1));
        assert!(!cb.validate_coinbase(2));
    }

    #[test]
    fn sign_and_validate_round_trip() {
        let privkey = smellycoin_crypto::generate_private_key();
        let address = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let utxo_set = utxo_set_with(&address, "prevtx", 100);

        let tx_ins = vec![TxIn {
            tx_out_id: "prevtx".into(),
            tx_out_index: 0,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: address.clone(),
            amount: 100,
        }];
        let id = Transaction::compute_id(&tx_ins, &tx_outs);
        let mut tx = Transaction { id, tx_ins, tx_outs };

        let sig = tx.sign_input(0, &privkey, &utxo_set).unwrap();
        tx.tx_ins[0].signature = sig;

        assert!(tx.validate(&utxo_set));
    }

    #[test]
    fn validate_rejects_value_creation() {
        let privkey = smellycoin_crypto::generate_private_key();
        let address = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let utxo_set = utxo_set_with(&address, "prevtx", 100);

        let tx_ins = vec![TxIn {
            tx_out_id: "prevtx".into(),
            tx_out_index: 0,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: address.clone(),
            amount: 101,
        }];
        let id = Transaction::compute_id(&tx_ins, &tx_outs);
        let mut tx = Transaction { id, tx_ins, tx_outs };
        let sig = tx.sign_input(0, &privkey, &utxo_set).unwrap();
        tx.tx_ins[0].signature = sig;

        assert!(!tx.validate(&utxo_set));
    }

    #[test]
    fn validate_block_transactions_rejects_intra_block_double_spend() {
        let address = format!("04{}", "c".repeat(128));
        let coinbase = Transaction::coinbase(&address, 1);

        let privkey = smellycoin_crypto::generate_private_key();
        let payer = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let utxo_set = utxo_set_with(&payer, "shared", 50);

        let make_spend = || {
            let tx_ins = vec![TxIn {
                tx_out_id: "shared".into(),
                tx_out_index: 0,
                signature: String::new(),
            }];
            let tx_outs = vec![TxOut {
                address: address.clone(),
                amount: 50,
            }];
            let id = Transaction::compute_id(&tx_ins, &tx_outs);
            let mut tx = Transaction { id, tx_ins, tx_outs };
            let sig = tx.sign_input(0, &privkey, &utxo_set).unwrap();
            tx.tx_ins[0].signature = sig;
            tx
        };

        let txs = vec![coinbase, make_spend(), make_spend()];
        assert!(!validate_block_transactions(&txs, &utxo_set, 1));
    }
}
