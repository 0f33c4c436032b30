//! The unspent-output set and its pure state-transition function (C3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transaction::validate_block_transactions;
use crate::{CoreError, Transaction};

/// Key identifying a single unspent output: the producing transaction's id
/// plus its position in that transaction's output list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoKey {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

/// A not-yet-consumed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn key(&self) -> UtxoKey {
        UtxoKey {
            tx_out_id: self.tx_out_id.clone(),
            tx_out_index: self.tx_out_index,
        }
    }
}

/// The set of unspent outputs, keyed so at most one entry exists per
/// `(txOutId, txOutIndex)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet(HashMap<UtxoKey, UnspentTxOut>);

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet(HashMap::new())
    }

    pub fn get(&self, key: &UtxoKey) -> Option<&UnspentTxOut> {
        self.0.get(key)
    }

    pub fn insert(&mut self, utxo: UnspentTxOut) {
        self.0.insert(utxo.key(), utxo);
    }

    pub fn contains(&self, key: &UtxoKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All outputs belonging to `address`, in arbitrary order.
    pub fn for_address<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a UnspentTxOut> {
        self.0.values().filter(move |u| u.address == address)
    }

    /// Every unspent output, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.0.values()
    }

    /// A defensive copy: callers never observe or hold a reference into the
    /// live set (see the concurrency/resource model).
    pub fn snapshot(&self) -> UtxoSet {
        self.clone()
    }

    /// The state transition `apply(txs, utxo_set, blockIndex) -> utxo_set'`.
    ///
    /// Fails with `ValidationFailed` if `txs` don't pass block-transaction
    /// validation. Otherwise every input across every transaction
    /// (including the coinbase's harmless pseudo-input) is removed, and
    /// every output of every transaction is added.
    pub fn apply(&self, txs: &[Transaction], block_index: u64) -> Result<UtxoSet, CoreError> {
        if !validate_block_transactions(txs, self, block_index) {
            return Err(CoreError::ValidationFailed(
                "block transactions failed validation".into(),
            ));
        }

        let mut next = self.0.clone();
        for tx in txs {
            for input in &tx.tx_ins {
                next.remove(&input.key());
            }
        }
        for tx in txs {
            for (index, out) in tx.tx_outs.iter().enumerate() {
                let utxo = UnspentTxOut {
                    tx_out_id: tx.id.clone(),
                    tx_out_index: index as u64,
                    address: out.address.clone(),
                    amount: out.amount,
                };
                next.insert(utxo.key(), utxo);
            }
        }

        Ok(UtxoSet(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxOut;

    #[test]
    fn apply_mints_coinbase_output() {
        let address = format!("04{}", "d".repeat(128));
        let coinbase = Transaction::coinbase(&address, 0);
        let set = UtxoSet::new();

        let next = set.apply(&[coinbase.clone()], 0).unwrap();
        assert_eq!(next.len(), 1);
        let utxo = next
            .get(&UtxoKey {
                tx_out_id: coinbase.id.clone(),
                tx_out_index: 0,
            })
            .unwrap();
        assert_eq!(utxo.amount, 50);
        assert_eq!(utxo.address, address);
    }

    #[test]
    fn apply_consumes_spent_input_and_produces_change_output() {
        let miner = format!("04{}", "e".repeat(128));

        let privkey = smellycoin_crypto::generate_private_key();
        let payer = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let mut funded = UtxoSet::new();
        funded.insert(UnspentTxOut {
            tx_out_id: "funding".into(),
            tx_out_index: 0,
            address: payer.clone(),
            amount: 30,
        });

        let coinbase2 = Transaction::coinbase(&miner, 1);
        let tx_ins = vec![crate::transaction::TxIn {
            tx_out_id: "funding".into(),
            tx_out_index: 0,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: miner.clone(),
            amount: 30,
        }];
        let id = Transaction::compute_id(&tx_ins, &tx_outs);
        let mut spend = Transaction { id, tx_ins, tx_outs };
        let sig = spend.sign_input(0, &privkey, &funded).unwrap();
        spend.tx_ins[0].signature = sig;

        let next = funded.apply(&[coinbase2, spend], 1).unwrap();
        // funding output consumed, two new outputs (coinbase + spend) produced
        assert_eq!(next.len(), 2);
        assert!(!next.contains(&UtxoKey {
            tx_out_id: "funding".into(),
            tx_out_index: 0
        }));
    }

    #[test]
    fn apply_rejects_invalid_block_transactions() {
        let set = UtxoSet::new();
        // empty tx list has no coinbase, must fail
        assert!(set.apply(&[], 0).is_err());
    }
}
