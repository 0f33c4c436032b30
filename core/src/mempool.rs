//! The pool of admitted-but-unconfirmed transactions (C4).

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::utxo::UtxoKey;
use crate::{CoreError, Transaction, UtxoSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mempool {
    entries: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A defensive copy of the pool.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.clone()
    }

    /// Admit `tx` if it validates against `utxo_set` and doesn't collide
    /// with an input already claimed by a pending transaction.
    pub fn add(&mut self, tx: Transaction, utxo_set: &UtxoSet) -> Result<(), CoreError> {
        if !tx.validate(utxo_set) {
            return Err(CoreError::InvalidTx);
        }

        let incoming_keys: HashSet<UtxoKey> = tx.tx_ins.iter().map(|i| i.key()).collect();
        for existing in &self.entries {
            if existing.tx_ins.iter().any(|i| incoming_keys.contains(&i.key())) {
                return Err(CoreError::DoubleSpendInPool);
            }
        }

        self.entries.push(tx);
        Ok(())
    }

    /// Remove every entry with an input no longer present in
    /// `new_utxo_set`. Removal is by transaction id; surviving order is
    /// preserved.
    pub fn refresh(&mut self, new_utxo_set: &UtxoSet) {
        let before = self.entries.len();
        self.entries.retain(|tx| {
            tx.tx_ins.iter().all(|input| new_utxo_set.contains(&input.key()))
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("mempool: pruned {} transaction(s) on UTXO update", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxIn, TxOut};
    use crate::utxo::UnspentTxOut;

    fn signed_spend(privkey: &str, payer: &str, utxo_set: &UtxoSet, tx_out_id: &str, amount: u64) -> Transaction {
        let tx_ins = vec![TxIn {
            tx_out_id: tx_out_id.to_string(),
            tx_out_index: 0,
            signature: String::new(),
        }];
        let tx_outs = vec![TxOut {
            address: payer.to_string(),
            amount,
        }];
        let id = Transaction::compute_id(&tx_ins, &tx_outs);
        let mut tx = Transaction { id, tx_ins, tx_outs };
        let sig = tx.sign_input(0, privkey, utxo_set).unwrap();
        tx.tx_ins[0].signature = sig;
        tx
    }

    #[test]
    fn add_rejects_invalid_tx() {
        let mut pool = Mempool::new();
        let utxo_set = UtxoSet::new();
        let bogus = Transaction {
            id: "deadbeef".into(),
            tx_ins: vec![],
            tx_outs: vec![],
        };
        assert!(matches!(pool.add(bogus, &utxo_set), Err(CoreError::InvalidTx)));
    }

    #[test]
    fn add_rejects_double_spend_against_pool() {
        let privkey = smellycoin_crypto::generate_private_key();
        let payer = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(UnspentTxOut {
            tx_out_id: "fund".into(),
            tx_out_index: 0,
            address: payer.clone(),
            amount: 10,
        });

        let mut pool = Mempool::new();
        let first = signed_spend(&privkey, &payer, &utxo_set, "fund", 10);
        pool.add(first, &utxo_set).unwrap();

        let second = signed_spend(&privkey, &payer, &utxo_set, "fund", 10);
        assert!(matches!(
            pool.add(second, &utxo_set),
            Err(CoreError::DoubleSpendInPool)
        ));
    }

    #[test]
    fn refresh_prunes_entries_whose_input_is_gone() {
        let privkey = smellycoin_crypto::generate_private_key();
        let payer = smellycoin_crypto::public_key_from_private(&privkey).unwrap();
        let mut utxo_set = UtxoSet::new();
        utxo_set.insert(UnspentTxOut {
            tx_out_id: "fund".into(),
            tx_out_index: 0,
            address: payer.clone(),
            amount: 10,
        });

        let mut pool = Mempool::new();
        let tx = signed_spend(&privkey, &payer, &utxo_set, "fund", 10);
        pool.add(tx, &utxo_set).unwrap();
        assert_eq!(pool.len(), 1);

        let empty_utxo_set = UtxoSet::new();
        pool.refresh(&empty_utxo_set);
        assert!(pool.is_empty());
    }
}
