//! Transaction-building wallet operations for SmellyCoin.
//!
//! Pure functions over a UTXO set and a mempool snapshot: find spendable
//! outputs for an address, exclude ones already committed to a pending
//! transaction, greedily select enough to cover an amount, and assemble and
//! sign the resulting transaction. Grounded in the reference wallet's
//! `FindUnspentTxOuts` / `filterTxPoolTxs` / `FindTxOutsForAmount` /
//! `CreateTransaction` sequence.

use log::debug;
use smellycoin_core::{CoreError, Transaction, TxOut, UnspentTxOut, UtxoSet};
use smellycoin_crypto::public_key_from_private;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Crypto(#[from] smellycoin_crypto::CryptoError),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },
}

/// Every UTXO in `utxo_set` owned by `address`.
pub fn find_unspent_outputs(address: &str, utxo_set: &UtxoSet) -> Vec<UnspentTxOut> {
    utxo_set.for_address(address).cloned().collect()
}

/// Exclude UTXOs already referenced by a pending mempool transaction's
/// inputs, so a wallet never builds a transaction that double-spends
/// against its own unconfirmed spend.
pub fn filter_pool_spent(utxos: Vec<UnspentTxOut>, mempool_snapshot: &[Transaction]) -> Vec<UnspentTxOut> {
    let pending_keys: std::collections::HashSet<_> = mempool_snapshot
        .iter()
        .flat_map(|tx| tx.tx_ins.iter().map(|tx_in| tx_in.key()))
        .collect();

    utxos
        .into_iter()
        .filter(|utxo| !pending_keys.contains(&utxo.key()))
        .collect()
}

/// Greedily accumulate UTXOs in iteration order until `amount` is covered,
/// returning the selected outputs and the leftover change. Errs if the
/// total available is short. At most one change output is ever produced by
/// the caller; this only computes the leftover value.
pub fn select_outputs_for_amount(
    amount: u64,
    utxos: &[UnspentTxOut],
) -> Result<(Vec<UnspentTxOut>, u64), WalletError> {
    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in utxos {
        if total >= amount {
            break;
        }
        total += utxo.amount;
        selected.push(utxo.clone());
    }

    if total < amount {
        return Err(WalletError::InsufficientFunds {
            requested: amount,
            available: total,
        });
    }

    Ok((selected, total - amount))
}

/// Build and sign a transaction sending `amount` to `receiver_address` from
/// `private_key`'s own outputs, excluding anything already spent in
/// `mempool_snapshot`.
pub fn build_transaction(
    receiver_address: &str,
    amount: u64,
    private_key: &str,
    utxo_set: &UtxoSet,
    mempool_snapshot: &[Transaction],
) -> Result<Transaction, WalletError> {
    let my_address = public_key_from_private(private_key)?;

    let my_utxos = find_unspent_outputs(&my_address, utxo_set);
    let spendable = filter_pool_spent(my_utxos, mempool_snapshot);
    let (selected, change) = select_outputs_for_amount(amount, &spendable)?;

    let tx_ins = selected
        .iter()
        .map(|utxo| smellycoin_core::TxIn {
            tx_out_id: utxo.tx_out_id.clone(),
            tx_out_index: utxo.tx_out_index,
            signature: String::new(),
        })
        .collect::<Vec<_>>();

    let mut tx_outs = vec![TxOut {
        address: receiver_address.to_string(),
        amount,
    }];
    if change > 0 {
        tx_outs.push(TxOut {
            address: my_address.clone(),
            amount: change,
        });
    }

    let id = Transaction::compute_id(&tx_ins, &tx_outs);
    let mut transaction = Transaction { id, tx_ins, tx_outs };

    for index in 0..transaction.tx_ins.len() {
        let signature = transaction.sign_input(index, private_key, utxo_set)?;
        transaction.tx_ins[index].signature = signature;
    }

    debug!(
        "built transaction {} sending {} to {} with {} input(s)",
        transaction.id,
        amount,
        receiver_address,
        transaction.tx_ins.len()
    );

    Ok(transaction)
}

/// Sum of every UTXO owned by `address`.
pub fn balance_of(address: &str, utxo_set: &UtxoSet) -> u64 {
    utxo_set.for_address(address).map(|u| u.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smellycoin_crypto::generate_private_key;

    fn funded_utxo_set(address: &str, amount: u64) -> UtxoSet {
        let coinbase = Transaction::coinbase(address, 0);
        let mut outs = coinbase.tx_outs.clone();
        outs[0].amount = amount;
        let tx = Transaction {
            id: Transaction::compute_id(&coinbase.tx_ins, &outs),
            tx_ins: coinbase.tx_ins,
            tx_outs: outs,
        };
        UtxoSet::new().apply(&[tx], 0).unwrap()
    }

    #[test]
    fn select_outputs_errors_when_short() {
        let utxo = UnspentTxOut {
            tx_out_id: "a".into(),
            tx_out_index: 0,
            address: "addr".into(),
            amount: 10,
        };
        let result = select_outputs_for_amount(20, &[utxo]);
        assert!(matches!(result, Err(WalletError::InsufficientFunds { requested: 20, available: 10 })));
    }

    #[test]
    fn filter_pool_spent_excludes_pending_inputs() {
        let utxo = UnspentTxOut {
            tx_out_id: "a".into(),
            tx_out_index: 0,
            address: "addr".into(),
            amount: 10,
        };
        let pending = Transaction {
            id: "whatever".into(),
            tx_ins: vec![smellycoin_core::TxIn {
                tx_out_id: "a".into(),
                tx_out_index: 0,
                signature: String::new(),
            }],
            tx_outs: vec![],
        };
        let filtered = filter_pool_spent(vec![utxo], &[pending]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn build_transaction_produces_change_output() {
        let private_key = generate_private_key();
        let address = public_key_from_private(&private_key).unwrap();
        let utxo_set = funded_utxo_set(&address, 50);

        let receiver = "04".to_string() + &"7".repeat(128);
        let tx = build_transaction(&receiver, 20, &private_key, &utxo_set, &[]).unwrap();

        assert_eq!(tx.tx_outs.len(), 2);
        assert_eq!(tx.tx_outs[0].amount, 20);
        assert_eq!(tx.tx_outs[1].amount, 30);
        assert!(tx.validate(&utxo_set));
    }
}
