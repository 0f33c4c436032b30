//! Core ledger types for SmellyCoin: transactions, the UTXO set, the
//! mempool, the block engine, and chain selection.
//!
//! Hashes and addresses are lowercase hex strings throughout, matching the
//! wire format; there is no fixed-width byte encoding at this layer.

use thiserror::Error;

pub mod block;
pub mod chain;
pub mod mempool;
pub mod state;
pub mod transaction;
pub mod utxo;

pub use block::{Block, GENESIS_BLOCK_HASH, GENESIS_TIMESTAMP};
pub use chain::cumulative_work;
pub use mempool::Mempool;
pub use state::NodeState;
pub use transaction::{Transaction, TxIn, TxOut};
pub use utxo::{UnspentTxOut, UtxoKey, UtxoSet};

/// Current Unix time in seconds.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

/// Errors surfaced by the ledger core.
///
/// Realizes the taxonomy from the error handling design: validation
/// failures return `bool`/`Option` at the predicate layer and are not
/// represented here, but the operations that can genuinely fail — signing,
/// wallet balance lookups, address parsing — use these variants.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("referenced output missing for input {0:?}")]
    ReferencedOutputMissing(UtxoKey),

    #[error("signing key does not derive the referenced output's address")]
    KeyMismatch,

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("block or transaction failed validation: {0}")]
    ValidationFailed(String),

    #[error("transaction failed validation against the current UTXO set")]
    InvalidTx,

    #[error("input already referenced by a pending mempool transaction")]
    DoubleSpendInPool,

    #[error(transparent)]
    Crypto(#[from] smellycoin_crypto::CryptoError),
}
