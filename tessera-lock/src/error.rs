//! Error types for the lock subsystem.

use thiserror::Error;

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors that can occur while resolving or maintaining a
/// value-time-lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The referenced transaction is not visible on-chain.
    ///
    /// This is a recognized recovery signal, not a failure: the monitor
    /// reacts by rebroadcasting the stored raw transaction.
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// A lock identifier could not be decoded.
    #[error("invalid lock identifier: {0}")]
    InvalidIdentifier(String),

    /// A redeem script is not in the canonical value-time-lock form.
    #[error("redeem script is not a value-time-lock: {0}")]
    InvalidRedeemScript(String),

    /// The funding transaction has no output paying to the lock script.
    #[error("no output pays to the lock script in transaction {0}")]
    LockOutputNotFound(String),

    /// The wallet cannot fund the first lock.
    ///
    /// Expected control flow: the monitor logs it and waits for the
    /// wallet to be funded.
    #[error("insufficient balance for first lock: need {needed} sat, have {available} sat")]
    NotEnoughBalanceForFirstLock {
        /// Amount required, including the fee reserve.
        needed: u64,
        /// Amount available in the wallet.
        available: u64,
    },

    /// A malformed or unparseable transaction.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Wallet operation failed.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Node RPC call failed.
    #[error("RPC call failed: {0}")]
    RpcCall(String),

    /// Transaction broadcast failed.
    #[error("transaction broadcast failed: {0}")]
    Broadcast(String),

    /// Lock transaction store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hex decode error.
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}
