//! Error types for the Bitcoin Core backend.

use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BitcoinError>;

/// Errors that can occur while talking to a Bitcoin Core node.
#[derive(Debug, Error)]
pub enum BitcoinError {
    /// RPC connection error.
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    /// RPC call error.
    #[error("RPC call failed: {0}")]
    RpcCall(String),

    /// Transaction not found.
    #[error("transaction not found: {0}")]
    TxNotFound(String),

    /// Transaction building error.
    #[error("transaction building failed: {0}")]
    TxBuild(String),

    /// Transaction broadcast error.
    #[error("transaction broadcast failed: {0}")]
    Broadcast(String),

    /// Invalid transaction.
    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    /// Invalid address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid public key.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// Network mismatch.
    #[error("network mismatch: expected {expected}, got {got}")]
    NetworkMismatch {
        /// Expected network.
        expected: String,
        /// Actual network.
        got: String,
    },

    /// Wallet error.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Fee estimation error.
    #[error("fee estimation failed: {0}")]
    FeeEstimation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Hex decode error.
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl From<bitcoincore_rpc::Error> for BitcoinError {
    fn from(e: bitcoincore_rpc::Error) -> Self {
        BitcoinError::RpcCall(e.to_string())
    }
}

impl From<bitcoin::consensus::encode::Error> for BitcoinError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        BitcoinError::InvalidTx(e.to_string())
    }
}

impl From<BitcoinError> for tessera_lock::LockError {
    fn from(e: BitcoinError) -> Self {
        use tessera_lock::LockError;
        match e {
            BitcoinError::TxNotFound(txid) => LockError::TransactionNotFound(txid),
            BitcoinError::Broadcast(message) => LockError::Broadcast(message),
            BitcoinError::InvalidTx(message) => LockError::InvalidTransaction(message),
            BitcoinError::Wallet(message) => LockError::Wallet(message),
            BitcoinError::Config(message) => LockError::Config(message),
            other => LockError::RpcCall(other.to_string()),
        }
    }
}
