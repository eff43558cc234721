//! Abstract bitcoin wallet contract for the lock subsystem.
//!
//! A real node plugs in through [`LockClient`]; tests and development
//! use the in-memory [`crate::mock::MockLockClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A created, not-yet-broadcast lock transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinLockTransaction {
    /// Transaction id.
    pub transaction_id: String,
    /// Redeem script of the lock output, in hex.
    pub redeem_script_as_hex: String,
    /// Raw transaction in consensus hex, ready to broadcast.
    pub serialized_transaction: String,
    /// Fee the transaction pays, in satoshis.
    pub transaction_fee: u64,
}

/// The wallet operations the lock subsystem needs from a bitcoin node.
///
/// Implementations are expected to honor caller-side timeouts on every
/// call; a timed-out call surfaces as an error and aborts the monitor's
/// current tick.
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Spendable wallet balance in satoshis.
    async fn get_balance_in_satoshis(&self) -> Result<u64>;

    /// Current chain tip height.
    async fn get_current_block_height(&self) -> Result<u64>;

    /// Fetch a raw transaction in consensus hex.
    ///
    /// Fails with [`crate::LockError::TransactionNotFound`] when the
    /// transaction is not visible to the node.
    async fn get_raw_transaction(&self, transaction_id: &str) -> Result<String>;

    /// Create (but do not broadcast) a transaction locking `amount`
    /// satoshis until `lock_until_block`.
    async fn create_lock_transaction(
        &self,
        amount_in_satoshis: u64,
        lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction>;

    /// Create a transaction spending an existing, matured lock into a
    /// new lock expiring at `new_lock_until_block`. The fee comes out of
    /// the locked amount.
    async fn create_relock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
        new_lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction>;

    /// Create a transaction returning an existing, matured lock to the
    /// wallet.
    async fn create_release_lock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction>;

    /// Broadcast a previously created lock transaction. Returns the
    /// transaction id.
    async fn broadcast_lock_transaction(
        &self,
        transaction: &BitcoinLockTransaction,
    ) -> Result<String>;
}
