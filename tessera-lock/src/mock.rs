//! In-memory bitcoin client for tests and development.
//!
//! The mock maintains a simulated chain of real consensus-encoded
//! transactions, so the resolver and monitor run end-to-end against it
//! exactly as they would against a node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::{
    transaction, Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use parking_lot::RwLock;

use crate::client::{BitcoinLockTransaction, LockClient};
use crate::error::{LockError, Result};
use crate::script;

/// Default fee charged by the mock for every created transaction.
const DEFAULT_FEE: u64 = 300;

/// Configurable mock over an in-memory chain.
pub struct MockLockClient {
    balance: AtomicU64,
    block_height: AtomicU64,
    transaction_fee: u64,
    owner_pub_key_hash: [u8; 20],
    /// txid -> raw hex of everything broadcast so far.
    chain: RwLock<HashMap<String, String>>,
    broadcast_count: AtomicU64,
    input_counter: AtomicU64,
}

impl MockLockClient {
    /// Create a mock holding `balance` satoshis at height 100.
    pub fn new(balance: u64) -> Self {
        Self {
            balance: AtomicU64::new(balance),
            block_height: AtomicU64::new(100),
            transaction_fee: DEFAULT_FEE,
            owner_pub_key_hash: [0x5a; 20],
            chain: RwLock::new(HashMap::new()),
            broadcast_count: AtomicU64::new(0),
            input_counter: AtomicU64::new(0),
        }
    }

    /// Set the per-transaction fee.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.transaction_fee = fee;
        self
    }

    /// Advance the simulated chain tip.
    pub fn advance_blocks(&self, count: u64) {
        self.block_height.fetch_add(count, Ordering::Relaxed);
    }

    /// Set the wallet balance.
    pub fn set_balance(&self, satoshis: u64) {
        self.balance.store(satoshis, Ordering::Relaxed);
    }

    /// Whether a transaction is on the simulated chain.
    pub fn contains_transaction(&self, transaction_id: &str) -> bool {
        self.chain.read().contains_key(transaction_id)
    }

    /// Number of broadcasts so far.
    pub fn broadcast_count(&self) -> u64 {
        self.broadcast_count.load(Ordering::Relaxed)
    }

    /// Drop a transaction from the simulated chain, as if it had never
    /// been mined. Used to exercise crash-recovery paths.
    pub fn evict_transaction(&self, transaction_id: &str) {
        self.chain.write().remove(transaction_id);
    }

    fn next_funding_outpoint(&self) -> OutPoint {
        let n = self.input_counter.fetch_add(1, Ordering::Relaxed);
        let mut txid = [0u8; 32];
        txid[..8].copy_from_slice(&n.to_le_bytes());
        OutPoint {
            txid: Txid::from_byte_array(txid),
            vout: 0,
        }
    }

    fn lock_transaction(
        &self,
        funding: OutPoint,
        lock_time: LockTime,
        pay_to: ScriptBuf,
        amount: u64,
        redeem_script_as_hex: String,
    ) -> BitcoinLockTransaction {
        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time,
            input: vec![TxIn {
                previous_output: funding,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(amount),
                script_pubkey: pay_to,
            }],
        };
        BitcoinLockTransaction {
            transaction_id: tx.compute_txid().to_string(),
            redeem_script_as_hex,
            serialized_transaction: encode::serialize_hex(&tx),
            transaction_fee: self.transaction_fee,
        }
    }

    /// Value of the (single) lock output of a previously created
    /// transaction on the chain.
    fn locked_amount(&self, transaction_id: &str) -> Result<u64> {
        let raw = self
            .chain
            .read()
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| LockError::TransactionNotFound(transaction_id.to_string()))?;
        let tx: Transaction = encode::deserialize(&hex::decode(&raw)?)
            .map_err(|e| LockError::InvalidTransaction(e.to_string()))?;
        Ok(tx.output[0].value.to_sat())
    }

    fn parse_txid(transaction_id: &str) -> Result<Txid> {
        transaction_id
            .parse::<Txid>()
            .map_err(|e| LockError::InvalidTransaction(e.to_string()))
    }
}

#[async_trait]
impl LockClient for MockLockClient {
    async fn get_balance_in_satoshis(&self) -> Result<u64> {
        Ok(self.balance.load(Ordering::Relaxed))
    }

    async fn get_current_block_height(&self) -> Result<u64> {
        Ok(self.block_height.load(Ordering::Relaxed))
    }

    async fn get_raw_transaction(&self, transaction_id: &str) -> Result<String> {
        self.chain
            .read()
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| LockError::TransactionNotFound(transaction_id.to_string()))
    }

    async fn create_lock_transaction(
        &self,
        amount_in_satoshis: u64,
        lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction> {
        let redeem = script::build_redeem_script(lock_until_block, &self.owner_pub_key_hash);
        Ok(self.lock_transaction(
            self.next_funding_outpoint(),
            LockTime::ZERO,
            redeem.to_p2sh(),
            amount_in_satoshis,
            hex::encode(redeem.as_bytes()),
        ))
    }

    async fn create_relock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
        new_lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction> {
        let previous_amount = self.locked_amount(existing_lock_transaction_id)?;
        let redeem = script::build_redeem_script(new_lock_until_block, &self.owner_pub_key_hash);
        let lock_time = LockTime::from_height(existing_lock_until_block as u32)
            .map_err(|e| LockError::InvalidTransaction(e.to_string()))?;
        Ok(self.lock_transaction(
            OutPoint {
                txid: Self::parse_txid(existing_lock_transaction_id)?,
                vout: 0,
            },
            lock_time,
            redeem.to_p2sh(),
            previous_amount.saturating_sub(self.transaction_fee),
            hex::encode(redeem.as_bytes()),
        ))
    }

    async fn create_release_lock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
    ) -> Result<BitcoinLockTransaction> {
        let previous_amount = self.locked_amount(existing_lock_transaction_id)?;
        let previous_redeem =
            script::build_redeem_script(existing_lock_until_block, &self.owner_pub_key_hash);
        let lock_time = LockTime::from_height(existing_lock_until_block as u32)
            .map_err(|e| LockError::InvalidTransaction(e.to_string()))?;
        let wallet_script =
            ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(self.owner_pub_key_hash));
        Ok(self.lock_transaction(
            OutPoint {
                txid: Self::parse_txid(existing_lock_transaction_id)?,
                vout: 0,
            },
            lock_time,
            wallet_script,
            previous_amount.saturating_sub(self.transaction_fee),
            hex::encode(previous_redeem.as_bytes()),
        ))
    }

    async fn broadcast_lock_transaction(
        &self,
        transaction: &BitcoinLockTransaction,
    ) -> Result<String> {
        self.broadcast_count.fetch_add(1, Ordering::Relaxed);
        self.chain.write().insert(
            transaction.transaction_id.clone(),
            transaction.serialized_transaction.clone(),
        );
        Ok(transaction.transaction_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_transactions_are_decodable() {
        let client = MockLockClient::new(5_000_000);
        let transaction = client
            .create_lock_transaction(1_000_000, 700_000)
            .await
            .unwrap();

        let decoded: Transaction =
            encode::deserialize(&hex::decode(&transaction.serialized_transaction).unwrap())
                .unwrap();
        assert_eq!(
            decoded.compute_txid().to_string(),
            transaction.transaction_id
        );
        assert_eq!(decoded.output[0].value.to_sat(), 1_000_000);
    }

    #[tokio::test]
    async fn test_broadcast_then_fetch() {
        let client = MockLockClient::new(5_000_000);
        let transaction = client
            .create_lock_transaction(1_000_000, 700_000)
            .await
            .unwrap();

        assert!(matches!(
            client.get_raw_transaction(&transaction.transaction_id).await,
            Err(LockError::TransactionNotFound(_))
        ));

        client.broadcast_lock_transaction(&transaction).await.unwrap();
        let raw = client
            .get_raw_transaction(&transaction.transaction_id)
            .await
            .unwrap();
        assert_eq!(raw, transaction.serialized_transaction);
    }

    #[tokio::test]
    async fn test_relock_deducts_fee_from_locked_amount() {
        let client = MockLockClient::new(5_000_000).with_fee(500);
        let first = client
            .create_lock_transaction(1_000_000, 700_000)
            .await
            .unwrap();
        client.broadcast_lock_transaction(&first).await.unwrap();

        let relock = client
            .create_relock_transaction(&first.transaction_id, 700_000, 700_050)
            .await
            .unwrap();
        let decoded: Transaction =
            encode::deserialize(&hex::decode(&relock.serialized_transaction).unwrap()).unwrap();
        assert_eq!(decoded.output[0].value.to_sat(), 999_500);
        assert_eq!(
            decoded.input[0].previous_output.txid.to_string(),
            first.transaction_id
        );
    }
}
