//! Durable append-only log of lock-monitor actions.
//!
//! The store is the only durable state the monitor owns. The single
//! required query is the last record by insertion order; together with
//! on-chain presence it fully determines the monitor's state after a
//! restart. History is never compacted; it is the audit trail.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Kind of action a lock record captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTransactionType {
    /// A brand new lock funded from the wallet.
    Create,
    /// An existing lock rolled into a later expiry.
    Relock,
    /// A lock released back to the wallet.
    ReturnToWallet,
}

/// One appended lock-monitor action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTransactionRecord {
    /// What kind of action this was.
    #[serde(rename = "type")]
    pub record_type: LockTransactionType,
    /// Transaction id of the (re)broadcastable transaction.
    pub transaction_id: String,
    /// Redeem script of the lock output, in hex.
    pub redeem_script_as_hex: String,
    /// Raw transaction hex, kept for rebroadcast after a crash.
    pub raw_transaction: String,
    /// The configured lock target when the record was written.
    pub desired_lock_amount_in_satoshis: u64,
    /// Monotonic insertion timestamp, milliseconds since the epoch.
    pub create_timestamp: i64,
}

impl LockTransactionRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        record_type: LockTransactionType,
        transaction_id: impl Into<String>,
        redeem_script_as_hex: impl Into<String>,
        raw_transaction: impl Into<String>,
        desired_lock_amount_in_satoshis: u64,
    ) -> Self {
        Self {
            record_type,
            transaction_id: transaction_id.into(),
            redeem_script_as_hex: redeem_script_as_hex.into(),
            raw_transaction: raw_transaction.into(),
            desired_lock_amount_in_satoshis,
            create_timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Append-only store of lock-monitor actions.
#[async_trait]
pub trait LockTransactionStore: Send + Sync {
    /// Append a record. The write is durable when this returns.
    async fn append(&self, record: &LockTransactionRecord) -> Result<()>;

    /// Last appended record, by insertion order.
    async fn last(&self) -> Result<Option<LockTransactionRecord>>;
}

/// In-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    records: RwLock<Vec<LockTransactionRecord>>,
}

impl MemoryLockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full history, in insertion order.
    pub fn records(&self) -> Vec<LockTransactionRecord> {
        self.records.read().clone()
    }

    /// Number of appended records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl LockTransactionStore for MemoryLockStore {
    async fn append(&self, record: &LockTransactionRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn last(&self) -> Result<Option<LockTransactionRecord>> {
        Ok(self.records.read().last().cloned())
    }
}

/// File-backed store: one JSON record per line, fsynced on every append.
pub struct FileLockStore {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileLockStore {
    /// Open (creating if necessary) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LockError::Storage(format!("failed to open {}: {e}", path.display())))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }
}

#[async_trait]
impl LockTransactionStore for FileLockStore {
    async fn append(&self, record: &LockTransactionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)
            .map_err(|e| LockError::Storage(format!("write failed: {e}")))?;
        file.sync_all()
            .map_err(|e| LockError::Storage(format!("sync failed: {e}")))?;
        Ok(())
    }

    async fn last(&self) -> Result<Option<LockTransactionRecord>> {
        let file = File::open(&self.path)
            .map_err(|e| LockError::Storage(format!("read failed: {e}")))?;
        let reader = BufReader::new(file);

        let mut last = None;
        for line in reader.lines() {
            let line = line.map_err(|e| LockError::Storage(format!("read failed: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            last = Some(serde_json::from_str(&line)?);
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(txid: &str, record_type: LockTransactionType) -> LockTransactionRecord {
        LockTransactionRecord::new(record_type, txid, "02a032b175", "0200...", 1_000_000)
    }

    #[tokio::test]
    async fn test_memory_store_last_is_insertion_order() {
        let store = MemoryLockStore::new();
        assert!(store.last().await.unwrap().is_none());

        store
            .append(&record("tx1", LockTransactionType::Create))
            .await
            .unwrap();
        store
            .append(&record("tx2", LockTransactionType::Relock))
            .await
            .unwrap();

        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.transaction_id, "tx2");
        assert_eq!(last.record_type, LockTransactionType::Relock);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.jsonl");

        let store = FileLockStore::open(&path).unwrap();
        assert!(store.last().await.unwrap().is_none());

        store
            .append(&record("tx1", LockTransactionType::Create))
            .await
            .unwrap();
        store
            .append(&record("tx2", LockTransactionType::ReturnToWallet))
            .await
            .unwrap();

        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.transaction_id, "tx2");
        assert_eq!(last.record_type, LockTransactionType::ReturnToWallet);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.jsonl");

        {
            let store = FileLockStore::open(&path).unwrap();
            store
                .append(&record("tx1", LockTransactionType::Create))
                .await
                .unwrap();
        }

        let reopened = FileLockStore::open(&path).unwrap();
        let last = reopened.last().await.unwrap().unwrap();
        assert_eq!(last.transaction_id, "tx1");
    }

    #[test]
    fn test_record_wire_format_uses_type_tag() {
        let json =
            serde_json::to_value(record("tx1", LockTransactionType::Create)).unwrap();
        assert_eq!(json["type"], "Create");
        assert!(json["createTimestamp"].as_i64().unwrap() > 0);
    }
}
