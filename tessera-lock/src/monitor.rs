//! Periodic control loop maintaining the node's value-time-lock.
//!
//! Each tick reconciles durable state against the chain, then takes at
//! most one corrective action:
//!
//! ```text
//!             ┌──────► NoLock ──create──► PendingCreate ──confirmed──► Active
//!             │           │
//!    release  │           │ (no lock required: stay)
//!             │
//!  Active ────┤                      ┌─expiring, amount unchanged─► PendingRelock ──► Active
//!             │                      │
//!             └─► PendingRelease     └─expiring, amount changed──► PendingRelease ──► NoLock
//! ```
//!
//! The `Pending*` states are implicit: they are reconstructed every tick
//! from the last store record plus on-chain presence. Writes always
//! precede broadcasts, so a crash at any point is recovered by the next
//! tick's rebroadcast path.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{BitcoinLockTransaction, LockClient};
use crate::error::{LockError, Result};
use crate::identifier::LockIdentifier;
use crate::resolver::{LockResolver, ValueTimeLock};
use crate::store::{LockTransactionRecord, LockTransactionStore, LockTransactionType};

/// Lock monitor configuration.
#[derive(Debug, Clone)]
pub struct LockMonitorConfig {
    /// Delay between the end of one tick and the start of the next.
    pub poll_period: Duration,
    /// Target bond size in satoshis. Zero means no lock is required.
    pub desired_lock_amount_in_satoshis: u64,
    /// How far ahead each lock's expiry is placed.
    pub lock_period_in_blocks: u64,
    /// Fee reserve added to the first lock; it rides inside the locked
    /// amount and pays for future relocks.
    pub first_lock_fee_amount_in_satoshis: u64,
}

impl LockMonitorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_period.is_zero() {
            return Err(LockError::Config("poll period must be positive".into()));
        }
        if self.lock_period_in_blocks == 0 {
            return Err(LockError::Config(
                "lock period must be at least one block".into(),
            ));
        }
        Ok(())
    }
}

/// Reconciled view of the bond at the start of a tick.
#[derive(Debug, Clone)]
enum CurrentLockState {
    /// No lock exists and nothing is in flight.
    None,
    /// A stored transaction is not yet visible on-chain; it has been
    /// rebroadcast and the monitor waits for it to confirm.
    Pending,
    /// A confirmed lock, plus the record that produced it.
    Confirmed {
        lock: ValueTimeLock,
        record: LockTransactionRecord,
    },
}

/// Outcome of a relock attempt. Insufficiency is a normal result, not an
/// error: it means "fall back to release".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelockOutcome {
    Relocked,
    InsufficientFundsFallbackToRelease,
}

/// Single-agent control loop maintaining exactly one active lock.
pub struct LockMonitor<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    resolver: LockResolver<C>,
    config: LockMonitorConfig,
    current_lock: RwLock<Option<ValueTimeLock>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<C, S> LockMonitor<C, S>
where
    C: LockClient + 'static,
    S: LockTransactionStore + 'static,
{
    /// Create a monitor. Call [`LockMonitor::initialize`] to start the
    /// loop, or drive [`LockMonitor::tick`] from an external scheduler.
    pub fn new(client: Arc<C>, store: Arc<S>, config: LockMonitorConfig) -> Self {
        Self {
            resolver: LockResolver::new(Arc::clone(&client)),
            client,
            store,
            config,
            current_lock: RwLock::new(None),
            poll_task: Mutex::new(None),
        }
    }

    /// Start the polling loop. The first tick runs immediately; each
    /// subsequent tick is scheduled `poll_period` after the previous one
    /// completes. Any loop already running is cancelled first, so
    /// repeated calls can never produce overlapping ticks.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        self.config.validate()?;

        let mut task = self.poll_task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            loop {
                // A failed tick is swallowed: the next tick re-reconciles
                // from persistent state.
                if let Err(e) = monitor.tick().await {
                    warn!(error = %e, "lock monitor tick failed");
                }
                tokio::time::sleep(monitor.config.poll_period).await;
            }
        }));
        Ok(())
    }

    /// Stop the polling loop.
    pub fn shutdown(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }
    }

    /// The active lock as of the last reconcile, if any.
    pub fn current_lock(&self) -> Option<ValueTimeLock> {
        self.current_lock.read().clone()
    }

    /// One reconcile-and-act pass.
    ///
    /// Public so tests and external schedulers can drive the monitor
    /// tick by tick; the loop spawned by `initialize` calls exactly this.
    pub async fn tick(&self) -> Result<()> {
        let state = self.reconcile().await?;

        *self.current_lock.write() = match &state {
            CurrentLockState::Confirmed { lock, .. } => Some(lock.clone()),
            _ => None,
        };

        let lock_required = self.config.desired_lock_amount_in_satoshis > 0;
        match state {
            CurrentLockState::Pending => {
                debug!("lock transaction pending confirmation");
                Ok(())
            }
            CurrentLockState::None if lock_required => self.create_first_lock().await,
            CurrentLockState::None => Ok(()),
            CurrentLockState::Confirmed { lock, record } if lock_required => {
                self.renew_or_release(lock, record).await
            }
            CurrentLockState::Confirmed { lock, .. } => self.release_lock(&lock).await,
        }
    }

    /// Reconstruct the lock state from the last store record plus
    /// on-chain presence.
    async fn reconcile(&self) -> Result<CurrentLockState> {
        let Some(record) = self.store.last().await? else {
            return Ok(CurrentLockState::None);
        };

        match record.record_type {
            LockTransactionType::ReturnToWallet => {
                if !self.is_on_chain(&record.transaction_id).await? {
                    self.rebroadcast(&record).await?;
                }
                Ok(CurrentLockState::None)
            }
            LockTransactionType::Create | LockTransactionType::Relock => {
                let identifier = LockIdentifier {
                    transaction_id: record.transaction_id.clone(),
                    redeem_script_as_hex: record.redeem_script_as_hex.clone(),
                };
                match self.resolver.resolve(&identifier).await {
                    Ok(lock) => Ok(CurrentLockState::Confirmed { lock, record }),
                    Err(LockError::TransactionNotFound(_)) => {
                        self.rebroadcast(&record).await?;
                        Ok(CurrentLockState::Pending)
                    }
                    // Any other resolver error is fatal to this tick.
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn is_on_chain(&self, transaction_id: &str) -> Result<bool> {
        match self.client.get_raw_transaction(transaction_id).await {
            Ok(_) => Ok(true),
            Err(LockError::TransactionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Rebroadcast a stored raw transaction. Idempotent: the node
    /// rejects double-spends, so "already mined" and "now mined"
    /// converge to the same state.
    async fn rebroadcast(&self, record: &LockTransactionRecord) -> Result<()> {
        info!(txid = %record.transaction_id, "rebroadcasting stored lock transaction");
        let transaction = BitcoinLockTransaction {
            transaction_id: record.transaction_id.clone(),
            redeem_script_as_hex: record.redeem_script_as_hex.clone(),
            serialized_transaction: record.raw_transaction.clone(),
            transaction_fee: 0,
        };
        self.client.broadcast_lock_transaction(&transaction).await?;
        Ok(())
    }

    async fn create_first_lock(&self) -> Result<()> {
        let desired = self.config.desired_lock_amount_in_satoshis;
        let fee_reserve = self.config.first_lock_fee_amount_in_satoshis;
        let needed = desired + fee_reserve;

        let available = self.client.get_balance_in_satoshis().await?;
        if available <= needed {
            return Err(LockError::NotEnoughBalanceForFirstLock { needed, available });
        }

        let height = self.client.get_current_block_height().await?;
        let lock_until_block = height + self.config.lock_period_in_blocks;
        // The fee reserve is locked along with the target amount so
        // later relocks can pay their fees out of the lock itself.
        let transaction = self
            .client
            .create_lock_transaction(needed, lock_until_block)
            .await?;

        info!(
            txid = %transaction.transaction_id,
            amount = needed,
            lock_until_block,
            "creating value-time-lock"
        );
        self.save_then_broadcast(LockTransactionType::Create, &transaction)
            .await
    }

    async fn renew_or_release(
        &self,
        lock: ValueTimeLock,
        record: LockTransactionRecord,
    ) -> Result<()> {
        let height = self.client.get_current_block_height().await?;
        if lock.unlock_transaction_time.saturating_sub(height) > 1 {
            // Not close to expiry; leave it alone.
            return Ok(());
        }

        if record.desired_lock_amount_in_satoshis != self.config.desired_lock_amount_in_satoshis {
            info!(
                recorded = record.desired_lock_amount_in_satoshis,
                configured = self.config.desired_lock_amount_in_satoshis,
                "lock target changed, releasing lock"
            );
            return self.release_lock(&lock).await;
        }

        match self.renew_lock(&lock).await? {
            RelockOutcome::Relocked => Ok(()),
            RelockOutcome::InsufficientFundsFallbackToRelease => {
                warn!("relock fee would drop the lock below target, releasing instead");
                self.release_lock(&lock).await
            }
        }
    }

    async fn renew_lock(&self, lock: &ValueTimeLock) -> Result<RelockOutcome> {
        let identifier = LockIdentifier::decode(&lock.identifier)?;
        let height = self.client.get_current_block_height().await?;
        let new_lock_until_block = height + self.config.lock_period_in_blocks;

        let transaction = self
            .client
            .create_relock_transaction(
                &identifier.transaction_id,
                lock.unlock_transaction_time,
                new_lock_until_block,
            )
            .await?;

        // The relock fee comes out of the locked amount.
        if lock.amount_locked.saturating_sub(transaction.transaction_fee)
            < self.config.desired_lock_amount_in_satoshis
        {
            return Ok(RelockOutcome::InsufficientFundsFallbackToRelease);
        }

        info!(
            txid = %transaction.transaction_id,
            lock_until_block = new_lock_until_block,
            "relocking value-time-lock"
        );
        self.save_then_broadcast(LockTransactionType::Relock, &transaction)
            .await?;
        Ok(RelockOutcome::Relocked)
    }

    async fn release_lock(&self, lock: &ValueTimeLock) -> Result<()> {
        let identifier = LockIdentifier::decode(&lock.identifier)?;
        let transaction = self
            .client
            .create_release_lock_transaction(
                &identifier.transaction_id,
                lock.unlock_transaction_time,
            )
            .await?;

        info!(txid = %transaction.transaction_id, "releasing value-time-lock back to wallet");
        self.save_then_broadcast(LockTransactionType::ReturnToWallet, &transaction)
            .await
    }

    /// Store first, then broadcast.
    ///
    /// A crash between the two is recovered by the next tick's
    /// rebroadcast path; the reverse order would leave an on-chain
    /// transaction the monitor cannot discover from its own state.
    async fn save_then_broadcast(
        &self,
        record_type: LockTransactionType,
        transaction: &BitcoinLockTransaction,
    ) -> Result<()> {
        let record = LockTransactionRecord::new(
            record_type,
            &transaction.transaction_id,
            &transaction.redeem_script_as_hex,
            &transaction.serialized_transaction,
            self.config.desired_lock_amount_in_satoshis,
        );
        self.store.append(&record).await?;
        self.client.broadcast_lock_transaction(transaction).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLockClient;
    use crate::store::MemoryLockStore;

    const DESIRED: u64 = 1_000_000;
    const FIRST_LOCK_FEE: u64 = 2_000;
    const LOCK_PERIOD: u64 = 10;

    fn config(desired: u64) -> LockMonitorConfig {
        LockMonitorConfig {
            poll_period: Duration::from_millis(10),
            desired_lock_amount_in_satoshis: desired,
            lock_period_in_blocks: LOCK_PERIOD,
            first_lock_fee_amount_in_satoshis: FIRST_LOCK_FEE,
        }
    }

    fn monitor(
        client: &Arc<MockLockClient>,
        store: &Arc<MemoryLockStore>,
        desired: u64,
    ) -> LockMonitor<MockLockClient, MemoryLockStore> {
        LockMonitor::new(Arc::clone(client), Arc::clone(store), config(desired))
    }

    #[tokio::test]
    async fn test_cold_start_create_then_noop_then_relock() {
        let client = Arc::new(MockLockClient::new(DESIRED + FIRST_LOCK_FEE + 1));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        // First tick creates a lock sized desired + fee reserve.
        monitor.tick().await.unwrap();
        assert_eq!(store.len(), 1);
        let created = store.last().await.unwrap().unwrap();
        assert_eq!(created.record_type, LockTransactionType::Create);
        assert!(client.contains_transaction(&created.transaction_id));

        // One block later: no-op.
        client.advance_blocks(1);
        monitor.tick().await.unwrap();
        assert_eq!(store.len(), 1);
        let lock = monitor.current_lock().unwrap();
        assert_eq!(lock.amount_locked, DESIRED + FIRST_LOCK_FEE);
        assert_eq!(lock.unlock_transaction_time, 100 + LOCK_PERIOD);

        // lock_period - 1 blocks after creation: within one block of
        // expiry, so the tick relocks.
        client.advance_blocks(LOCK_PERIOD - 2);
        monitor.tick().await.unwrap();
        assert_eq!(store.len(), 2);
        let relocked = store.last().await.unwrap().unwrap();
        assert_eq!(relocked.record_type, LockTransactionType::Relock);
        assert!(client.contains_transaction(&relocked.transaction_id));

        // The relocked amount still covers the target.
        monitor.tick().await.unwrap();
        let lock = monitor.current_lock().unwrap();
        assert!(lock.amount_locked >= DESIRED);
    }

    #[tokio::test]
    async fn test_crash_recovery_rebroadcasts_without_duplicate_record() {
        let client = Arc::new(MockLockClient::new(DESIRED + FIRST_LOCK_FEE + 1));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        monitor.tick().await.unwrap();
        let created = store.last().await.unwrap().unwrap();

        // Simulate a crash between store and broadcast: the transaction
        // vanishes from the chain but the record survives.
        client.evict_transaction(&created.transaction_id);

        monitor.tick().await.unwrap();
        assert_eq!(store.len(), 1, "no duplicate record");
        assert!(client.contains_transaction(&created.transaction_id));
        assert!(monitor.current_lock().is_none(), "pending, not active");

        // Once visible again, the next tick confirms it.
        monitor.tick().await.unwrap();
        assert!(monitor.current_lock().is_some());
    }

    #[tokio::test]
    async fn test_zero_desired_amount_is_noop() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, 0);

        monitor.tick().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(client.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_for_first_lock() {
        let client = Arc::new(MockLockClient::new(DESIRED));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        let result = monitor.tick().await;
        assert!(matches!(
            result,
            Err(LockError::NotEnoughBalanceForFirstLock { .. })
        ));
        assert!(store.is_empty(), "failed tick must not mutate state");
    }

    #[tokio::test]
    async fn test_lock_released_when_no_longer_required() {
        let client = Arc::new(MockLockClient::new(DESIRED + FIRST_LOCK_FEE + 1));
        let store = Arc::new(MemoryLockStore::new());

        monitor(&client, &store, DESIRED).tick().await.unwrap();

        // Reconfigured to no lock: release regardless of expiry.
        let released = monitor(&client, &store, 0);
        released.tick().await.unwrap();
        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.record_type, LockTransactionType::ReturnToWallet);
        assert!(client.contains_transaction(&last.transaction_id));

        // Follow-up tick sees the release on-chain and stays idle.
        released.tick().await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_amount_change_near_expiry_releases() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let store = Arc::new(MemoryLockStore::new());

        monitor(&client, &store, DESIRED).tick().await.unwrap();

        // Double the target; nothing happens until expiry approaches.
        let bigger = monitor(&client, &store, DESIRED * 2);
        bigger.tick().await.unwrap();
        assert_eq!(store.len(), 1);

        client.advance_blocks(LOCK_PERIOD - 1);
        bigger.tick().await.unwrap();
        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.record_type, LockTransactionType::ReturnToWallet);
    }

    #[tokio::test]
    async fn test_relock_insufficiency_falls_back_to_release() {
        // A relock fee so large the renewed lock would undershoot the
        // target.
        let client =
            Arc::new(MockLockClient::new(10_000_000).with_fee(FIRST_LOCK_FEE + 1));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        monitor.tick().await.unwrap();
        client.advance_blocks(LOCK_PERIOD - 1);
        monitor.tick().await.unwrap();

        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.record_type, LockTransactionType::ReturnToWallet);
    }

    #[tokio::test]
    async fn test_release_then_recreate_cycle() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        monitor.tick().await.unwrap();
        client.advance_blocks(LOCK_PERIOD - 1);

        // Force a release by shrinking the target, then restore it.
        let shrunk = LockMonitor::new(
            Arc::clone(&client),
            Arc::clone(&store),
            config(DESIRED / 2),
        );
        shrunk.tick().await.unwrap();
        assert_eq!(
            store.last().await.unwrap().unwrap().record_type,
            LockTransactionType::ReturnToWallet
        );

        // The original monitor sees the release on-chain and starts over.
        monitor.tick().await.unwrap();
        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.record_type, LockTransactionType::Create);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_resolver_error_aborts_tick() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = monitor(&client, &store, DESIRED);

        monitor.tick().await.unwrap();

        // Corrupt the stored redeem script: the resolver now fails with
        // something other than TransactionNotFound.
        let mut bad = store.last().await.unwrap().unwrap();
        bad.redeem_script_as_hex = "00".to_string();
        store.append(&bad).await.unwrap();

        assert!(matches!(
            monitor.tick().await,
            Err(LockError::InvalidRedeemScript(_))
        ));
        assert_eq!(store.len(), 2, "aborted tick appends nothing");
    }

    #[tokio::test]
    async fn test_initialize_polls_and_repeated_calls_do_not_overlap() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let store = Arc::new(MemoryLockStore::new());
        let monitor = Arc::new(LockMonitor::new(
            Arc::clone(&client),
            Arc::clone(&store),
            config(DESIRED),
        ));

        monitor.initialize().unwrap();
        // Re-initializing cancels the in-flight schedule before starting.
        monitor.initialize().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.shutdown();

        assert!(!store.is_empty());
        assert_eq!(
            store.records()[0].record_type,
            LockTransactionType::Create
        );
        // Exactly one lock was ever created.
        let creates = store
            .records()
            .iter()
            .filter(|r| r.record_type == LockTransactionType::Create)
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_config_validation() {
        let mut bad = config(DESIRED);
        bad.poll_period = Duration::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = config(DESIRED);
        bad.lock_period_in_blocks = 0;
        assert!(bad.validate().is_err());

        assert!(config(DESIRED).validate().is_ok());
    }
}
