//! Validation of on-chain value-time-locks.
//!
//! Given a lock identifier, the resolver proves that the named
//! transaction really carries a well-formed lock: the redeem script
//! parses to the canonical form, the transaction exists, and one of its
//! outputs pays to P2SH of that script.

use std::sync::Arc;

use bitcoin::consensus::encode;
use bitcoin::{ScriptBuf, Transaction};
use serde::{Deserialize, Serialize};

use crate::client::LockClient;
use crate::error::{LockError, Result};
use crate::identifier::LockIdentifier;
use crate::script;

/// A validated on-chain value-time-lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTimeLock {
    /// Encoded identifier of the lock.
    pub identifier: String,
    /// Satoshis held by the locked output.
    pub amount_locked: u64,
    /// Block height at which the lock expires.
    pub unlock_transaction_time: u64,
    /// Hex HASH160 of the owning public key.
    pub owner: String,
}

/// Resolves lock identifiers against the chain.
pub struct LockResolver<C> {
    client: Arc<C>,
}

impl<C: LockClient> LockResolver<C> {
    /// Create a resolver over a client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Resolve an identifier into a validated lock.
    ///
    /// [`LockError::TransactionNotFound`] means the funding transaction
    /// is not (yet) visible; every other error means the identifier does
    /// not describe a well-formed lock.
    pub async fn resolve(&self, identifier: &LockIdentifier) -> Result<ValueTimeLock> {
        let lock_script = script::parse_redeem_script_hex(&identifier.redeem_script_as_hex)?;

        let raw_transaction = self
            .client
            .get_raw_transaction(&identifier.transaction_id)
            .await?;
        let transaction: Transaction = encode::deserialize(&hex::decode(&raw_transaction)?)
            .map_err(|e| LockError::InvalidTransaction(e.to_string()))?;

        if transaction.compute_txid().to_string() != identifier.transaction_id {
            return Err(LockError::InvalidTransaction(
                "transaction id does not match fetched transaction".to_string(),
            ));
        }

        let redeem_script = ScriptBuf::from_bytes(hex::decode(&identifier.redeem_script_as_hex)?);
        let pay_to_script = redeem_script.to_p2sh();
        let locked_output = transaction
            .output
            .iter()
            .find(|output| output.script_pubkey == pay_to_script)
            .ok_or_else(|| LockError::LockOutputNotFound(identifier.transaction_id.clone()))?;

        Ok(ValueTimeLock {
            identifier: identifier.encode(),
            amount_locked: locked_output.value.to_sat(),
            unlock_transaction_time: lock_script.lock_until_block,
            owner: hex::encode(lock_script.owner_pub_key_hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLockClient;

    async fn broadcast_lock(
        client: &MockLockClient,
        amount: u64,
        lock_until_block: u64,
    ) -> LockIdentifier {
        let transaction = client
            .create_lock_transaction(amount, lock_until_block)
            .await
            .unwrap();
        client
            .broadcast_lock_transaction(&transaction)
            .await
            .unwrap();
        LockIdentifier {
            transaction_id: transaction.transaction_id,
            redeem_script_as_hex: transaction.redeem_script_as_hex,
        }
    }

    #[tokio::test]
    async fn test_resolve_valid_lock() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let resolver = LockResolver::new(Arc::clone(&client));

        let identifier = broadcast_lock(&client, 2_500_000, 700_123).await;
        let lock = resolver.resolve(&identifier).await.unwrap();

        assert_eq!(lock.amount_locked, 2_500_000);
        assert_eq!(lock.unlock_transaction_time, 700_123);
        assert_eq!(lock.identifier, identifier.encode());
        assert_eq!(lock.owner.len(), 40);
    }

    #[tokio::test]
    async fn test_resolve_missing_transaction() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let resolver = LockResolver::new(Arc::clone(&client));

        // Created but never broadcast.
        let transaction = client.create_lock_transaction(1_000, 700_000).await.unwrap();
        let identifier = LockIdentifier {
            transaction_id: transaction.transaction_id,
            redeem_script_as_hex: transaction.redeem_script_as_hex,
        };

        assert!(matches!(
            resolver.resolve(&identifier).await,
            Err(LockError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_malformed_script_is_not_a_not_found() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let resolver = LockResolver::new(Arc::clone(&client));

        let mut identifier = broadcast_lock(&client, 1_000, 700_000).await;
        identifier.redeem_script_as_hex = "76a914".to_string();

        assert!(matches!(
            resolver.resolve(&identifier).await,
            Err(LockError::InvalidRedeemScript(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_wrong_script_for_transaction() {
        let client = Arc::new(MockLockClient::new(10_000_000));
        let resolver = LockResolver::new(Arc::clone(&client));

        let identifier = broadcast_lock(&client, 1_000, 700_000).await;
        // A well-formed script that the transaction does not pay to.
        let other = script::build_redeem_script(900_000, &[0x11; 20]);
        let identifier = LockIdentifier {
            transaction_id: identifier.transaction_id,
            redeem_script_as_hex: hex::encode(other.as_bytes()),
        };

        assert!(matches!(
            resolver.resolve(&identifier).await,
            Err(LockError::LockOutputNotFound(_))
        ));
    }
}
