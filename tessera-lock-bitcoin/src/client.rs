//! The `LockClient` implementation over Bitcoin Core.

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::{
    transaction, Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use bitcoincore_rpc::json::SignRawTransactionInput;
use tracing::debug;

use tessera_lock::{script, BitcoinLockTransaction, LockClient};

use crate::config::BitcoinConfig;
use crate::error::{BitcoinError, Result};
use crate::rpc::BitcoinRpc;
use crate::SPEND_TRANSACTION_VSIZE;

/// Lock client backed by a Bitcoin Core node's wallet.
pub struct CoreLockClient {
    rpc: BitcoinRpc,
    network: bitcoin::Network,
    /// HASH160 of the configured wallet public key; the owner of every
    /// lock script this client creates.
    owner_pub_key_hash: [u8; 20],
}

impl CoreLockClient {
    /// Create a client from configuration.
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        let key_bytes = hex::decode(&config.wallet_public_key_hex)?;
        let public_key = bitcoin::PublicKey::from_slice(&key_bytes)
            .map_err(|e| BitcoinError::InvalidKey(e.to_string()))?;
        let owner_pub_key_hash = public_key.pubkey_hash().to_byte_array();

        let network = config.network.to_bitcoin_network();
        let rpc = BitcoinRpc::new(config)?;

        Ok(Self {
            rpc,
            network,
            owner_pub_key_hash,
        })
    }

    /// Create a client and verify the node connection.
    pub fn connect(config: BitcoinConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.rpc.test_connection()?;
        Ok(client)
    }

    fn parse_txid(transaction_id: &str) -> Result<Txid> {
        transaction_id
            .parse::<Txid>()
            .map_err(|e| BitcoinError::InvalidTx(e.to_string()))
    }

    /// Locate the lock output of a previous lock transaction:
    /// `(vout, value, redeem script, script pubkey)`.
    fn find_lock_output(
        &self,
        transaction_id: &str,
        lock_until_block: u64,
    ) -> Result<(u32, Amount, ScriptBuf, ScriptBuf)> {
        let txid = Self::parse_txid(transaction_id)?;
        let raw = self.rpc.get_raw_transaction_hex(&txid)?;
        let transaction: Transaction = encode::deserialize(&hex::decode(&raw)?)?;

        let redeem = script::build_redeem_script(lock_until_block, &self.owner_pub_key_hash);
        let script_pubkey = redeem.to_p2sh();

        let vout = transaction
            .output
            .iter()
            .position(|output| output.script_pubkey == script_pubkey)
            .ok_or_else(|| {
                BitcoinError::InvalidTx(format!(
                    "transaction {transaction_id} has no lock output for height {lock_until_block}"
                ))
            })?;

        let value = transaction.output[vout].value;
        Ok((vout as u32, value, redeem, script_pubkey))
    }

    /// Fee for a one-input lock spend at the current estimated rate.
    fn spend_fee(&self) -> Result<Amount> {
        let rate = self.rpc.estimate_fee_rate()?;
        Ok(Amount::from_sat(rate * SPEND_TRANSACTION_VSIZE))
    }

    /// Build and wallet-sign a transaction spending a matured lock
    /// output into `pay_to`.
    fn spend_lock(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
        pay_to: ScriptBuf,
    ) -> Result<(Transaction, Amount)> {
        let (vout, value, prev_redeem, prev_script_pubkey) =
            self.find_lock_output(existing_lock_transaction_id, existing_lock_until_block)?;

        let fee = self.spend_fee()?;
        let spend_value = value
            .to_sat()
            .checked_sub(fee.to_sat())
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                BitcoinError::TxBuild(format!(
                    "lock value {} cannot cover spend fee {}",
                    value, fee
                ))
            })?;

        // CLTV spends need nLockTime at the lock height and a
        // non-final sequence.
        let lock_time = LockTime::from_height(existing_lock_until_block as u32)
            .map_err(|e| BitcoinError::TxBuild(e.to_string()))?;

        let unsigned = Transaction {
            version: transaction::Version::TWO,
            lock_time,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Self::parse_txid(existing_lock_transaction_id)?,
                    vout,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(spend_value),
                script_pubkey: pay_to,
            }],
        };

        let prev_input = SignRawTransactionInput {
            txid: unsigned.input[0].previous_output.txid,
            vout,
            script_pub_key: prev_script_pubkey,
            redeem_script: Some(prev_redeem),
            amount: Some(value),
        };
        let signed = self
            .rpc
            .sign_raw_transaction_with_wallet(&unsigned, Some(&[prev_input]))?;
        if !signed.complete {
            return Err(BitcoinError::Wallet(
                "wallet could not fully sign the lock spend".to_string(),
            ));
        }

        let transaction: Transaction = encode::deserialize(&signed.hex)?;
        Ok((transaction, fee))
    }
}

#[async_trait]
impl LockClient for CoreLockClient {
    async fn get_balance_in_satoshis(&self) -> tessera_lock::Result<u64> {
        Ok(self.rpc.get_balance()?.to_sat())
    }

    async fn get_current_block_height(&self) -> tessera_lock::Result<u64> {
        Ok(self.rpc.get_block_count()?)
    }

    async fn get_raw_transaction(&self, transaction_id: &str) -> tessera_lock::Result<String> {
        let txid = Self::parse_txid(transaction_id)?;
        Ok(self.rpc.get_raw_transaction_hex(&txid)?)
    }

    async fn create_lock_transaction(
        &self,
        amount_in_satoshis: u64,
        lock_until_block: u64,
    ) -> tessera_lock::Result<BitcoinLockTransaction> {
        let redeem = script::build_redeem_script(lock_until_block, &self.owner_pub_key_hash);
        let address = Address::p2sh(&redeem, self.network)
            .map_err(|e| BitcoinError::InvalidAddress(e.to_string()))?;

        let mut outputs = HashMap::new();
        outputs.insert(address.to_string(), Amount::from_sat(amount_in_satoshis));

        let unfunded = self.rpc.create_raw_transaction_hex(&outputs)?;
        let funded = self.rpc.fund_raw_transaction(&unfunded)?;

        let funded_transaction: Transaction = encode::deserialize(&funded.hex)
            .map_err(BitcoinError::from)?;
        let signed = self
            .rpc
            .sign_raw_transaction_with_wallet(&funded_transaction, None)?;
        if !signed.complete {
            return Err(BitcoinError::Wallet(
                "wallet could not fully sign the lock transaction".to_string(),
            )
            .into());
        }

        let transaction: Transaction =
            encode::deserialize(&signed.hex).map_err(BitcoinError::from)?;
        debug!(
            txid = %transaction.compute_txid(),
            amount = amount_in_satoshis,
            lock_until_block,
            "built lock transaction"
        );

        Ok(BitcoinLockTransaction {
            transaction_id: transaction.compute_txid().to_string(),
            redeem_script_as_hex: hex::encode(redeem.as_bytes()),
            serialized_transaction: hex::encode(&signed.hex),
            transaction_fee: funded.fee.to_sat(),
        })
    }

    async fn create_relock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
        new_lock_until_block: u64,
    ) -> tessera_lock::Result<BitcoinLockTransaction> {
        let new_redeem =
            script::build_redeem_script(new_lock_until_block, &self.owner_pub_key_hash);
        let (transaction, fee) = self.spend_lock(
            existing_lock_transaction_id,
            existing_lock_until_block,
            new_redeem.to_p2sh(),
        )?;

        Ok(BitcoinLockTransaction {
            transaction_id: transaction.compute_txid().to_string(),
            redeem_script_as_hex: hex::encode(new_redeem.as_bytes()),
            serialized_transaction: encode::serialize_hex(&transaction),
            transaction_fee: fee.to_sat(),
        })
    }

    async fn create_release_lock_transaction(
        &self,
        existing_lock_transaction_id: &str,
        existing_lock_until_block: u64,
    ) -> tessera_lock::Result<BitcoinLockTransaction> {
        let wallet_address = self.rpc.get_new_address()?;
        let previous_redeem =
            script::build_redeem_script(existing_lock_until_block, &self.owner_pub_key_hash);
        let (transaction, fee) = self.spend_lock(
            existing_lock_transaction_id,
            existing_lock_until_block,
            wallet_address.script_pubkey(),
        )?;

        Ok(BitcoinLockTransaction {
            transaction_id: transaction.compute_txid().to_string(),
            redeem_script_as_hex: hex::encode(previous_redeem.as_bytes()),
            serialized_transaction: encode::serialize_hex(&transaction),
            transaction_fee: fee.to_sat(),
        })
    }

    async fn broadcast_lock_transaction(
        &self,
        transaction: &BitcoinLockTransaction,
    ) -> tessera_lock::Result<String> {
        let txid = self
            .rpc
            .send_raw_transaction(&transaction.serialized_transaction)?;
        Ok(txid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    #[test]
    fn test_new_rejects_bad_public_key() {
        let config = BitcoinConfig::new("http://localhost:18443", Network::Regtest)
            .with_wallet_public_key("not-hex");
        assert!(CoreLockClient::new(config).is_err());

        let config = BitcoinConfig::new("http://localhost:18443", Network::Regtest)
            .with_wallet_public_key("0200");
        assert!(CoreLockClient::new(config).is_err(), "truncated key");
    }

    #[test]
    fn test_parse_txid() {
        let txid = "1d1a8e92d02bb2ec4ba5eac0098d76b6e873ae08ac9e9f896e7e8f6f53441a5c";
        assert!(CoreLockClient::parse_txid(txid).is_ok());
        assert!(CoreLockClient::parse_txid("zz").is_err());
    }
}
