//! Bitcoin Core RPC client wrapper.

use std::collections::HashMap;

use bitcoin::{Address, Amount, Transaction, Txid};
use bitcoincore_rpc::json::{
    EstimateMode, FundRawTransactionResult, SignRawTransactionInput, SignRawTransactionResult,
};
use bitcoincore_rpc::{Auth, Client, RpcApi};

use crate::config::BitcoinConfig;
use crate::error::{BitcoinError, Result};

/// Thin wrapper around the Bitcoin Core RPC client.
pub struct BitcoinRpc {
    client: Client,
    config: BitcoinConfig,
}

impl BitcoinRpc {
    /// Create a new RPC client.
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(pass)) => Auth::UserPass(user.clone(), pass.clone()),
            _ => Auth::None,
        };

        let url = if let Some(ref wallet) = config.wallet {
            format!("{}/wallet/{}", config.rpc_url, wallet)
        } else {
            config.rpc_url.clone()
        };

        let client =
            Client::new(&url, auth).map_err(|e| BitcoinError::RpcConnection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BitcoinConfig {
        &self.config
    }

    /// Get current block count.
    pub fn get_block_count(&self) -> Result<u64> {
        Ok(self.client.get_block_count()?)
    }

    /// Get spendable wallet balance.
    pub fn get_balance(&self) -> Result<Amount> {
        self.client
            .get_balance(None, None)
            .map_err(|e| BitcoinError::Wallet(e.to_string()))
    }

    /// Get a raw transaction in consensus hex.
    pub fn get_raw_transaction_hex(&self, txid: &Txid) -> Result<String> {
        self.client
            .get_raw_transaction_hex(txid, None)
            .map_err(|e| BitcoinError::TxNotFound(e.to_string()))
    }

    /// Broadcast a raw transaction hex.
    pub fn send_raw_transaction(&self, tx_hex: &str) -> Result<Txid> {
        self.client
            .send_raw_transaction(tx_hex)
            .map_err(|e| BitcoinError::Broadcast(e.to_string()))
    }

    /// Create an unfunded raw transaction paying the given outputs.
    pub fn create_raw_transaction_hex(
        &self,
        outputs: &HashMap<String, Amount>,
    ) -> Result<String> {
        self.client
            .create_raw_transaction_hex(&[], outputs, None, None)
            .map_err(|e| BitcoinError::TxBuild(e.to_string()))
    }

    /// Let the wallet select inputs and add change.
    pub fn fund_raw_transaction(&self, tx_hex: &str) -> Result<FundRawTransactionResult> {
        self.client
            .fund_raw_transaction(tx_hex, None, None)
            .map_err(|e| BitcoinError::Wallet(e.to_string()))
    }

    /// Sign a transaction with the wallet, optionally describing
    /// non-wallet inputs (P2SH lock spends).
    pub fn sign_raw_transaction_with_wallet(
        &self,
        tx: &Transaction,
        inputs: Option<&[SignRawTransactionInput]>,
    ) -> Result<SignRawTransactionResult> {
        self.client
            .sign_raw_transaction_with_wallet(tx, inputs, None)
            .map_err(|e| BitcoinError::Wallet(e.to_string()))
    }

    /// Generate a fresh wallet address.
    pub fn get_new_address(&self) -> Result<Address> {
        let unchecked = self
            .client
            .get_new_address(None, None)
            .map_err(|e| BitcoinError::Wallet(e.to_string()))?;
        unchecked
            .require_network(self.config.network.to_bitcoin_network())
            .map_err(|e| BitcoinError::InvalidAddress(e.to_string()))
    }

    /// Estimate a fee rate in sat/vB, falling back to the configured
    /// rate when the node has no estimate.
    pub fn estimate_fee_rate(&self) -> Result<u64> {
        let estimate = self
            .client
            .estimate_smart_fee(self.config.fee_target_blocks, Some(EstimateMode::Economical))
            .map_err(|e| BitcoinError::FeeEstimation(e.to_string()))?;

        if let Some(rate) = estimate.fee_rate {
            // Convert from BTC/kvB to sat/vB.
            let sat_per_vb = (rate.to_btc() * 100_000.0).ceil() as u64;
            Ok(sat_per_vb.max(1))
        } else {
            Ok(self.config.fallback_fee_rate_sat_vb)
        }
    }

    /// Test the connection and verify the network matches.
    pub fn test_connection(&self) -> Result<()> {
        let info = self.client.get_blockchain_info()?;

        let expected = self.config.network.to_bitcoin_network();
        if info.chain != expected {
            return Err(BitcoinError::NetworkMismatch {
                expected: format!("{:?}", expected),
                got: format!("{:?}", info.chain),
            });
        }
        Ok(())
    }
}
