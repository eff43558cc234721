//! Bitcoin backend configuration.

use serde::{Deserialize, Serialize};

use crate::error::BitcoinError;

/// Bitcoin network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Network {
    /// Bitcoin mainnet.
    #[default]
    Mainnet,
    /// Bitcoin testnet.
    Testnet,
    /// Bitcoin signet.
    Signet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl Network {
    /// Get the network name.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    /// Convert to the bitcoin crate network type.
    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Configuration for the Bitcoin Core lock client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// RPC endpoint URL.
    pub rpc_url: String,

    /// RPC username (optional).
    pub rpc_user: Option<String>,

    /// RPC password (optional).
    pub rpc_password: Option<String>,

    /// Bitcoin network.
    pub network: Network,

    /// Wallet name (optional, for multi-wallet nodes).
    pub wallet: Option<String>,

    /// Compressed SEC1 public key (hex) owning the lock outputs. Its
    /// private key must live in the node wallet so lock spends can be
    /// signed.
    pub wallet_public_key_hex: String,

    /// Target confirmation blocks for fee estimation.
    pub fee_target_blocks: u16,

    /// Fee rate in sat/vB used when the node cannot estimate one.
    pub fallback_fee_rate_sat_vb: u64,
}

impl BitcoinConfig {
    /// Create a new configuration.
    pub fn new(rpc_url: impl Into<String>, network: Network) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            rpc_user: None,
            rpc_password: None,
            network,
            wallet: None,
            wallet_public_key_hex: String::new(),
            fee_target_blocks: crate::DEFAULT_FEE_TARGET_BLOCKS,
            fallback_fee_rate_sat_vb: crate::DEFAULT_FALLBACK_FEE_RATE_SAT_VB,
        }
    }

    /// Create configuration for regtest.
    pub fn regtest(rpc_url: impl Into<String>) -> Self {
        Self::new(rpc_url, Network::Regtest)
    }

    /// Set RPC authentication.
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self.rpc_password = Some(password.into());
        self
    }

    /// Set wallet name.
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    /// Set the lock-owning wallet public key.
    pub fn with_wallet_public_key(mut self, public_key_hex: impl Into<String>) -> Self {
        self.wallet_public_key_hex = public_key_hex.into();
        self
    }

    /// Set fee estimation target blocks.
    pub fn with_fee_target(mut self, blocks: u16) -> Self {
        self.fee_target_blocks = blocks;
        self
    }

    /// Set the fallback fee rate.
    pub fn with_fallback_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fallback_fee_rate_sat_vb = sat_per_vb;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), BitcoinError> {
        if self.rpc_url.is_empty() {
            return Err(BitcoinError::Config("RPC URL is required".into()));
        }
        if self.wallet_public_key_hex.is_empty() {
            return Err(BitcoinError::Config(
                "wallet public key is required".into(),
            ));
        }
        if self.fallback_fee_rate_sat_vb == 0 {
            return Err(BitcoinError::Config(
                "fallback fee rate must be positive".into(),
            ));
        }
        Ok(())
    }
}
