//! Bitcoin Core backend for the Tessera lock subsystem.
//!
//! This crate plugs a real node into the `tessera-lock` client
//! contract via the wallet RPC:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      LOCK TRANSACTION FLOW                     │
//! │                                                                │
//! │  create:   wallet UTXOs ──fund/sign──► P2SH(CLTV lock script)  │
//! │  relock:   matured lock ──spend──────► P2SH(new lock script)   │
//! │  release:  matured lock ──spend──────► fresh wallet address    │
//! │                                                                │
//! │  The monitor persists each action before it is broadcast.      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tessera_lock_bitcoin::{BitcoinConfig, CoreLockClient, Network};
//!
//! let config = BitcoinConfig::new("http://localhost:8332", Network::Testnet)
//!     .with_auth("user", "password")
//!     .with_wallet_public_key(wallet_public_key_hex);
//!
//! let client = CoreLockClient::connect(config)?;
//! // Hand the client to a LockMonitor.
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod client;
mod config;
mod error;
mod rpc;

pub use client::CoreLockClient;
pub use config::{BitcoinConfig, Network};
pub use error::{BitcoinError, Result};

/// Default fee estimation target in blocks.
pub const DEFAULT_FEE_TARGET_BLOCKS: u16 = 6;

/// Fallback fee rate in sat/vB when the node cannot estimate one.
pub const DEFAULT_FALLBACK_FEE_RATE_SAT_VB: u64 = 10;

/// Estimated virtual size of a one-input lock spend, used for fee
/// calculation on relock and release transactions.
pub const SPEND_TRANSACTION_VSIZE: u64 = 250;
