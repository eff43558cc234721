//! Tessera lock: the bitcoin value-time-lock subsystem.
//!
//! A Tessera node posts an economic bond as a time-locked bitcoin
//! output. This crate keeps that bond alive:
//!
//! - [`identifier`] - `(txid, redeemScript)` identifier codec
//! - [`script`] - canonical CLTV redeem script build/parse
//! - [`resolver`] - proves an on-chain output is a well-formed lock
//! - [`monitor`] - the create/relock/release control loop
//! - [`store`] - durable append-only log of monitor actions
//! - [`client`] - the abstract wallet contract a real node plugs into
//! - [`mock`] - in-memory client for tests and development
//!
//! The concrete `bitcoincore-rpc` backend lives in the
//! `tessera-lock-bitcoin` crate.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod identifier;
pub mod mock;
pub mod monitor;
pub mod resolver;
pub mod script;
pub mod store;

pub use client::{BitcoinLockTransaction, LockClient};
pub use error::{LockError, Result};
pub use identifier::LockIdentifier;
pub use monitor::{LockMonitor, LockMonitorConfig};
pub use resolver::{LockResolver, ValueTimeLock};
pub use script::{build_redeem_script, parse_redeem_script, parse_redeem_script_hex, LockScript};
pub use store::{
    FileLockStore, LockTransactionRecord, LockTransactionStore, LockTransactionType,
    MemoryLockStore,
};
