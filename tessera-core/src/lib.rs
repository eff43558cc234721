//! Tessera core: deterministic DID operation processing.
//!
//! This crate is the protocol heart of a Tessera node: it turns an
//! ordered stream of anchored operation requests into per-DID document
//! state, identically on every replica.
//!
//! - [`encoder`] - base64url (no padding) payload codec
//! - [`multihash`] - self-describing sha2-256 content hashes
//! - [`jws`] - flattened JWS parsing and ES256K verification
//! - [`operations`] - typed parsing of Create / Update / Recover / Revoke
//! - [`document`] - DID document model and patch composer
//! - [`processor`] - the per-DID state transition function
//!
//! # Example
//!
//! ```ignore
//! use tessera_core::{AnchoredOperation, DidState, OperationProcessor};
//!
//! let processor = OperationProcessor::new();
//! let mut state = DidState::new(did_unique_suffix);
//!
//! for operation in anchored_operations {
//!     // Invalid operations are logged and skipped; state only ever
//!     // changes when an operation is accepted.
//!     processor.apply(&operation, &mut state);
//! }
//!
//! let document = state.did_document;
//! ```

pub mod document;
pub mod encoder;
pub mod error;
pub mod jws;
pub mod multihash;
pub mod operations;
pub mod processor;

pub use document::{
    apply_patches, DidDocument, DocumentKey, DocumentService, KeyUsage, Patch, RecoveryPublicKey,
    ServiceEndpoint,
};
pub use error::{CoreError, Result};
pub use jws::{Jws, JwsHeader, JWS_ALGORITHM};
pub use operations::{
    CreateOperation, Operation, OperationType, RecoverOperation, RevokeOperation, UpdateOperation,
    MAX_OTP_LENGTH,
};
pub use processor::{AnchoredOperation, DidState, DidStateMetadata, OperationProcessor};
