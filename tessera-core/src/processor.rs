//! Deterministic DID state evolution.
//!
//! The processor applies anchored operations to a per-DID resolution
//! state. Two replicas fed the same anchored sequence end up with
//! byte-identical documents: every decision here is a pure function of
//! the current state and the operation buffer.
//!
//! `apply` never returns an error to the caller. Parse and validation
//! failures are debug-logged and reported as `false`, and a rejected
//! operation leaves the state untouched: the transition is computed on
//! a scratch copy and committed only on success.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{apply_patches, DidDocument, KeyUsage, RecoveryPublicKey};
use crate::error::CoreError;
use crate::multihash;
use crate::operations::{
    CreateOperation, Operation, RecoverOperation, RevokeOperation, UpdateOperation,
};

/// An operation annotated with its position in the anchored total
/// order. Ordering is `(transaction_number, operation_index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredOperation {
    /// Logical time of the anchoring transaction (block height).
    pub transaction_time: u64,
    /// Globally unique anchoring transaction number.
    pub transaction_number: u64,
    /// Position of the operation within its batch.
    pub operation_index: u32,
    /// The original operation request exactly as anchored.
    pub operation_buffer: Vec<u8>,
}

/// Per-DID resolution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidState {
    /// The DID unique suffix this state tracks.
    pub did_unique_suffix: String,
    /// The external document; absent before a Create is applied.
    pub did_document: Option<DidDocument>,
    /// Internal bookkeeping that drives operation acceptance.
    pub metadata: DidStateMetadata,
}

/// Resolution metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidStateMetadata {
    /// Key guarding Recover and Revoke; cleared by Revoke.
    pub recovery_key: Option<RecoveryPublicKey>,
    /// Commitment to the next recovery OTP; cleared by Revoke.
    pub next_recovery_otp_hash: Option<String>,
    /// Commitment to the next update OTP; cleared by Revoke.
    pub next_update_otp_hash: Option<String>,
    /// Transaction number of the last applied operation.
    pub last_operation_transaction_number: Option<u64>,
}

impl DidState {
    /// Fresh state for a DID that has no operations applied yet.
    pub fn new(did_unique_suffix: impl Into<String>) -> Self {
        Self {
            did_unique_suffix: did_unique_suffix.into(),
            did_document: None,
            metadata: DidStateMetadata::default(),
        }
    }

    /// Whether the DID has been permanently terminated.
    ///
    /// A revoked DID keeps its last document but accepts no further
    /// operations.
    pub fn is_revoked(&self) -> bool {
        self.did_document.is_some() && self.metadata.recovery_key.is_none()
    }
}

/// Why an operation was not applied. Internal only; surfaced as a debug
/// log line and a `false` return.
enum Rejection {
    Parse(CoreError),
    Invalid(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Parse(e) => write!(f, "parse failure: {e}"),
            Rejection::Invalid(reason) => f.write_str(reason),
        }
    }
}

impl From<CoreError> for Rejection {
    fn from(e: CoreError) -> Self {
        Rejection::Parse(e)
    }
}

/// Applies anchored operations to per-DID resolution state.
///
/// The processor holds no state of its own; applying operations to
/// different DIDs is embarrassingly parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationProcessor;

impl OperationProcessor {
    /// Create a processor.
    pub fn new() -> Self {
        Self
    }

    /// Apply one anchored operation. Returns whether it was accepted.
    pub fn apply(&self, anchored: &AnchoredOperation, state: &mut DidState) -> bool {
        match self.try_apply(anchored, state) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(rejection) => {
                debug!(
                    did = %state.did_unique_suffix,
                    transaction_number = anchored.transaction_number,
                    operation_index = anchored.operation_index,
                    reason = %rejection,
                    "operation rejected"
                );
                false
            }
        }
    }

    fn try_apply(
        &self,
        anchored: &AnchoredOperation,
        state: &DidState,
    ) -> Result<DidState, Rejection> {
        let operation = Operation::parse(&anchored.operation_buffer)?;
        let mut next = match operation {
            Operation::Create(op) => self.apply_create(op, state)?,
            Operation::Update(op) => self.apply_update(op, state)?,
            Operation::Recover(op) => self.apply_recover(op, state)?,
            Operation::Revoke(op) => self.apply_revoke(op, state)?,
        };
        next.metadata.last_operation_transaction_number = Some(anchored.transaction_number);
        Ok(next)
    }

    fn apply_create(
        &self,
        op: CreateOperation,
        state: &DidState,
    ) -> Result<DidState, Rejection> {
        if state.did_document.is_some() {
            return Err(Rejection::Invalid("only one create per DID"));
        }
        if op.did_unique_suffix != state.did_unique_suffix {
            return Err(Rejection::Invalid(
                "derived suffix does not match the claimed DID",
            ));
        }
        if !multihash::is_valid_hash(
            &op.encoded_operation_data,
            &op.suffix_data.operation_data_hash,
        ) {
            return Err(Rejection::Invalid(
                "operation data does not match committed hash",
            ));
        }

        let mut document = op.operation_data.document;
        document.id = state.did_unique_suffix.clone();

        Ok(DidState {
            did_unique_suffix: state.did_unique_suffix.clone(),
            did_document: Some(document),
            metadata: DidStateMetadata {
                recovery_key: Some(op.suffix_data.recovery_key),
                next_recovery_otp_hash: Some(op.suffix_data.next_recovery_otp_hash),
                next_update_otp_hash: Some(op.operation_data.next_update_otp_hash),
                last_operation_transaction_number: None,
            },
        })
    }

    fn apply_update(
        &self,
        op: UpdateOperation,
        state: &DidState,
    ) -> Result<DidState, Rejection> {
        let document = state
            .did_document
            .as_ref()
            .ok_or(Rejection::Invalid("no document to update"))?;
        if op.did_unique_suffix != state.did_unique_suffix {
            return Err(Rejection::Invalid("operation addresses a different DID"));
        }

        // Revoked DIDs have no commitment left, so this also makes
        // revocation terminal.
        let committed = state
            .metadata
            .next_update_otp_hash
            .as_deref()
            .ok_or(Rejection::Invalid("no update commitment"))?;
        if !multihash::is_valid_hash(&op.update_otp, committed) {
            return Err(Rejection::Invalid("update OTP does not match commitment"));
        }

        if !multihash::is_valid_hash(
            &op.encoded_operation_data,
            &op.signed_operation_data_hash.payload,
        ) {
            return Err(Rejection::Invalid(
                "operation data does not match signed hash",
            ));
        }

        let header = op.signed_operation_data_hash.header()?;
        let signing_key = document
            .public_key
            .iter()
            .find(|k| k.id == header.kid && k.usage == KeyUsage::Signing)
            .ok_or(Rejection::Invalid("no signing key matches kid"))?;
        let public_key_hex = signing_key
            .public_key_hex
            .as_deref()
            .ok_or(Rejection::Invalid("signing key has no key material"))?;
        op.signed_operation_data_hash.verify(public_key_hex)?;

        let document = apply_patches(document, &op.operation_data.patches);

        Ok(DidState {
            did_unique_suffix: state.did_unique_suffix.clone(),
            did_document: Some(document),
            metadata: DidStateMetadata {
                recovery_key: state.metadata.recovery_key.clone(),
                next_recovery_otp_hash: state.metadata.next_recovery_otp_hash.clone(),
                next_update_otp_hash: Some(op.operation_data.next_update_otp_hash),
                last_operation_transaction_number: None,
            },
        })
    }

    fn apply_recover(
        &self,
        op: RecoverOperation,
        state: &DidState,
    ) -> Result<DidState, Rejection> {
        if state.did_document.is_none() {
            return Err(Rejection::Invalid("no document to recover"));
        }
        if op.did_unique_suffix != state.did_unique_suffix {
            return Err(Rejection::Invalid("operation addresses a different DID"));
        }

        let recovery_key = state
            .metadata
            .recovery_key
            .as_ref()
            .ok_or(Rejection::Invalid("no recovery key"))?;
        let committed = state
            .metadata
            .next_recovery_otp_hash
            .as_deref()
            .ok_or(Rejection::Invalid("no recovery commitment"))?;
        if !multihash::is_valid_hash(&op.recovery_otp, committed) {
            return Err(Rejection::Invalid(
                "recovery OTP does not match commitment",
            ));
        }

        op.signed_operation_data.verify(&recovery_key.public_key_hex)?;

        if !multihash::is_valid_hash(
            &op.encoded_operation_data,
            &op.signed_data.operation_data_hash,
        ) {
            return Err(Rejection::Invalid(
                "operation data does not match signed hash",
            ));
        }

        let mut document = op.operation_data.document;
        document.id = state.did_unique_suffix.clone();

        Ok(DidState {
            did_unique_suffix: state.did_unique_suffix.clone(),
            did_document: Some(document),
            metadata: DidStateMetadata {
                recovery_key: Some(op.signed_data.new_recovery_key),
                next_recovery_otp_hash: Some(op.signed_data.next_recovery_otp_hash),
                next_update_otp_hash: Some(op.operation_data.next_update_otp_hash),
                last_operation_transaction_number: None,
            },
        })
    }

    fn apply_revoke(
        &self,
        op: RevokeOperation,
        state: &DidState,
    ) -> Result<DidState, Rejection> {
        if state.did_document.is_none() {
            return Err(Rejection::Invalid("no document to revoke"));
        }
        if op.did_unique_suffix != state.did_unique_suffix {
            return Err(Rejection::Invalid("operation addresses a different DID"));
        }

        let recovery_key = state
            .metadata
            .recovery_key
            .as_ref()
            .ok_or(Rejection::Invalid("no recovery key"))?;
        let committed = state
            .metadata
            .next_recovery_otp_hash
            .as_deref()
            .ok_or(Rejection::Invalid("no recovery commitment"))?;
        if !multihash::is_valid_hash(&op.recovery_otp, committed) {
            return Err(Rejection::Invalid(
                "recovery OTP does not match commitment",
            ));
        }

        op.signed_operation_data.verify(&recovery_key.public_key_hex)?;

        // The document is preserved for resolution; clearing the key and
        // both commitments makes every further operation fail.
        Ok(DidState {
            did_unique_suffix: state.did_unique_suffix.clone(),
            did_document: state.did_document.clone(),
            metadata: DidStateMetadata {
                recovery_key: None,
                next_recovery_otp_hash: None,
                next_update_otp_hash: None,
                last_operation_transaction_number: None,
            },
        })
    }
}
