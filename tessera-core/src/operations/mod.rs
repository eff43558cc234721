//! Typed parsing and validation of DID operation requests.
//!
//! Parsers are pure: they check structure, decode sub-payloads and pin
//! internal consistency (signed suffix/OTP echoes), but never consult
//! resolution state. State-dependent checks (OTP commitments, signatures
//! against the current document) happen in the processor.

mod create;
mod recover;
mod revoke;
mod update;

pub use create::{CreateOperation, SuffixData};
pub use recover::{RecoverOperation, RecoverSignedData};
pub use revoke::{RevokeOperation, RevokeSignedData};
pub use update::{UpdateOperation, UpdateOperationData};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::DidDocument;
use crate::error::{CoreError, Result};

/// Maximum base64url length of a one-time preimage.
pub const MAX_OTP_LENGTH: usize = 50;

/// The four operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Install the initial document for a new DID.
    Create,
    /// Patch the current document.
    Update,
    /// Replace the document and rotate the recovery key.
    Recover,
    /// Permanently terminate the DID.
    Revoke,
}

/// Operation data shared by Create and Recover: the full replacement
/// document plus the next update commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentOperationData {
    /// The document to install.
    pub document: DidDocument,
    /// Commitment to the OTP authorizing the next Update.
    pub next_update_otp_hash: String,
}

/// A parsed operation together with the buffer it was parsed from.
#[derive(Debug, Clone)]
pub enum Operation {
    /// A parsed Create.
    Create(CreateOperation),
    /// A parsed Update.
    Update(UpdateOperation),
    /// A parsed Recover.
    Recover(RecoverOperation),
    /// A parsed Revoke.
    Revoke(RevokeOperation),
}

impl Operation {
    /// Parse an operation request buffer into its typed form.
    pub fn parse(request: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(request)?;
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::TypeIncorrect("request".to_string()))?;

        let operation_type = require_str(map, "type")?;
        match operation_type {
            "create" => Ok(Operation::Create(CreateOperation::parse(map, request)?)),
            "update" => Ok(Operation::Update(UpdateOperation::parse(map, request)?)),
            "recover" => Ok(Operation::Recover(RecoverOperation::parse(map, request)?)),
            "revoke" => Ok(Operation::Revoke(RevokeOperation::parse(map, request)?)),
            other => Err(CoreError::MissingOrUnknownProperty(format!(
                "type: {other}"
            ))),
        }
    }

    /// The kind of this operation.
    pub fn operation_type(&self) -> OperationType {
        match self {
            Operation::Create(_) => OperationType::Create,
            Operation::Update(_) => OperationType::Update,
            Operation::Recover(_) => OperationType::Recover,
            Operation::Revoke(_) => OperationType::Revoke,
        }
    }

    /// The DID unique suffix the operation addresses. Derived for
    /// Create, supplied for the rest.
    pub fn did_unique_suffix(&self) -> &str {
        match self {
            Operation::Create(op) => &op.did_unique_suffix,
            Operation::Update(op) => &op.did_unique_suffix,
            Operation::Recover(op) => &op.did_unique_suffix,
            Operation::Revoke(op) => &op.did_unique_suffix,
        }
    }
}

/// Reject requests whose top-level property count differs from the
/// schema of the declared type.
fn check_property_count(
    map: &Map<String, Value>,
    expected: usize,
    operation_type: &str,
) -> Result<()> {
    if map.len() != expected {
        return Err(CoreError::MissingOrUnknownProperty(format!(
            "{operation_type} operation must have exactly {expected} properties, got {}",
            map.len()
        )));
    }
    Ok(())
}

/// Fetch a required string property.
fn require_str<'a>(map: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    map.get(name)
        .ok_or_else(|| CoreError::MissingOrUnknownProperty(name.to_string()))?
        .as_str()
        .ok_or_else(|| CoreError::TypeIncorrect(name.to_string()))
}

/// Enforce the maximum encoded OTP length.
fn check_otp_length(otp: &str) -> Result<()> {
    if otp.len() > MAX_OTP_LENGTH {
        return Err(CoreError::OtpTooLong(otp.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_unknown_type() {
        let request = br#"{"type":"merge","didUniqueSuffix":"abc"}"#;
        assert!(matches!(
            Operation::parse(request),
            Err(CoreError::MissingOrUnknownProperty(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(Operation::parse(b"[1,2,3]").is_err());
        assert!(Operation::parse(b"not json").is_err());
    }

    #[test]
    fn test_otp_length_boundary() {
        assert!(check_otp_length(&"a".repeat(MAX_OTP_LENGTH)).is_ok());
        assert!(matches!(
            check_otp_length(&"a".repeat(MAX_OTP_LENGTH + 1)),
            Err(CoreError::OtpTooLong(51))
        ));
    }
}
