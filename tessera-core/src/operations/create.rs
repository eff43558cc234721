//! Create operation parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::RecoveryPublicKey;
use crate::error::Result;
use crate::{encoder, multihash};

use super::{check_property_count, require_str, DocumentOperationData};

/// The data committed to by the DID unique suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuffixData {
    /// Key guarding Recover and Revoke.
    pub recovery_key: RecoveryPublicKey,
    /// Commitment to the OTP authorizing the next Recover or Revoke.
    pub next_recovery_otp_hash: String,
    /// Hash binding the operation data to the suffix.
    pub operation_data_hash: String,
}

/// A parsed Create operation.
#[derive(Debug, Clone)]
pub struct CreateOperation {
    /// Derived as the multihash of the encoded suffix data. Never
    /// supplied on the wire.
    pub did_unique_suffix: String,
    /// Suffix data exactly as encoded on the wire.
    pub encoded_suffix_data: String,
    /// Decoded suffix data.
    pub suffix_data: SuffixData,
    /// Operation data exactly as encoded on the wire.
    pub encoded_operation_data: String,
    /// Decoded operation data.
    pub operation_data: DocumentOperationData,
    /// The original request buffer, kept so any hash over the request
    /// stays reproducible byte-for-byte.
    pub original_request: Vec<u8>,
}

impl CreateOperation {
    pub(super) fn parse(map: &Map<String, Value>, request: &[u8]) -> Result<Self> {
        check_property_count(map, 3, "create")?;

        let encoded_suffix_data = require_str(map, "suffixData")?.to_owned();
        let encoded_operation_data = require_str(map, "operationData")?.to_owned();

        let suffix_data: SuffixData = encoder::decode_json(&encoded_suffix_data)?;
        let operation_data: DocumentOperationData = encoder::decode_json(&encoded_operation_data)?;

        // The suffix commits to the encoded form of the suffix data.
        let did_unique_suffix = multihash::hash_then_encode(encoded_suffix_data.as_bytes());

        Ok(Self {
            did_unique_suffix,
            encoded_suffix_data,
            suffix_data,
            encoded_operation_data,
            operation_data,
            original_request: request.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::Operation;
    use crate::{encoder, multihash};
    use serde_json::json;

    fn create_request() -> (Vec<u8>, String) {
        let operation_data = json!({
            "document": {
                "publicKey": [{
                    "id": "#key1",
                    "type": "Secp256k1VerificationKey2018",
                    "usage": "signing",
                    "publicKeyHex": "02aabb"
                }]
            },
            "nextUpdateOtpHash": multihash::hash_then_encode(b"update-otp"),
        });
        let encoded_operation_data =
            encoder::encode(serde_json::to_vec(&operation_data).unwrap());

        let suffix_data = json!({
            "recoveryKey": { "publicKeyHex": "03ccdd" },
            "nextRecoveryOtpHash": multihash::hash_then_encode(b"recovery-otp"),
            "operationDataHash": multihash::hash_then_encode(encoded_operation_data.as_bytes()),
        });
        let encoded_suffix_data = encoder::encode(serde_json::to_vec(&suffix_data).unwrap());
        let expected_suffix = multihash::hash_then_encode(encoded_suffix_data.as_bytes());

        let request = serde_json::to_vec(&json!({
            "type": "create",
            "suffixData": encoded_suffix_data,
            "operationData": encoded_operation_data,
        }))
        .unwrap();

        (request, expected_suffix)
    }

    #[test]
    fn test_parse_derives_suffix() {
        let (request, expected_suffix) = create_request();
        let Operation::Create(op) = Operation::parse(&request).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(op.did_unique_suffix, expected_suffix);
        assert_eq!(op.suffix_data.recovery_key.public_key_hex, "03ccdd");
        assert_eq!(op.operation_data.document.public_key.len(), 1);
        assert_eq!(op.original_request, request);
    }

    #[test]
    fn test_parse_rejects_extra_property() {
        let (request, _) = create_request();
        let mut value: serde_json::Value = serde_json::from_slice(&request).unwrap();
        value["didUniqueSuffix"] = json!("not-supplied-on-the-wire");
        let request = serde_json::to_vec(&value).unwrap();
        assert!(Operation::parse(&request).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_suffix_data() {
        let (request, _) = create_request();
        let mut value: serde_json::Value = serde_json::from_slice(&request).unwrap();
        value["suffixData"] = json!(crate::encoder::encode(b"{\"unexpected\":true}"));
        let request = serde_json::to_vec(&value).unwrap();
        assert!(Operation::parse(&request).is_err());
    }
}
