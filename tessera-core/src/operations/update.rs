//! Update operation parsing.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::document::Patch;
use crate::encoder;
use crate::error::{CoreError, Result};
use crate::jws::Jws;

use super::{check_otp_length, check_property_count, require_str};

/// Decoded Update operation data.
#[derive(Debug, Clone)]
pub struct UpdateOperationData {
    /// Document mutations, in application order.
    pub patches: Vec<Patch>,
    /// Commitment to the OTP authorizing the next Update.
    pub next_update_otp_hash: String,
}

impl UpdateOperationData {
    fn from_encoded(encoded: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct Wire {
            patches: Vec<Value>,
            next_update_otp_hash: String,
        }

        let wire: Wire = encoder::decode_json(encoded)?;
        let patches = wire
            .patches
            .iter()
            .map(Patch::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patches,
            next_update_otp_hash: wire.next_update_otp_hash,
        })
    }
}

/// A parsed Update operation.
#[derive(Debug, Clone)]
pub struct UpdateOperation {
    /// The DID being updated.
    pub did_unique_suffix: String,
    /// Preimage of the current update commitment.
    pub update_otp: String,
    /// Operation data exactly as encoded on the wire.
    pub encoded_operation_data: String,
    /// Decoded operation data.
    pub operation_data: UpdateOperationData,
    /// JWS over the operation data hash; its payload is the encoded
    /// multihash itself, compared at apply time.
    pub signed_operation_data_hash: Jws,
    /// The original request buffer.
    pub original_request: Vec<u8>,
}

impl UpdateOperation {
    pub(super) fn parse(map: &Map<String, Value>, request: &[u8]) -> Result<Self> {
        check_property_count(map, 5, "update")?;

        let did_unique_suffix = require_str(map, "didUniqueSuffix")?.to_owned();
        let update_otp = require_str(map, "updateOtp")?.to_owned();
        check_otp_length(&update_otp)?;

        let encoded_operation_data = require_str(map, "operationData")?.to_owned();
        let operation_data = UpdateOperationData::from_encoded(&encoded_operation_data)?;

        let signed_operation_data_hash = Jws::from_value(
            map.get("signedOperationDataHash")
                .ok_or_else(|| {
                    CoreError::MissingOrUnknownProperty("signedOperationDataHash".to_string())
                })?,
        )?;

        Ok(Self {
            did_unique_suffix,
            update_otp,
            encoded_operation_data,
            operation_data,
            signed_operation_data_hash,
            original_request: request.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::Operation;
    use crate::document::Patch;
    use crate::{encoder, multihash};
    use serde_json::json;

    fn update_request(update_otp: &str) -> serde_json::Value {
        let operation_data = json!({
            "patches": [
                { "action": "remove-public-keys", "publicKeys": ["#key2"] },
                { "action": "future-action", "anything": 42 },
            ],
            "nextUpdateOtpHash": multihash::hash_then_encode(b"next"),
        });
        let encoded_operation_data =
            encoder::encode(serde_json::to_vec(&operation_data).unwrap());
        let protected = encoder::encode(br##"{"kid":"#key1","alg":"ES256K"}"##);

        json!({
            "type": "update",
            "didUniqueSuffix": "EiAabc",
            "updateOtp": update_otp,
            "operationData": encoded_operation_data,
            "signedOperationDataHash": {
                "protected": protected,
                "payload": multihash::hash_then_encode(encoded_operation_data.as_bytes()),
                "signature": "ZmFrZQ",
            },
        })
    }

    #[test]
    fn test_parse_update() {
        let request = serde_json::to_vec(&update_request("b3Rw")).unwrap();
        let Operation::Update(op) = Operation::parse(&request).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(op.did_unique_suffix, "EiAabc");
        assert_eq!(op.update_otp, "b3Rw");
        assert_eq!(op.operation_data.patches.len(), 2);
        assert_eq!(op.operation_data.patches[1], Patch::Unknown);
    }

    #[test]
    fn test_parse_rejects_long_otp() {
        let request = serde_json::to_vec(&update_request(&"a".repeat(51))).unwrap();
        assert!(Operation::parse(&request).is_err());
    }

    #[test]
    fn test_parse_accepts_boundary_otp() {
        let request = serde_json::to_vec(&update_request(&"a".repeat(50))).unwrap();
        assert!(Operation::parse(&request).is_ok());
    }

    #[test]
    fn test_parse_rejects_wrong_property_count() {
        let mut value = update_request("b3Rw");
        value["extra"] = json!(true);
        let request = serde_json::to_vec(&value).unwrap();
        assert!(Operation::parse(&request).is_err());
    }
}
