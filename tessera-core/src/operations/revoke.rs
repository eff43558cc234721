//! Revoke operation parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::encoder;
use crate::error::{CoreError, Result};
use crate::jws::Jws;

use super::{check_otp_length, check_property_count, require_str};

/// The claims signed by the current recovery key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RevokeSignedData {
    /// Echo of the outer DID unique suffix; must match.
    pub did_unique_suffix: String,
    /// Echo of the outer recovery OTP; must match.
    pub recovery_otp: String,
}

/// A parsed Revoke operation.
#[derive(Debug, Clone)]
pub struct RevokeOperation {
    /// The DID being revoked.
    pub did_unique_suffix: String,
    /// Preimage of the current recovery commitment.
    pub recovery_otp: String,
    /// JWS over [`RevokeSignedData`], verified against the current
    /// recovery key at apply time.
    pub signed_operation_data: Jws,
    /// Decoded JWS payload.
    pub signed_data: RevokeSignedData,
    /// The original request buffer.
    pub original_request: Vec<u8>,
}

impl RevokeOperation {
    pub(super) fn parse(map: &Map<String, Value>, request: &[u8]) -> Result<Self> {
        check_property_count(map, 4, "revoke")?;

        let did_unique_suffix = require_str(map, "didUniqueSuffix")?.to_owned();
        let recovery_otp = require_str(map, "recoveryOtp")?.to_owned();
        check_otp_length(&recovery_otp)?;

        let signed_operation_data = Jws::from_value(
            map.get("signedOperationData")
                .ok_or_else(|| {
                    CoreError::MissingOrUnknownProperty("signedOperationData".to_string())
                })?,
        )?;
        let signed_data: RevokeSignedData = encoder::decode_json(&signed_operation_data.payload)?;

        if signed_data.did_unique_suffix != did_unique_suffix {
            return Err(CoreError::SignedDidUniqueSuffixMismatch);
        }
        if signed_data.recovery_otp != recovery_otp {
            return Err(CoreError::SignedRecoveryOtpMismatch);
        }

        Ok(Self {
            did_unique_suffix,
            recovery_otp,
            signed_operation_data,
            signed_data,
            original_request: request.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::Operation;
    use crate::encoder;
    use crate::error::CoreError;
    use serde_json::json;

    fn revoke_request(signed_suffix: &str, signed_otp: &str) -> serde_json::Value {
        let signed_payload = json!({
            "didUniqueSuffix": signed_suffix,
            "recoveryOtp": signed_otp,
        });
        let protected = encoder::encode(br##"{"kid":"#recovery","alg":"ES256K"}"##);

        json!({
            "type": "revoke",
            "didUniqueSuffix": "EiAabc",
            "recoveryOtp": "b3Rw",
            "signedOperationData": {
                "protected": protected,
                "payload": encoder::encode(serde_json::to_vec(&signed_payload).unwrap()),
                "signature": "ZmFrZQ",
            },
        })
    }

    #[test]
    fn test_parse_revoke() {
        let request = serde_json::to_vec(&revoke_request("EiAabc", "b3Rw")).unwrap();
        let Operation::Revoke(op) = Operation::parse(&request).unwrap() else {
            panic!("expected revoke");
        };
        assert_eq!(op.recovery_otp, "b3Rw");
    }

    #[test]
    fn test_property_count_boundaries() {
        // Exactly 4 accepted.
        let value = revoke_request("EiAabc", "b3Rw");
        assert!(Operation::parse(&serde_json::to_vec(&value).unwrap()).is_ok());

        // 5 rejected.
        let mut five = value.clone();
        five["extra"] = json!(1);
        assert!(Operation::parse(&serde_json::to_vec(&five).unwrap()).is_err());

        // 3 rejected.
        let mut three = value;
        three.as_object_mut().unwrap().remove("recoveryOtp");
        assert!(Operation::parse(&serde_json::to_vec(&three).unwrap()).is_err());
    }

    #[test]
    fn test_parse_rejects_signed_suffix_mismatch() {
        let request = serde_json::to_vec(&revoke_request("EiAother", "b3Rw")).unwrap();
        assert!(matches!(
            Operation::parse(&request),
            Err(CoreError::SignedDidUniqueSuffixMismatch)
        ));
    }

    #[test]
    fn test_parse_rejects_signed_otp_mismatch() {
        let request = serde_json::to_vec(&revoke_request("EiAabc", "other")).unwrap();
        assert!(matches!(
            Operation::parse(&request),
            Err(CoreError::SignedRecoveryOtpMismatch)
        ));
    }
}
