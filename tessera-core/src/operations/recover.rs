//! Recover operation parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::RecoveryPublicKey;
use crate::encoder;
use crate::error::{CoreError, Result};
use crate::jws::Jws;

use super::{check_otp_length, check_property_count, require_str, DocumentOperationData};

/// The claims signed by the current recovery key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecoverSignedData {
    /// Echo of the outer DID unique suffix; must match.
    pub did_unique_suffix: String,
    /// Replacement recovery key.
    pub new_recovery_key: RecoveryPublicKey,
    /// Commitment to the OTP authorizing the next Recover or Revoke.
    pub next_recovery_otp_hash: String,
    /// Hash binding the operation data to this signature.
    pub operation_data_hash: String,
}

/// A parsed Recover operation.
#[derive(Debug, Clone)]
pub struct RecoverOperation {
    /// The DID being recovered.
    pub did_unique_suffix: String,
    /// Preimage of the current recovery commitment.
    pub recovery_otp: String,
    /// Operation data exactly as encoded on the wire.
    pub encoded_operation_data: String,
    /// Decoded operation data: the full replacement document.
    pub operation_data: DocumentOperationData,
    /// JWS over [`RecoverSignedData`], verified against the current
    /// recovery key at apply time.
    pub signed_operation_data: Jws,
    /// Decoded JWS payload.
    pub signed_data: RecoverSignedData,
    /// The original request buffer.
    pub original_request: Vec<u8>,
}

impl RecoverOperation {
    pub(super) fn parse(map: &Map<String, Value>, request: &[u8]) -> Result<Self> {
        check_property_count(map, 5, "recover")?;

        let did_unique_suffix = require_str(map, "didUniqueSuffix")?.to_owned();
        let recovery_otp = require_str(map, "recoveryOtp")?.to_owned();
        check_otp_length(&recovery_otp)?;

        let encoded_operation_data = require_str(map, "operationData")?.to_owned();
        let operation_data: DocumentOperationData = encoder::decode_json(&encoded_operation_data)?;

        let signed_operation_data = Jws::from_value(
            map.get("signedOperationData")
                .ok_or_else(|| {
                    CoreError::MissingOrUnknownProperty("signedOperationData".to_string())
                })?,
        )?;
        let signed_data: RecoverSignedData =
            encoder::decode_json(&signed_operation_data.payload)?;

        if signed_data.did_unique_suffix != did_unique_suffix {
            return Err(CoreError::SignedDidUniqueSuffixMismatch);
        }

        Ok(Self {
            did_unique_suffix,
            recovery_otp,
            encoded_operation_data,
            operation_data,
            signed_operation_data,
            signed_data,
            original_request: request.to_vec(),
        })
    }
}
