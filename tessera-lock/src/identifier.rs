//! Serialized lock identifiers.
//!
//! A lock is named by the pair `(transactionId, redeemScriptAsHex)`,
//! carried as `base64url(JSON)` so it can travel inside anchor files and
//! config values as a single opaque string.

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Points at a value-time-lock: the funding transaction plus the redeem
/// script proving its form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockIdentifier {
    /// Funding transaction id.
    pub transaction_id: String,
    /// Redeem script of the locked output, in hex.
    pub redeem_script_as_hex: String,
}

impl LockIdentifier {
    /// Encode to the wire form.
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("identifier fields are plain strings");
        tessera_core::encoder::encode(json)
    }

    /// Decode from the wire form.
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = tessera_core::encoder::decode(encoded)
            .map_err(|e| LockError::InvalidIdentifier(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| LockError::InvalidIdentifier(e.to_string()))
    }
}
