//! Base64url encoding without padding.
//!
//! Every encoded payload on the wire (suffix data, operation data, JWS
//! members, multihashes) uses this scheme.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::DeserializeOwned;

use crate::error::{CoreError, Result};

/// Encode bytes as base64url without padding.
pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode a base64url string without padding.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CoreError::InvalidEncoding(e.to_string()))
}

/// Decode a base64url string and parse the result as UTF-8 JSON.
pub fn decode_json<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = decode(encoded)?;
    Ok(serde_json::from_slice(&bytes)?)
}
