//! Flattened JWS parsing and ES256K verification.
//!
//! Operations carry their authorizations as flattened JWS objects
//! `{ protected, payload, signature }`. The protected header must name a
//! key id and the ES256K algorithm; signatures are secp256k1 ECDSA (DER)
//! over the SHA-256 of `protected || "." || payload`.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoder;
use crate::error::{CoreError, Result};

/// The only signature algorithm accepted on operation envelopes.
pub const JWS_ALGORITHM: &str = "ES256K";

/// A flattened JWS object as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jws {
    /// Base64url-encoded protected header.
    pub protected: String,
    /// Payload, as the signer presented it.
    pub payload: String,
    /// Base64url-encoded DER signature.
    pub signature: String,
}

/// Decoded protected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Identifier of the signing key.
    pub kid: String,
    /// Signature algorithm; always [`JWS_ALGORITHM`].
    pub alg: String,
}

impl Jws {
    /// Parse a JWS out of a JSON value, checking member presence and the
    /// protected header.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::TypeIncorrect("jws".to_string()))?;

        let member = |name: &'static str| -> Result<String> {
            map.get(name)
                .ok_or(CoreError::JwsMissingField(name))?
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| CoreError::TypeIncorrect(name.to_string()))
        };

        let jws = Self {
            protected: member("protected")?,
            payload: member("payload")?,
            signature: member("signature")?,
        };

        // Decoding the header validates kid presence and the algorithm.
        jws.header()?;
        Ok(jws)
    }

    /// Decode and validate the protected header.
    pub fn header(&self) -> Result<JwsHeader> {
        let bytes = encoder::decode(&self.protected)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::TypeIncorrect("protected".to_string()))?;

        let kid = map
            .get("kid")
            .ok_or(CoreError::JwsMissingField("kid"))?
            .as_str()
            .ok_or_else(|| CoreError::TypeIncorrect("kid".to_string()))?
            .to_owned();
        let alg = map
            .get("alg")
            .ok_or(CoreError::JwsMissingField("alg"))?
            .as_str()
            .ok_or_else(|| CoreError::TypeIncorrect("alg".to_string()))?
            .to_owned();

        if alg != JWS_ALGORITHM {
            return Err(CoreError::JwsUnsupportedAlgorithm(alg));
        }

        Ok(JwsHeader { kid, alg })
    }

    /// The signing input per RFC 7515: `protected || "." || payload`.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.protected, self.payload)
    }

    /// Verify the signature under a compressed SEC1 public key in hex.
    pub fn verify(&self, public_key_hex: &str) -> Result<()> {
        let key_bytes =
            hex::decode(public_key_hex).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let key = VerifyingKey::from_sec1_bytes(&key_bytes)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;

        let signature_bytes = encoder::decode(&self.signature)?;
        let signature =
            Signature::from_der(&signature_bytes).map_err(|_| CoreError::JwsSignatureInvalid)?;

        key.verify(self.signing_input().as_bytes(), &signature)
            .map_err(|_| CoreError::JwsSignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;
    use serde_json::json;

    fn test_key(seed: u8) -> (SigningKey, String) {
        let signing_key = SigningKey::from_slice(&[seed; 32]).unwrap();
        let public_key_hex = hex::encode(
            signing_key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes(),
        );
        (signing_key, public_key_hex)
    }

    fn signed_jws(signing_key: &SigningKey, kid: &str, payload: &str) -> Jws {
        let protected = encoder::encode(
            serde_json::to_vec(&json!({ "kid": kid, "alg": "ES256K" })).unwrap(),
        );
        let signing_input = format!("{}.{}", protected, payload);
        let signature: Signature = signing_key.sign(signing_input.as_bytes());
        Jws {
            protected,
            payload: payload.to_string(),
            signature: encoder::encode(signature.to_der().as_bytes()),
        }
    }

    #[test]
    fn test_from_value_requires_all_members() {
        let value = json!({ "protected": "x", "payload": "y" });
        assert!(matches!(
            Jws::from_value(&value),
            Err(CoreError::JwsMissingField("signature"))
        ));
    }

    #[test]
    fn test_header_requires_kid() {
        let protected = encoder::encode(br#"{"alg":"ES256K"}"#);
        let jws = Jws {
            protected,
            payload: "p".to_string(),
            signature: "s".to_string(),
        };
        assert!(matches!(
            jws.header(),
            Err(CoreError::JwsMissingField("kid"))
        ));
    }

    #[test]
    fn test_header_rejects_unsupported_algorithm() {
        let protected = encoder::encode(br##"{"kid":"#key1","alg":"EdDSA"}"##);
        let jws = Jws {
            protected,
            payload: "p".to_string(),
            signature: "s".to_string(),
        };
        assert!(matches!(
            jws.header(),
            Err(CoreError::JwsUnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_verify_valid_signature() {
        let (signing_key, public_key_hex) = test_key(7);
        let jws = signed_jws(&signing_key, "#key1", "payload-value");
        assert!(jws.verify(&public_key_hex).is_ok());
        assert_eq!(jws.header().unwrap().kid, "#key1");
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (signing_key, _) = test_key(7);
        let (_, other_public_key_hex) = test_key(8);
        let jws = signed_jws(&signing_key, "#key1", "payload-value");
        assert!(matches!(
            jws.verify(&other_public_key_hex),
            Err(CoreError::JwsSignatureInvalid)
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let (signing_key, public_key_hex) = test_key(7);
        let mut jws = signed_jws(&signing_key, "#key1", "payload-value");
        jws.payload = "tampered".to_string();
        assert!(matches!(
            jws.verify(&public_key_hex),
            Err(CoreError::JwsSignatureInvalid)
        ));
    }
}
