//! Error types for the operation processing core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while decoding, parsing or authenticating operations.
///
/// All of these are client errors: the operation processor catches every
/// one of them and reports the offending operation as invalid without
/// touching state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required property is absent, or an unexpected one is present.
    #[error("missing or unknown property: {0}")]
    MissingOrUnknownProperty(String),

    /// A property exists but has the wrong JSON type.
    #[error("property has incorrect type: {0}")]
    TypeIncorrect(String),

    /// A one-time preimage exceeds the maximum encoded length.
    #[error("one-time preimage too long: {0} characters")]
    OtpTooLong(usize),

    /// The signed payload embeds a DID unique suffix different from the
    /// outer operation field.
    #[error("signed payload embeds a different DID unique suffix")]
    SignedDidUniqueSuffixMismatch,

    /// The signed payload embeds a recovery OTP different from the outer
    /// operation field.
    #[error("signed payload embeds a different recovery OTP")]
    SignedRecoveryOtpMismatch,

    /// A JWS is missing one of its required members.
    #[error("JWS missing required field: {0}")]
    JwsMissingField(&'static str),

    /// The JWS declares an algorithm other than ES256K.
    #[error("unsupported JWS algorithm: {0}")]
    JwsUnsupportedAlgorithm(String),

    /// The JWS signature did not verify under the given key.
    #[error("JWS signature verification failed")]
    JwsSignatureInvalid,

    /// A payload is not valid base64url.
    #[error("invalid base64url payload: {0}")]
    InvalidEncoding(String),

    /// An encoded multihash is structurally invalid or uses an
    /// unsupported algorithm.
    #[error("invalid multihash: {0}")]
    InvalidHash(String),

    /// A public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
