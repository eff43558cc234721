//! Self-describing sha2-256 content hashes.
//!
//! A multihash is `varint(algorithm) || varint(digest length) || digest`.
//! The core supports exactly one algorithm, sha2-256, whose code and
//! length both fit a single varint byte.

use sha2::{Digest, Sha256};

use crate::encoder;
use crate::error::{CoreError, Result};

/// Multihash code for sha2-256.
const SHA2_256_CODE: u8 = 0x12;

/// Digest length of sha2-256.
const SHA2_256_LENGTH: u8 = 32;

/// Compute the sha2-256 multihash of `data`.
pub fn compute(data: &[u8]) -> Vec<u8> {
    let digest = Sha256::digest(data);
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.push(SHA2_256_CODE);
    multihash.push(SHA2_256_LENGTH);
    multihash.extend_from_slice(&digest);
    multihash
}

/// Compute the multihash of `data` and base64url-encode it.
///
/// This is the hash form used everywhere on the wire: DID unique
/// suffixes, operation data hashes and OTP commitments.
pub fn hash_then_encode(data: &[u8]) -> String {
    encoder::encode(compute(data))
}

/// Decode an encoded multihash and validate its structure.
pub fn decode(encoded_multihash: &str) -> Result<Vec<u8>> {
    let bytes = encoder::decode(encoded_multihash)?;
    if bytes.len() != 2 + SHA2_256_LENGTH as usize {
        return Err(CoreError::InvalidHash(format!(
            "expected {} bytes, got {}",
            2 + SHA2_256_LENGTH as usize,
            bytes.len()
        )));
    }
    if bytes[0] != SHA2_256_CODE || bytes[1] != SHA2_256_LENGTH {
        return Err(CoreError::InvalidHash(
            "not a sha2-256 multihash".to_string(),
        ));
    }
    Ok(bytes)
}

/// Check `encoded_content` against a declared multihash.
///
/// The hash is recomputed over the UTF-8 bytes of the encoded form
/// itself: wire hashes commit to the encoded payload, not the decoded
/// plaintext. A malformed declared hash never matches.
pub fn is_valid_hash(encoded_content: &str, encoded_multihash: &str) -> bool {
    match decode(encoded_multihash) {
        Ok(expected) => compute(encoded_content.as_bytes()) == expected,
        Err(_) => false,
    }
}
