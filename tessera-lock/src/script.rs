//! Canonical value-time-lock redeem scripts.
//!
//! The canonical form is
//! `<lockUntilBlock> OP_CHECKLOCKTIMEVERIFY OP_DROP <pubKeyHash>
//! OP_CHECKSIG`, paid to as P2SH. Building and parsing are strict
//! inverses; anything that deviates from the form is rejected.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Instruction, Script, ScriptBuf};

use crate::error::{LockError, Result};

/// Parsed form of a value-time-lock redeem script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockScript {
    /// Block height before which the locked output cannot be spent.
    pub lock_until_block: u64,
    /// HASH160 of the public key allowed to spend after expiry.
    pub owner_pub_key_hash: [u8; 20],
}

/// Build the canonical redeem script.
pub fn build_redeem_script(lock_until_block: u64, owner_pub_key_hash: &[u8; 20]) -> ScriptBuf {
    Builder::new()
        .push_int(lock_until_block as i64)
        .push_opcode(opcodes::all::OP_CLTV)
        .push_opcode(opcodes::all::OP_DROP)
        .push_slice(*owner_pub_key_hash)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .into_script()
}

/// Parse and validate a hex redeem script into its canonical lock form.
pub fn parse_redeem_script_hex(redeem_script_as_hex: &str) -> Result<LockScript> {
    let bytes = hex::decode(redeem_script_as_hex)?;
    parse_redeem_script(&ScriptBuf::from_bytes(bytes))
}

/// Parse and validate a redeem script into its canonical lock form.
pub fn parse_redeem_script(script: &Script) -> Result<LockScript> {
    let malformed = |reason: &str| LockError::InvalidRedeemScript(reason.to_string());

    let instructions: Vec<Instruction<'_>> = script
        .instructions()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LockError::InvalidRedeemScript(e.to_string()))?;

    let [lock_time_push, cltv, drop, owner_push, checksig] = instructions.as_slice() else {
        return Err(malformed("expected exactly five instructions"));
    };

    let lock_until_block = match lock_time_push {
        Instruction::PushBytes(push) => {
            let value = decode_script_num(push.as_bytes())?;
            if value <= 0 {
                return Err(malformed("lock time must be positive"));
            }
            value as u64
        }
        _ => return Err(malformed("expected lock time push")),
    };

    if !matches!(cltv, Instruction::Op(op) if *op == opcodes::all::OP_CLTV) {
        return Err(malformed("expected OP_CHECKLOCKTIMEVERIFY"));
    }
    if !matches!(drop, Instruction::Op(op) if *op == opcodes::all::OP_DROP) {
        return Err(malformed("expected OP_DROP"));
    }

    let owner_pub_key_hash = match owner_push {
        Instruction::PushBytes(push) => {
            let bytes = push.as_bytes();
            if bytes.len() != 20 {
                return Err(malformed("expected a 20-byte public key hash"));
            }
            let mut hash = [0u8; 20];
            hash.copy_from_slice(bytes);
            hash
        }
        _ => return Err(malformed("expected public key hash push")),
    };

    if !matches!(checksig, Instruction::Op(op) if *op == opcodes::all::OP_CHECKSIG) {
        return Err(malformed("expected OP_CHECKSIG"));
    }

    Ok(LockScript {
        lock_until_block,
        owner_pub_key_hash,
    })
}

/// Decode a minimally-encoded script number (little endian, sign bit in
/// the most significant byte).
fn decode_script_num(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 5 {
        return Err(LockError::InvalidRedeemScript(
            "script number too large".to_string(),
        ));
    }

    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }

    let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
    if value & sign_bit != 0 {
        value = -(value & !sign_bit);
    }
    Ok(value)
}
