//! Omni Layer simple-send payload
//!
//! Layout (20 bytes, big-endian): magic `6f6d6e69` ("omni"), version
//! `0000`, 6-byte property id, 8-byte amount. The payload rides in a
//! zero-value `OP_RETURN` output.

use crate::error::{HawalaError, HawalaResult};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{Script, ScriptBuf};
use serde::{Deserialize, Serialize};

pub const OMNI_MAGIC: [u8; 4] = *b"omni";
pub const OMNI_PAYLOAD_LEN: usize = 20;

/// Decoded simple-send marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmniPayload {
    pub version: u16,
    pub property_id: u32,
    pub amount: u64,
}

/// Raw 20-byte payload
pub fn omni_payload_bytes(amount: u64, property_id: u32) -> [u8; OMNI_PAYLOAD_LEN] {
    let mut out = [0u8; OMNI_PAYLOAD_LEN];
    out[..4].copy_from_slice(&OMNI_MAGIC);
    // out[4..6] version, out[6..8] upper property bytes: zero
    out[8..12].copy_from_slice(&property_id.to_be_bytes());
    out[12..].copy_from_slice(&amount.to_be_bytes());
    out
}

/// Payload as 40 hex chars
pub fn omni_payload_hex(amount: u64, property_id: u32) -> String {
    hex::encode(omni_payload_bytes(amount, property_id))
}

/// `OP_RETURN <payload>` output script
pub fn generate_omni_payload(amount: u64, property_id: u32) -> HawalaResult<ScriptBuf> {
    let push = PushBytesBuf::try_from(omni_payload_bytes(amount, property_id).to_vec())
        .map_err(|_| HawalaError::internal("omni payload exceeds push limit"))?;
    Ok(Builder::new().push_opcode(OP_RETURN).push_slice(push).into_script())
}

/// Parse a raw 20-byte payload
pub fn decode_omni_payload(payload: &[u8]) -> HawalaResult<OmniPayload> {
    if payload.len() != OMNI_PAYLOAD_LEN {
        return Err(HawalaError::invalid_input(format!(
            "omni payload must be {} bytes, got {}",
            OMNI_PAYLOAD_LEN,
            payload.len()
        )));
    }
    if payload[..4] != OMNI_MAGIC {
        return Err(HawalaError::invalid_input("missing omni magic"));
    }

    let version = u16::from_be_bytes([payload[4], payload[5]]);
    if payload[6..8] != [0, 0] {
        return Err(HawalaError::invalid_input("property id exceeds 32 bits"));
    }
    let property_id = u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]);
    let mut amount = [0u8; 8];
    amount.copy_from_slice(&payload[12..]);

    Ok(OmniPayload {
        version,
        property_id,
        amount: u64::from_be_bytes(amount),
    })
}

/// Extract and parse the payload of an `OP_RETURN` output script
pub fn decode_omni_script(script: &Script) -> HawalaResult<OmniPayload> {
    if !script.is_op_return() {
        return Err(HawalaError::invalid_input("not a data carrier output"));
    }
    let mut instructions = script.instructions().skip(1);
    match instructions.next() {
        Some(Ok(Instruction::PushBytes(data))) => decode_omni_payload(data.as_bytes()),
        _ => Err(HawalaError::invalid_input("data carrier output has no payload push")),
    }
}
