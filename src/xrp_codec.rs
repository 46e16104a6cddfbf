//! XRP Ledger canonical binary format
//!
//! Encodes a transaction JSON object into the ledger's deterministic
//! byte form. Fields are sorted by `(type code, field code)`; variable
//! length values carry a 1-3 byte length prefix. Only the field set
//! needed for payments and their common fields is known; any other
//! field is refused rather than silently dropped.

use crate::error::HawalaError;
use crate::utils::{base58check_decode, base58check_encode, sha512_half, Base58Alphabet};
use serde_json::{Map, Value};
use thiserror::Error;

/// `STX\0`, prefixed to the pre-image of a single signature
pub const HASH_PREFIX_TX_SIGN: [u8; 4] = [0x53, 0x54, 0x58, 0x00];
/// `TXN\0`, prefixed to a signed blob to obtain its id
pub const HASH_PREFIX_TX_ID: [u8; 4] = [0x54, 0x58, 0x4E, 0x00];

const OBJECT_END_MARKER: u8 = 0xE1;
const ARRAY_END_MARKER: u8 = 0xF1;

const MAX_DROPS: u64 = 100_000_000_000_000_000;
const MIN_MANTISSA: u64 = 1_000_000_000_000_000;
const MAX_MANTISSA: u64 = 9_999_999_999_999_999;
const MIN_EXPONENT: i64 = -96;
const MAX_EXPONENT: i64 = 80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown field {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("invalid account {0}")]
    InvalidAccount(String),
    #[error("unknown transaction type {0}")]
    UnknownTransactionType(String),
    #[error("length {0} exceeds the variable-length limit")]
    LengthTooLarge(usize),
}

impl From<CodecError> for HawalaError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidAccount(_) => HawalaError::address_decode(e.to_string()),
            other => HawalaError::encoding_error(other.to_string()),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// Field Definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    UInt16,
    UInt32,
    Hash256,
    Amount,
    Blob,
    AccountId,
    Object,
    Array,
}

impl FieldKind {
    fn type_code(self) -> u8 {
        match self {
            FieldKind::UInt16 => 1,
            FieldKind::UInt32 => 2,
            FieldKind::Hash256 => 5,
            FieldKind::Amount => 6,
            FieldKind::Blob => 7,
            FieldKind::AccountId => 8,
            FieldKind::Object => 14,
            FieldKind::Array => 15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldDef {
    name: &'static str,
    kind: FieldKind,
    nth: u8,
}

impl FieldDef {
    fn sort_key(&self) -> (u8, u8) {
        (self.kind.type_code(), self.nth)
    }

    fn is_signing_field(&self) -> bool {
        self.name != "TxnSignature"
    }
}

const fn field(name: &'static str, kind: FieldKind, nth: u8) -> FieldDef {
    FieldDef { name, kind, nth }
}

const FIELDS: &[FieldDef] = &[
    field("TransactionType", FieldKind::UInt16, 2),
    field("NetworkID", FieldKind::UInt32, 1),
    field("Flags", FieldKind::UInt32, 2),
    field("SourceTag", FieldKind::UInt32, 3),
    field("Sequence", FieldKind::UInt32, 4),
    field("DestinationTag", FieldKind::UInt32, 14),
    field("LastLedgerSequence", FieldKind::UInt32, 27),
    field("TicketSequence", FieldKind::UInt32, 41),
    field("InvoiceID", FieldKind::Hash256, 17),
    field("Amount", FieldKind::Amount, 1),
    field("Fee", FieldKind::Amount, 8),
    field("SendMax", FieldKind::Amount, 9),
    field("DeliverMin", FieldKind::Amount, 10),
    field("SigningPubKey", FieldKind::Blob, 3),
    field("TxnSignature", FieldKind::Blob, 4),
    field("MemoType", FieldKind::Blob, 12),
    field("MemoData", FieldKind::Blob, 13),
    field("MemoFormat", FieldKind::Blob, 14),
    field("Account", FieldKind::AccountId, 1),
    field("Destination", FieldKind::AccountId, 3),
    field("Memo", FieldKind::Object, 10),
    field("Memos", FieldKind::Array, 9),
];

fn lookup(name: &str) -> Result<&'static FieldDef, CodecError> {
    FIELDS
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| CodecError::UnknownField(name.to_string()))
}

const TRANSACTION_TYPES: &[(&str, u16)] = &[
    ("Payment", 0),
    ("EscrowCreate", 1),
    ("EscrowFinish", 2),
    ("AccountSet", 3),
    ("EscrowCancel", 4),
    ("SetRegularKey", 5),
    ("OfferCreate", 7),
    ("OfferCancel", 8),
    ("TicketCreate", 10),
    ("SignerListSet", 12),
    ("PaymentChannelCreate", 13),
    ("TrustSet", 20),
    ("AccountDelete", 21),
];

pub fn transaction_type_code(name: &str) -> Result<u16, CodecError> {
    TRANSACTION_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
        .ok_or_else(|| CodecError::UnknownTransactionType(name.to_string()))
}

// =============================================================================
// Primitive Encoders
// =============================================================================

/// Field id: one to three bytes depending on the size of both codes
fn field_header(type_code: u8, nth: u8) -> Vec<u8> {
    match (type_code < 16, nth < 16) {
        (true, true) => vec![(type_code << 4) | nth],
        (true, false) => vec![type_code << 4, nth],
        (false, true) => vec![nth, type_code],
        (false, false) => vec![0, type_code, nth],
    }
}

/// Length prefix of a variable-length field
pub fn encode_vl_length(len: usize) -> Result<Vec<u8>, CodecError> {
    if len <= 192 {
        Ok(vec![len as u8])
    } else if len <= 12_480 {
        let rest = len - 193;
        Ok(vec![193 + (rest >> 8) as u8, (rest & 0xff) as u8])
    } else if len <= 918_744 {
        let rest = len - 12_481;
        Ok(vec![241 + (rest >> 16) as u8, ((rest >> 8) & 0xff) as u8, (rest & 0xff) as u8])
    } else {
        Err(CodecError::LengthTooLarge(len))
    }
}

fn write_vl(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CodecError> {
    out.extend(encode_vl_length(bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Classic `r...` address to its 20-byte account id
pub fn decode_account_id(address: &str) -> Result<[u8; 20], CodecError> {
    let payload = base58check_decode(address, Base58Alphabet::Ripple)
        .map_err(|_| CodecError::InvalidAccount(address.to_string()))?;
    match payload.split_first() {
        Some((0x00, id)) if id.len() == 20 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(id);
            Ok(out)
        }
        _ => Err(CodecError::InvalidAccount(address.to_string())),
    }
}

pub fn encode_account_id(account_id: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(0x00);
    payload.extend_from_slice(account_id);
    base58check_encode(&payload, Base58Alphabet::Ripple)
}

fn as_u64(name: &str, value: &Value) -> Result<u64, CodecError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(name, "expected an unsigned integer")),
        Value::String(s) => s.parse().map_err(|_| invalid(name, "expected an unsigned integer")),
        _ => Err(invalid(name, "expected an unsigned integer")),
    }
}

fn as_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, CodecError> {
    value.as_str().ok_or_else(|| invalid(name, "expected a string"))
}

fn decode_hex(name: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
    hex::decode(as_str(name, value)?).map_err(|e| invalid(name, e.to_string()))
}

fn encode_drops(name: &str, value: &Value) -> Result<[u8; 8], CodecError> {
    let drops = as_u64(name, value)?;
    if drops > MAX_DROPS {
        return Err(invalid(name, "exceeds the maximum XRP amount"));
    }
    Ok((drops | 0x4000_0000_0000_0000).to_be_bytes())
}

/// Split a decimal string into (negative, digits, exponent)
///
/// The exponent is widened to `i64`: an `i32` exponent adjusted by the
/// digit count cannot overflow it.
fn parse_decimal(name: &str, value: &str) -> Result<(bool, String, i64), CodecError> {
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (number, exponent) = match unsigned.split_once(|c: char| c == 'e' || c == 'E') {
        Some((n, e)) => (n, e.parse::<i32>().map_err(|_| invalid(name, "bad exponent"))?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid(name, "empty amount"));
    }
    let digits = format!("{}{}", int_part, frac_part);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(name, format!("not a decimal: {:?}", value)));
    }
    let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid(name, "exponent out of range"))?;
    Ok((negative, digits, i64::from(exponent) - frac_len))
}

/// Issued-currency value: sign bit, biased exponent, 54-bit mantissa
fn encode_issued_value(name: &str, value: &str) -> Result<[u8; 8], CodecError> {
    let (negative, digits, mut exponent) = parse_decimal(name, value)?;

    let mut significant = digits.trim_start_matches('0').to_string();
    if significant.is_empty() {
        return Ok(0x8000_0000_0000_0000u64.to_be_bytes());
    }
    while significant.ends_with('0') {
        significant.pop();
        exponent += 1;
    }
    if significant.len() > 16 {
        return Err(invalid(name, "more than 16 significant digits"));
    }

    let mut mantissa: u64 = significant.parse().map_err(|_| invalid(name, "bad mantissa"))?;
    while mantissa < MIN_MANTISSA {
        mantissa *= 10;
        exponent -= 1;
    }
    debug_assert!(mantissa <= MAX_MANTISSA);
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
        return Err(invalid(name, "exponent out of range"));
    }

    let mut bits = 0x8000_0000_0000_0000u64 | mantissa | (((exponent + 97) as u64) << 54);
    if !negative {
        bits |= 0x4000_0000_0000_0000;
    }
    Ok(bits.to_be_bytes())
}

fn encode_currency(name: &str, code: &str) -> Result<[u8; 20], CodecError> {
    let mut out = [0u8; 20];
    match code.len() {
        3 if code != "XRP" && code.bytes().all(|b| b.is_ascii_graphic()) => {
            out[12..15].copy_from_slice(code.as_bytes());
            Ok(out)
        }
        40 => {
            let bytes = hex::decode(code).map_err(|e| invalid(name, e.to_string()))?;
            out.copy_from_slice(&bytes);
            Ok(out)
        }
        _ => Err(invalid(name, format!("bad currency code {:?}", code))),
    }
}

fn encode_amount(name: &str, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Object(issued) => {
            let field = |key: &str| {
                issued
                    .get(key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(name, format!("missing {}", key)))
            };
            out.extend(encode_issued_value(name, field("value")?)?);
            out.extend(encode_currency(name, field("currency")?)?);
            out.extend(decode_account_id(field("issuer")?)?);
            Ok(())
        }
        _ => {
            out.extend(encode_drops(name, value)?);
            Ok(())
        }
    }
}

fn encode_value(def: &FieldDef, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match def.kind {
        FieldKind::UInt16 => {
            let code = match value {
                Value::String(name) if def.name == "TransactionType" => transaction_type_code(name)?,
                _ => u16::try_from(as_u64(def.name, value)?).map_err(|_| invalid(def.name, "exceeds 16 bits"))?,
            };
            out.extend(code.to_be_bytes());
        }
        FieldKind::UInt32 => {
            let n = u32::try_from(as_u64(def.name, value)?).map_err(|_| invalid(def.name, "exceeds 32 bits"))?;
            out.extend(n.to_be_bytes());
        }
        FieldKind::Hash256 => {
            let bytes = decode_hex(def.name, value)?;
            if bytes.len() != 32 {
                return Err(invalid(def.name, "expected 32 bytes"));
            }
            out.extend(bytes);
        }
        FieldKind::Amount => encode_amount(def.name, value, out)?,
        FieldKind::Blob => write_vl(out, &decode_hex(def.name, value)?)?,
        FieldKind::AccountId => write_vl(out, &decode_account_id(as_str(def.name, value)?)?)?,
        FieldKind::Object => {
            let object = value.as_object().ok_or_else(|| invalid(def.name, "expected an object"))?;
            encode_fields(object, false, out)?;
            out.push(OBJECT_END_MARKER);
        }
        FieldKind::Array => {
            let items = value.as_array().ok_or_else(|| invalid(def.name, "expected an array"))?;
            for item in items {
                let wrapper = item
                    .as_object()
                    .filter(|o| o.len() == 1)
                    .ok_or_else(|| invalid(def.name, "array items wrap exactly one object"))?;
                encode_fields(wrapper, false, out)?;
            }
            out.push(ARRAY_END_MARKER);
        }
    }
    Ok(())
}

fn encode_fields(object: &Map<String, Value>, signing_only: bool, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut fields = object
        .iter()
        .map(|(name, value)| lookup(name).map(|def| (def, value)))
        .collect::<Result<Vec<_>, _>>()?;
    if signing_only {
        fields.retain(|(def, _)| def.is_signing_field());
    }
    fields.sort_by_key(|(def, _)| def.sort_key());

    for (def, value) in fields {
        out.extend(field_header(def.kind.type_code(), def.nth));
        encode_value(def, value, out)?;
    }
    Ok(())
}

// =============================================================================
// Public API
// =============================================================================

/// Full canonical blob, signature included
pub fn encode(tx: &Map<String, Value>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_fields(tx, false, &mut out)?;
    Ok(out)
}

/// Single-signature pre-image: `STX\0` followed by every signing field
pub fn encode_for_signing(tx: &Map<String, Value>) -> Result<Vec<u8>, CodecError> {
    let mut out = HASH_PREFIX_TX_SIGN.to_vec();
    encode_fields(tx, true, &mut out)?;
    Ok(out)
}

pub fn signing_hash(tx: &Map<String, Value>) -> Result<[u8; 32], CodecError> {
    Ok(sha512_half(&encode_for_signing(tx)?))
}

/// Ledger transaction id of a signed blob
pub fn transaction_id(blob: &[u8]) -> [u8; 32] {
    let mut data = HASH_PREFIX_TX_ID.to_vec();
    data.extend_from_slice(blob);
    sha512_half(&data)
}
