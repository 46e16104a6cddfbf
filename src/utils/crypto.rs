//! Hash and Base58Check helpers shared by the chain builders

use crate::error::{HawalaError, HawalaResult};
use bitcoin::hashes::{hash160, sha256d, Hash};
use sha2::{Digest, Sha256, Sha512};
use sha3::Keccak256;

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

/// Keccak-256 (TRON addresses and ABI selectors)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First 32 bytes of SHA-512 (XRP signing and hashing)
pub fn sha512_half(data: &[u8]) -> [u8; 32] {
    let full = Sha512::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&full[..32]);
    out
}

/// Base58 alphabets in use across the supported ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base58Alphabet {
    Bitcoin,
    Ripple,
}

impl Base58Alphabet {
    fn alphabet(self) -> &'static bs58::Alphabet {
        match self {
            Base58Alphabet::Bitcoin => bs58::Alphabet::BITCOIN,
            Base58Alphabet::Ripple => bs58::Alphabet::RIPPLE,
        }
    }
}

/// Append a 4-byte double-SHA256 checksum and Base58 encode
pub fn base58check_encode(payload: &[u8], alphabet: Base58Alphabet) -> String {
    let checksum = double_sha256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).with_alphabet(alphabet.alphabet()).into_string()
}

/// Base58 decode and verify the trailing checksum, returning the payload
pub fn base58check_decode(encoded: &str, alphabet: Base58Alphabet) -> HawalaResult<Vec<u8>> {
    let decoded = bs58::decode(encoded)
        .with_alphabet(alphabet.alphabet())
        .into_vec()
        .map_err(|e| HawalaError::address_decode(format!("invalid base58: {}", e)))?;

    if decoded.len() < 5 {
        return Err(HawalaError::address_decode("base58check payload too short"));
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    let computed = double_sha256(payload);
    if checksum != &computed[..4] {
        return Err(HawalaError::address_decode("invalid base58check checksum"));
    }

    Ok(payload.to_vec())
}
