//! Address encoding for the Bitcoin family
//!
//! The `bitcoin` crate only knows Bitcoin's own networks, so addresses are
//! decoded here against a [`NetworkParams`] table instead. That is what
//! lets the same builder serve Litecoin.

use crate::config::NetworkParams;
use crate::error::{HawalaError, HawalaResult};
use crate::utils::crypto::{base58check_decode, base58check_encode, hash160, Base58Alphabet};
use bech32::{FromBase32, ToBase32, Variant};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash};

/// A Base58Check address split into version byte and hash160
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyAddress {
    pub version: u8,
    pub hash: [u8; 20],
}

impl LegacyAddress {
    pub fn decode(address: &str) -> HawalaResult<Self> {
        let payload = base58check_decode(address, Base58Alphabet::Bitcoin)?;
        if payload.len() != 21 {
            return Err(HawalaError::address_decode(format!(
                "legacy address payload must be 21 bytes, got {}",
                payload.len()
            )));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self {
            version: payload[0],
            hash,
        })
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version);
        payload.extend_from_slice(&self.hash);
        base58check_encode(&payload, Base58Alphabet::Bitcoin)
    }

    /// Same hash under a different version byte
    pub fn with_version(&self, version: u8) -> Self {
        Self {
            version,
            hash: self.hash,
        }
    }
}

/// Decode a native segwit address, returning `(witness_version, program)`
pub fn decode_segwit(address: &str, hrp: &str) -> HawalaResult<(u8, Vec<u8>)> {
    let (decoded_hrp, data, variant) =
        bech32::decode(address).map_err(|e| HawalaError::address_decode(format!("invalid bech32: {}", e)))?;

    if decoded_hrp != hrp {
        return Err(HawalaError::address_decode(format!(
            "unexpected human-readable part '{}', expected '{}'",
            decoded_hrp, hrp
        )));
    }

    let (version, program) = data
        .split_first()
        .ok_or_else(|| HawalaError::address_decode("empty bech32 data"))?;
    let version = version.to_u8();
    let program = Vec::<u8>::from_base32(program)
        .map_err(|e| HawalaError::address_decode(format!("invalid witness program: {}", e)))?;

    let expected_variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    if variant != expected_variant {
        return Err(HawalaError::address_decode("wrong bech32 checksum variant for witness version"));
    }

    match (version, program.len()) {
        (0, 20) | (0, 32) => {}
        (0, n) => {
            return Err(HawalaError::address_decode(format!(
                "version 0 witness program must be 20 or 32 bytes, got {}",
                n
            )))
        }
        (1..=16, 2..=40) => {}
        (v, n) => {
            return Err(HawalaError::address_decode(format!(
                "unsupported witness version {} with program length {}",
                v, n
            )))
        }
    }

    Ok((version, program))
}

/// Encode a native segwit address
pub fn encode_segwit(version: u8, program: &[u8], hrp: &str) -> HawalaResult<String> {
    let version_u5 = bech32::u5::try_from_u8(version)
        .map_err(|e| HawalaError::invalid_input(format!("invalid witness version: {}", e)))?;
    let mut data = vec![version_u5];
    data.extend(program.to_base32());

    let variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    bech32::encode(hrp, data, variant).map_err(|e| HawalaError::encoding_error(format!("bech32 encode failed: {}", e)))
}

fn is_segwit_candidate(address: &str, hrp: &str) -> bool {
    address.to_lowercase().starts_with(&format!("{}1", hrp))
}

/// Decode an address of `params` into its scriptPubKey
pub fn address_to_script(address: &str, params: &NetworkParams) -> HawalaResult<ScriptBuf> {
    if is_segwit_candidate(address, &params.bech32_hrp) {
        let (version, program) = decode_segwit(address, &params.bech32_hrp)?;
        let program = PushBytesBuf::try_from(program)
            .map_err(|_| HawalaError::address_decode("witness program too long"))?;
        return Ok(Builder::new()
            .push_int(i64::from(version))
            .push_slice(program)
            .into_script());
    }

    let legacy = LegacyAddress::decode(address)?;
    if legacy.version == params.pub_key_hash {
        Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(legacy.hash)))
    } else if legacy.version == params.script_hash {
        Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(legacy.hash)))
    } else {
        Err(HawalaError::address_decode(format!(
            "address version 0x{:02x} does not belong to {}",
            legacy.version, params.name
        )))
    }
}

/// Validate a compressed secp256k1 public key, returning its bytes
pub fn parse_compressed_pubkey(public_key_hex: &str) -> HawalaResult<[u8; 33]> {
    let bytes = hex::decode(public_key_hex)?;
    let key = secp256k1::PublicKey::from_slice(&bytes)
        .map_err(|e| HawalaError::invalid_input(format!("invalid public key: {}", e)))?;
    if bytes.len() != 33 {
        return Err(HawalaError::invalid_input("public key must be compressed (33 bytes)"));
    }
    Ok(key.serialize())
}

/// P2PKH address of a public key
pub fn p2pkh_address(public_key_hex: &str, params: &NetworkParams) -> HawalaResult<String> {
    let pubkey = parse_compressed_pubkey(public_key_hex)?;
    Ok(LegacyAddress {
        version: params.pub_key_hash,
        hash: hash160(&pubkey),
    }
    .encode())
}

/// Native segwit v0 (P2WPKH) address of a public key
pub fn p2wpkh_address(public_key_hex: &str, params: &NetworkParams) -> HawalaResult<String> {
    let pubkey = parse_compressed_pubkey(public_key_hex)?;
    encode_segwit(0, &hash160(&pubkey), &params.bech32_hrp)
}

/// Wrapped segwit (P2SH-P2WPKH) address of a public key
pub fn p2sh_p2wpkh_address(public_key_hex: &str, params: &NetworkParams) -> HawalaResult<String> {
    let redeem = crate::bitcoin_script::p2wpkh_script(public_key_hex)?;
    Ok(LegacyAddress {
        version: params.script_hash,
        hash: hash160(redeem.as_bytes()),
    }
    .encode())
}

/// True when `address` decodes to a script on `params`
pub fn is_address_valid(address: &str, params: &NetworkParams) -> bool {
    address_to_script(address, params).is_ok()
}
