//! Shared types for the transaction core
//!
//! Data structures that cross module boundaries are defined here
//! for consistent serialization.

use crate::error::{HawalaError, HawalaResult};
use serde::{Deserialize, Serialize};

// =============================================================================
// Chain Types
// =============================================================================

/// Supported ledgers, used as the dispatch tag in [`crate::coin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    Litecoin,
    Tron,
    Xrp,
}

impl Chain {
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet => "BTC",
            Chain::Litecoin => "LTC",
            Chain::Tron => "TRX",
            Chain::Xrp => "XRP",
        }
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// One secp256k1 ECDSA signature as returned by a signing provider
///
/// `r` and `s` are 64-char lowercase hex strings; `rec_id` is the
/// public-key recovery id (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    pub r: String,
    pub s: String,
    #[serde(rename = "recId")]
    pub rec_id: u8,
}

impl SignatureResult {
    /// Split a 64-byte compact signature into `r` and `s`
    pub fn from_compact(compact: &[u8; 64], rec_id: u8) -> Self {
        Self {
            r: hex::encode(&compact[..32]),
            s: hex::encode(&compact[32..]),
            rec_id,
        }
    }

    /// Check that both halves are exactly 32 bytes of hex and the
    /// recovery id is 0 or 1
    pub fn validate(&self) -> HawalaResult<()> {
        if self.rec_id > 1 {
            return Err(HawalaError::signing_failed(format!(
                "recovery id must be 0 or 1, got {}",
                self.rec_id
            )));
        }
        self.compact_bytes().map(|_| ())
    }

    /// Reassemble the 64-byte `r || s` form
    pub fn compact_bytes(&self) -> HawalaResult<[u8; 64]> {
        let r = decode_half("r", &self.r)?;
        let s = decode_half("s", &self.s)?;
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&r);
        out[32..].copy_from_slice(&s);
        Ok(out)
    }

    /// `r || s` as hex (XRP message signatures)
    pub fn to_rs_hex(&self) -> String {
        format!("{}{}", self.r, self.s)
    }

    /// `r || s || recId` as hex, recovery id as one byte (TRON)
    pub fn to_rsv_hex(&self) -> String {
        format!("{}{}{:02x}", self.r, self.s, self.rec_id)
    }

    /// 65-byte `r || s || recId`
    pub fn to_rsv_bytes(&self) -> HawalaResult<[u8; 65]> {
        let compact = self.compact_bytes()?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = self.rec_id;
        Ok(out)
    }

    /// Strict DER encoding of `(r, s)` with `s` in the lower half
    pub fn to_der(&self) -> HawalaResult<Vec<u8>> {
        let compact = self.compact_bytes()?;
        let mut sig = secp256k1::ecdsa::Signature::from_compact(&compact)?;
        sig.normalize_s();
        Ok(sig.serialize_der().to_vec())
    }
}

fn decode_half(name: &str, value: &str) -> HawalaResult<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|e| HawalaError::signing_failed(format!("signature {} is not hex: {}", name, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        HawalaError::signing_failed(format!("signature {} must be 32 bytes, got {}", name, b.len()))
    })
}

// =============================================================================
// Signed Artifacts
// =============================================================================

/// A finalized transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub chain: Chain,
    /// Wire bytes as hex (XRP: uppercase canonical blob)
    pub raw_tx: String,
    /// Canonical transaction id as hex
    pub txid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsv_hex_pads_recovery_id() {
        let sig = SignatureResult {
            r: "11".repeat(32),
            s: "22".repeat(32),
            rec_id: 1,
        };
        let rsv = sig.to_rsv_hex();
        assert_eq!(rsv.len(), 130);
        assert!(rsv.ends_with("01"));
        assert_eq!(sig.to_rs_hex().len(), 128);
    }

    #[test]
    fn test_short_half_rejected() {
        let sig = SignatureResult {
            r: "11".repeat(31),
            s: "22".repeat(32),
            rec_id: 0,
        };
        assert!(sig.validate().is_err());
    }

    #[test]
    fn test_recovery_id_above_one_rejected() {
        let mut sig = SignatureResult {
            r: "11".repeat(32),
            s: "22".repeat(32),
            rec_id: 1,
        };
        assert!(sig.validate().is_ok());
        sig.rec_id = 27;
        let err = sig.validate().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::SigningFailed);
    }

    #[test]
    fn test_der_roundtrip_through_secp() {
        let sig = SignatureResult {
            r: "11".repeat(32),
            s: "22".repeat(32),
            rec_id: 0,
        };
        let der = sig.to_der().unwrap();
        assert_eq!(der[0], 0x30);
        let parsed = secp256k1::ecdsa::Signature::from_der(&der).unwrap();
        assert_eq!(parsed.serialize_compact(), sig.compact_bytes().unwrap());
    }

    #[test]
    fn test_der_normalizes_high_s() {
        // n - 1 is in the upper half of the curve order
        let high = SignatureResult {
            r: "11".repeat(32),
            s: "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140".to_string(),
            rec_id: 0,
        };
        let der = high.to_der().unwrap();
        let parsed = secp256k1::ecdsa::Signature::from_der(&der).unwrap();
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(&parsed.serialize_compact()[32..], &one[..]);
    }

    #[test]
    fn test_chain_serde_names() {
        assert_eq!(serde_json::to_string(&Chain::BitcoinTestnet).unwrap(), "\"bitcoin-testnet\"");
        assert_eq!(Chain::BitcoinTestnet.symbol(), "BTC");
    }
}
