//! Textbook ECDSA signer
//!
//! Same capability as [`PrivateKeySigner`](super::PrivateKeySigner) but
//! computed by the pure-Rust `k256` implementation instead of
//! libsecp256k1. Both use RFC 6979 nonces and low-S normalization, so for
//! the same key and digest they must agree on `r` and `s` byte for byte.

use super::{parse_digest, SignProvider, SignerError};
use crate::types::SignatureResult;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use zeroize::Zeroizing;

pub struct TextbookSigner {
    signing_key: SigningKey,
}

impl TextbookSigner {
    pub fn from_hex(private_key_hex: &str) -> Result<Self, SignerError> {
        let bytes = Zeroizing::new(
            hex::decode(private_key_hex)
                .map_err(|e| SignerError::InvalidPrivateKey(format!("not hex: {}", e)))?,
        );
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { signing_key })
    }
}

impl SignProvider for TextbookSigner {
    fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
        let digest = parse_digest(digest_hex)?;

        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::Backend(e.to_string()))?;

        // Flip the recovery id when S had to be normalized
        let (signature, rec_id) = match signature.normalize_s() {
            Some(normalized) => (normalized, recovery_id.to_byte() ^ 1),
            None => (signature, recovery_id.to_byte()),
        };

        let mut compact = [0u8; 64];
        compact.copy_from_slice(&signature.to_bytes());
        Ok(SignatureResult::from_compact(&compact, rec_id))
    }
}
