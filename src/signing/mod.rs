//! Signing Provider Contract
//!
//! Every builder obtains its signatures through the traits in
//! [`provider`]: a digest goes in as lowercase hex, a
//! [`SignatureResult`](crate::types::SignatureResult) comes out. Any key
//! source (local key, remote signer, hardware device) can sit behind
//! them.
//!
//! - [`SignProvider`] / [`KeyProvider`]: blocking variants
//! - [`AsyncSignProvider`] / [`AsyncKeyProvider`]: suspending variants for
//!   signers that perform I/O
//! - [`PrivateKeySigner`]: libsecp256k1-backed local signer, both variants
//! - [`TextbookSigner`]: RustCrypto `k256` signer, used to cross-check
//!   `r`/`s` against [`PrivateKeySigner`]
//!
//! Builders request signatures strictly one at a time, in input or
//! contract declaration order; they never issue parallel requests.

pub mod provider;
pub mod textbook;

pub use provider::*;
pub use textbook::*;

use crate::error::HawalaError;

/// Errors raised by signing providers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing backend failed: {0}")]
    Backend(String),
}

impl From<SignerError> for HawalaError {
    fn from(e: SignerError) -> Self {
        HawalaError::signing_failed(e.to_string())
    }
}

/// Parse a hex digest into exactly 32 bytes
pub fn parse_digest(digest_hex: &str) -> Result<[u8; 32], SignerError> {
    let bytes = hex::decode(digest_hex.trim_start_matches("0x"))
        .map_err(|e| SignerError::InvalidDigest(format!("not hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| SignerError::InvalidDigest(format!("expected 32 bytes, got {}", b.len())))
}
