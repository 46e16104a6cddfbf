//! Signing provider traits and the local private-key signer

use super::{parse_digest, SignerError};
use crate::types::SignatureResult;
use async_trait::async_trait;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroizing;

/// Blocking signer: `sign(digestHex) -> {r, s, recId}`
pub trait SignProvider {
    fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError>;
}

/// Blocking signer that also exposes its public key
///
/// UTXO builders use the key to decide which inputs a provider owns;
/// XRP embeds it as `SigningPubKey`.
pub trait KeyProvider: SignProvider {
    /// Compressed secp256k1 public key as hex
    fn public_key(&self) -> &str;
}

/// Suspending signer for providers that perform I/O
#[async_trait]
pub trait AsyncSignProvider: Send + Sync {
    async fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError>;
}

/// Suspending signer that also exposes its public key
pub trait AsyncKeyProvider: AsyncSignProvider {
    fn public_key(&self) -> &str;
}

/// Local secp256k1 signer over a raw private key
///
/// Produces deterministic (RFC 6979), low-S signatures with a recovery id.
pub struct PrivateKeySigner {
    secret: Zeroizing<[u8; 32]>,
    public_key_hex: String,
}

impl PrivateKeySigner {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignerError> {
        let secret = Zeroizing::new(bytes);
        let sk = SecretKey::from_slice(secret.as_ref())
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &sk);

        Ok(Self {
            secret,
            public_key_hex: hex::encode(public_key.serialize()),
        })
    }

    pub fn from_hex(private_key_hex: &str) -> Result<Self, SignerError> {
        let bytes = Zeroizing::new(
            hex::decode(private_key_hex)
                .map_err(|e| SignerError::InvalidPrivateKey(format!("not hex: {}", e)))?,
        );
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SignerError::InvalidPrivateKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(array)
    }

    /// Uncompressed public key (65 bytes, `04` prefix) as hex
    pub fn public_key_uncompressed(&self) -> Result<String, SignerError> {
        let sk = self.secret_key()?;
        let pk = PublicKey::from_secret_key(&Secp256k1::signing_only(), &sk);
        Ok(hex::encode(pk.serialize_uncompressed()))
    }

    fn secret_key(&self) -> Result<SecretKey, SignerError> {
        SecretKey::from_slice(self.secret.as_ref())
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))
    }

    fn sign_digest(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
        let digest = parse_digest(digest_hex)?;
        let sk = self.secret_key()?;

        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(digest);
        let (recovery_id, compact) = secp.sign_ecdsa_recoverable(&msg, &sk).serialize_compact();

        let rec_id = u8::try_from(recovery_id.to_i32())
            .map_err(|_| SignerError::Backend("recovery id out of range".to_string()))?;

        Ok(SignatureResult::from_compact(&compact, rec_id))
    }
}

impl std::fmt::Debug for PrivateKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeySigner")
            .field("public_key", &self.public_key_hex)
            .finish_non_exhaustive()
    }
}

impl SignProvider for PrivateKeySigner {
    fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
        self.sign_digest(digest_hex)
    }
}

impl KeyProvider for PrivateKeySigner {
    fn public_key(&self) -> &str {
        &self.public_key_hex
    }
}

#[async_trait]
impl AsyncSignProvider for PrivateKeySigner {
    async fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
        self.sign_digest(digest_hex)
    }
}

impl AsyncKeyProvider for PrivateKeySigner {
    fn public_key(&self) -> &str {
        &self.public_key_hex
    }
}

/// Verify a [`SignatureResult`] against a digest and public key
///
/// A recovery id outside `0..=1` fails verification.
pub fn verify_signature(
    digest: &[u8; 32],
    signature: &SignatureResult,
    public_key: &PublicKey,
) -> bool {
    if signature.validate().is_err() {
        return false;
    }
    let Ok(compact) = signature.compact_bytes() else {
        return false;
    };
    let Ok(mut sig) = secp256k1::ecdsa::Signature::from_compact(&compact) else {
        return false;
    };
    sig.normalize_s();
    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(*digest), &sig, public_key)
        .is_ok()
}

/// Check that `signature` and its recovery id recover `public_key`
///
/// Needed where the recovery id travels on the wire (TRON).
pub fn recovers_to(digest: &[u8; 32], signature: &SignatureResult, public_key: &PublicKey) -> bool {
    if signature.validate().is_err() {
        return false;
    }
    let Ok(compact) = signature.compact_bytes() else {
        return false;
    };
    let Ok(rec_id) = RecoveryId::from_i32(i32::from(signature.rec_id)) else {
        return false;
    };
    let Ok(sig) = RecoverableSignature::from_compact(&compact, rec_id) else {
        return false;
    };
    Secp256k1::verification_only()
        .recover_ecdsa(&Message::from_digest(*digest), &sig)
        .map_or(false, |recovered| recovered == *public_key)
}
