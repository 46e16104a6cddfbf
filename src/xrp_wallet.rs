//! XRP Ledger Transaction Builder
//!
//! Payments are assembled as canonical field maps, hashed with
//! SHA-512Half over the `STX\0` pre-image, signed once, and reassembled
//! with a DER `TxnSignature`.

use crate::error::{HawalaError, HawalaResult};
use crate::signing::{verify_signature, AsyncKeyProvider, AsyncSignProvider, KeyProvider, SignProvider, SignerError};
use crate::types::{Chain, SignatureResult, SignedTransaction};
use crate::utils::{double_sha256, hash160};
use crate::xrp_codec::{self, decode_account_id, encode_account_id};
use crate::{log_debug, log_info, log_warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const MODULE: &str = "xrp_wallet";

/// `tfFullyCanonicalSig`
pub const CANONICAL_SIGNATURE_FLAG: u32 = 0x8000_0000;
pub const MAX_DESTINATION_TAG: i64 = 0xFFFF_FFFF;

const MESSAGE_MAGIC: &[u8] = b"\x16Ripple Signed Message:\n";

/// Payment intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrpTxData {
    pub to: String,
    /// Drops
    pub amount: u64,
    /// Drops
    pub fee: u64,
    /// Sending account
    pub change_address: String,
    pub sequence: u32,
    #[serde(default)]
    pub tag: Option<i64>,
}

/// A field map ready to be signed, with its signing digest
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedXrpTx {
    pub tx_json: Map<String, Value>,
    pub digest: [u8; 32],
}

impl UnsignedXrpTx {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Check a destination tag against the 32-bit range
pub fn validate_tag(tag: i64) -> HawalaResult<u32> {
    if !(0..=MAX_DESTINATION_TAG).contains(&tag) {
        return Err(HawalaError::invalid_tag(format!("destination tag {} out of range", tag)));
    }
    Ok(tag as u32)
}

fn validate_tag_value(value: &Value) -> HawalaResult<u32> {
    match value.as_i64() {
        Some(tag) => validate_tag(tag),
        None => Err(HawalaError::invalid_tag(format!("destination tag {} is not an integer", value))),
    }
}

fn signing_digest(tx_json: Map<String, Value>) -> HawalaResult<UnsignedXrpTx> {
    let digest = xrp_codec::signing_hash(&tx_json)?;
    log_debug!(MODULE, "Signing digest computed", digest = hex::encode(digest));
    Ok(UnsignedXrpTx { tx_json, digest })
}

/// Build the payment field map from an intent
pub fn prepare_payment(tx_data: &XrpTxData, signing_pub_key: &str) -> HawalaResult<UnsignedXrpTx> {
    let tag = tx_data.tag.map(validate_tag).transpose()?;

    let mut tx_json = Map::new();
    tx_json.insert("Account".into(), json!(tx_data.change_address));
    tx_json.insert("Amount".into(), json!(tx_data.amount.to_string()));
    tx_json.insert("Destination".into(), json!(tx_data.to));
    tx_json.insert("Fee".into(), json!(tx_data.fee.to_string()));
    tx_json.insert("Flags".into(), json!(CANONICAL_SIGNATURE_FLAG));
    tx_json.insert("Sequence".into(), json!(tx_data.sequence));
    tx_json.insert("TransactionType".into(), json!("Payment"));
    tx_json.insert("SigningPubKey".into(), json!(signing_pub_key.to_uppercase()));
    if let Some(tag) = tag {
        tx_json.insert("DestinationTag".into(), json!(tag));
    }

    log_debug!(
        MODULE,
        "Payment prepared",
        account = tx_data.change_address,
        destination = tx_data.to,
        amount = tx_data.amount
    );
    signing_digest(tx_json)
}

/// Take a caller-supplied field map, validate its tag and inject the key
pub fn prepare_json(tx_json: &Value, signing_pub_key: &str) -> HawalaResult<UnsignedXrpTx> {
    let mut tx_json = tx_json
        .as_object()
        .cloned()
        .ok_or_else(|| HawalaError::invalid_input("transaction JSON must be an object"))?;
    if let Some(tag) = tx_json.get("DestinationTag") {
        validate_tag_value(tag)?;
    }
    tx_json.insert("SigningPubKey".into(), json!(signing_pub_key.to_uppercase()));
    signing_digest(tx_json)
}

/// Attach the signature and produce the signed blob and its id
pub fn finalize(unsigned: UnsignedXrpTx, signature: &SignatureResult) -> HawalaResult<SignedTransaction> {
    let public_key = unsigned
        .tx_json
        .get("SigningPubKey")
        .and_then(Value::as_str)
        .ok_or_else(|| HawalaError::invalid_input("SigningPubKey missing"))
        .and_then(|pk| Ok(secp256k1::PublicKey::from_slice(&hex::decode(pk)?)?))?;
    if !verify_signature(&unsigned.digest, signature, &public_key) {
        return Err(HawalaError::signing_failed("signature does not match SigningPubKey"));
    }

    let mut tx_json = unsigned.tx_json;
    tx_json.insert("TxnSignature".into(), json!(hex::encode_upper(signature.to_der()?)));

    let blob = xrp_codec::encode(&tx_json)?;
    let txid = hex::encode_upper(xrp_codec::transaction_id(&blob));
    log_info!(MODULE, "Transaction signed", txid = txid);

    Ok(SignedTransaction {
        chain: Chain::Xrp,
        raw_tx: hex::encode_upper(blob),
        txid,
    })
}

/// Double SHA-256 of the prefixed message, as hex
pub fn message_digest(message: &str) -> String {
    let bytes = message.as_bytes();
    let len = bytes.len().to_be_bytes();
    let first = len.iter().position(|b| *b != 0).unwrap_or(len.len() - 1);

    let mut preimage = MESSAGE_MAGIC.to_vec();
    preimage.extend_from_slice(&len[first..]);
    preimage.extend_from_slice(bytes);
    hex::encode(double_sha256(&preimage))
}

fn signer_failure(error: SignerError) -> HawalaError {
    log_warn!(MODULE, "Signing provider failed", error = error);
    error.into()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XrpWallet;

impl XrpWallet {
    pub fn new() -> Self {
        Self
    }

    /// Classic address of a secp256k1 public key
    pub fn generate_address(&self, public_key_hex: &str) -> HawalaResult<String> {
        let public_key = secp256k1::PublicKey::from_slice(&hex::decode(public_key_hex)?)
            .map_err(|e| HawalaError::invalid_input(format!("invalid public key: {}", e)))?;
        Ok(encode_account_id(&hash160(&public_key.serialize())))
    }

    pub fn is_address_valid(&self, address: &str) -> bool {
        decode_account_id(address).is_ok()
    }

    pub fn generate_transaction(&self, tx_data: &XrpTxData, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
        let unsigned = prepare_payment(tx_data, signer.public_key())?;
        let signature = signer.sign(&unsigned.digest_hex()).map_err(signer_failure)?;
        finalize(unsigned, &signature)
    }

    pub async fn generate_transaction_async(
        &self,
        tx_data: &XrpTxData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        let unsigned = prepare_payment(tx_data, signer.public_key())?;
        let signature = signer.sign(&unsigned.digest_hex()).await.map_err(signer_failure)?;
        finalize(unsigned, &signature)
    }

    pub fn generate_transaction_from_json(
        &self,
        tx_json: &Value,
        signer: &dyn KeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        let unsigned = prepare_json(tx_json, signer.public_key())?;
        let signature = signer.sign(&unsigned.digest_hex()).map_err(signer_failure)?;
        finalize(unsigned, &signature)
    }

    pub async fn generate_transaction_from_json_async(
        &self,
        tx_json: &Value,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        let unsigned = prepare_json(tx_json, signer.public_key())?;
        let signature = signer.sign(&unsigned.digest_hex()).await.map_err(signer_failure)?;
        finalize(unsigned, &signature)
    }

    /// Returns `r || s` hex, without recovery id
    pub fn sign_message(&self, message: &str, signer: &dyn SignProvider) -> HawalaResult<String> {
        let signature = signer.sign(&message_digest(message)).map_err(signer_failure)?;
        signature.validate()?;
        Ok(signature.to_rs_hex())
    }

    pub async fn sign_message_async(&self, message: &str, signer: &dyn AsyncSignProvider) -> HawalaResult<String> {
        let signature = signer.sign(&message_digest(message)).await.map_err(signer_failure)?;
        signature.validate()?;
        Ok(signature.to_rs_hex())
    }
}
