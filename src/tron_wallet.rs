//! TRON (TRX) Transaction Builder
//!
//! Builds account-model transactions (TRX/TRC10 transfers, TRC20 calls,
//! votes, freeze/unfreeze, reward withdrawal), binds them to a recent
//! block and attaches one `r || s || recId` signature per contract.
//!
//! Both the signing digest and the transaction id are SHA-256 of the
//! serialized unsigned `raw_data`.

use crate::config::TronOptions;
use crate::error::{HawalaError, HawalaResult};
use crate::signing::{recovers_to, AsyncKeyProvider, AsyncSignProvider, KeyProvider, SignProvider, SignerError};
use crate::tron_proto::{
    ContractBody, FreezeBalanceContract, ResourceCode, Transaction, TransactionRaw,
    TransferAssetContract, TransferContract, TriggerSmartContract, UnfreezeBalanceContract, Vote,
    VoteWitnessContract, WithdrawBalanceContract,
};
use crate::types::{Chain, SignatureResult, SignedTransaction};
use crate::utils::{base58check_decode, base58check_encode, keccak256, sha256, Base58Alphabet};
use crate::{log_debug, log_info, log_warn};
use ethers_core::abi::{self, Token};
use ethers_core::types::{H160, U256};
use prost::Message;
use serde::{Deserialize, Serialize};

const MODULE: &str = "tron_wallet";

/// Mainnet address version byte
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;
pub const DEFAULT_FREEZE_DURATION: i64 = 3;

const TRC20_TRANSFER_SIGNATURE: &[u8] = b"transfer(address,uint256)";

// =============================================================================
// Intent Types
// =============================================================================

/// Most recent block as reported by a full node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestBlock {
    /// 32-byte block id as hex
    pub hash: String,
    pub number: u64,
    /// Block timestamp in milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TronTxData {
    pub from: String,
    pub to: String,
    /// Decimal amount (sun for TRX, token units otherwise)
    pub value: String,
    /// TRC10 asset id; absent or `TRX` for a plain transfer
    #[serde(default)]
    pub token: Option<String>,
    /// TRC20 contract; turns the transfer into a contract call
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    pub latest_block: LatestBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteEntry {
    pub address: String,
    pub count: i64,
}

/// Witness votes, kept in caller order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteData {
    pub address: String,
    pub votes: Vec<VoteEntry>,
    pub latest_block: LatestBlock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    #[default]
    Bandwidth,
    Energy,
}

impl From<ResourceType> for ResourceCode {
    fn from(resource: ResourceType) -> Self {
        match resource {
            ResourceType::Bandwidth => ResourceCode::Bandwidth,
            ResourceType::Energy => ResourceCode::Energy,
        }
    }
}

fn default_freeze_duration() -> i64 {
    DEFAULT_FREEZE_DURATION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeData {
    pub address: String,
    pub amount: i64,
    /// Days
    #[serde(default = "default_freeze_duration")]
    pub duration: i64,
    #[serde(default)]
    pub resource_type: ResourceType,
    pub latest_block: LatestBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfreezeData {
    pub address: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    pub latest_block: LatestBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawData {
    pub address: String,
    pub latest_block: LatestBlock,
}

// =============================================================================
// Block Binding
// =============================================================================

/// Reference-block fields derived from a [`LatestBlock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub ref_block_bytes: [u8; 2],
    pub ref_block_hash: [u8; 8],
    pub expiration: i64,
    pub timestamp: i64,
}

impl BlockReference {
    /// Derive the reference fields for a block.
    ///
    /// The block id is `BE(number) || hash[8..]`; the reference hash is
    /// bytes `[8, 16)` of that id and the reference bytes are the low two
    /// bytes of the number.
    pub fn bind(block: &LatestBlock, expiration_window_ms: i64) -> HawalaResult<Self> {
        let hash = hex::decode(block.hash.trim_start_matches("0x")).map_err(|e| {
            HawalaError::invalid_block_reference("block hash is not hex").with_details(e.to_string())
        })?;
        if hash.len() != 32 {
            return Err(HawalaError::invalid_block_reference(format!(
                "block hash must be 32 bytes, got {}",
                hash.len()
            )));
        }
        if block.timestamp < 0 {
            return Err(HawalaError::invalid_block_reference("block timestamp is negative"));
        }
        let expiration = block
            .timestamp
            .checked_add(expiration_window_ms)
            .ok_or_else(|| HawalaError::invalid_block_reference("expiration overflows"))?;

        let number = block.number.to_be_bytes();
        let mut ref_block_hash = [0u8; 8];
        ref_block_hash.copy_from_slice(&hash[8..16]);

        Ok(Self {
            ref_block_bytes: [number[6], number[7]],
            ref_block_hash,
            expiration,
            timestamp: block.timestamp,
        })
    }

    fn apply(&self, raw: &mut TransactionRaw) {
        raw.ref_block_bytes = self.ref_block_bytes.to_vec();
        raw.ref_block_hash = self.ref_block_hash.to_vec();
        raw.expiration = self.expiration;
    }
}

// =============================================================================
// Addresses
// =============================================================================

/// Decode a base58check address into its 21-byte `0x41 || hash` form
pub fn decode_address(address: &str) -> HawalaResult<Vec<u8>> {
    let payload = base58check_decode(address, Base58Alphabet::Bitcoin)?;
    if payload.len() != 21 || payload[0] != TRON_ADDRESS_PREFIX {
        return Err(HawalaError::address_decode(format!("not a TRON address: {}", address)));
    }
    Ok(payload)
}

/// `transfer(address,uint256)` call data for a TRC20 contract
pub fn compose_trc20_data(to: &str, value: &str) -> HawalaResult<Vec<u8>> {
    let recipient = decode_address(to)?;
    let amount = U256::from_dec_str(value)
        .map_err(|e| HawalaError::invalid_input(format!("invalid TRC20 amount {:?}: {}", value, e)))?;

    let mut data = keccak256(TRC20_TRANSFER_SIGNATURE)[..4].to_vec();
    data.extend(abi::encode(&[
        Token::Address(H160::from_slice(&recipient[1..])),
        Token::Uint(amount),
    ]));
    Ok(data)
}

fn parse_amount(value: &str) -> HawalaResult<i64> {
    let amount: i64 = value
        .trim()
        .parse()
        .map_err(|_| HawalaError::invalid_input(format!("invalid amount: {:?}", value)))?;
    if amount < 0 {
        return Err(HawalaError::invalid_input("amount must not be negative"));
    }
    Ok(amount)
}

// =============================================================================
// Signing
// =============================================================================

/// SHA-256 of the serialized unsigned body; doubles as the transaction id
pub fn raw_digest(tx: &Transaction) -> HawalaResult<[u8; 32]> {
    let raw = tx
        .raw_data
        .as_ref()
        .ok_or_else(|| HawalaError::invalid_input("transaction has no raw data"))?;
    Ok(sha256(&raw.encode_to_vec()))
}

/// Attach one copy of `signature` per contract and serialize
pub fn attach_signature(mut tx: Transaction, signature: &SignatureResult) -> HawalaResult<SignedTransaction> {
    let digest = raw_digest(&tx)?;
    let rsv = signature.to_rsv_bytes()?;
    let contracts = tx.raw_data.as_ref().map_or(0, |raw| raw.contract.len());

    tx.signature = vec![rsv.to_vec(); contracts];

    let txid = hex::encode(digest);
    log_info!(MODULE, "Transaction signed", txid = txid, signatures = contracts);

    Ok(SignedTransaction {
        chain: Chain::Tron,
        raw_tx: hex::encode(tx.encode_to_vec()),
        txid,
    })
}

fn signer_failure(error: SignerError) -> HawalaError {
    log_warn!(MODULE, "Signing provider failed", error = error);
    error.into()
}

/// The recovery id is embedded in the transaction, so it must recover
/// the signer's own key
fn check_signature(digest: &[u8; 32], signature: &SignatureResult, public_key_hex: &str) -> HawalaResult<()> {
    let public_key = secp256k1::PublicKey::from_slice(&hex::decode(public_key_hex)?)
        .map_err(|e| HawalaError::signing_failed(format!("signer exposes an invalid public key: {}", e)))?;
    signature.validate()?;
    if !recovers_to(digest, signature, &public_key) {
        log_warn!(MODULE, "Signature rejected", digest = hex::encode(digest));
        return Err(HawalaError::signing_failed(
            "signature does not recover the signer's public key",
        ));
    }
    Ok(())
}

/// Sign `tx` with a blocking provider
pub fn sign_transaction(tx: Transaction, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
    let digest = raw_digest(&tx)?;
    let digest_hex = hex::encode(digest);
    log_debug!(MODULE, "Requesting signature", digest = digest_hex);

    let signature = signer.sign(&digest_hex).map_err(signer_failure)?;
    check_signature(&digest, &signature, signer.public_key())?;
    attach_signature(tx, &signature)
}

/// Sign `tx` with a suspending provider
pub async fn sign_transaction_async(
    tx: Transaction,
    signer: &dyn AsyncKeyProvider,
) -> HawalaResult<SignedTransaction> {
    let digest = raw_digest(&tx)?;
    let digest_hex = hex::encode(digest);
    log_debug!(MODULE, "Requesting signature", digest = digest_hex);

    let signature = signer.sign(&digest_hex).await.map_err(signer_failure)?;
    check_signature(&digest, &signature, signer.public_key())?;
    attach_signature(tx, &signature)
}

fn message_digest(message: &str) -> String {
    hex::encode(sha256(message.as_bytes()))
}

// =============================================================================
// Wallet
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct TronWallet {
    options: TronOptions,
}

impl TronWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TronOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TronOptions {
        &self.options
    }

    /// Address from a compressed or uncompressed secp256k1 public key
    pub fn generate_address(&self, public_key_hex: &str) -> HawalaResult<String> {
        let bytes = hex::decode(public_key_hex)?;
        let public_key = secp256k1::PublicKey::from_slice(&bytes)
            .map_err(|e| HawalaError::invalid_input(format!("invalid public key: {}", e)))?;

        let uncompressed = public_key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);

        let mut payload = Vec::with_capacity(21);
        payload.push(TRON_ADDRESS_PREFIX);
        payload.extend_from_slice(&hash[12..]);
        Ok(base58check_encode(&payload, Base58Alphabet::Bitcoin))
    }

    pub fn is_address_valid(&self, address: &str) -> bool {
        address.starts_with('T') && base58check_decode(address, Base58Alphabet::Bitcoin).is_ok()
    }

    /// Base58check address to its hex payload (`41...`)
    pub fn convert_address(&self, address: &str) -> HawalaResult<String> {
        Ok(hex::encode(base58check_decode(address, Base58Alphabet::Bitcoin)?))
    }

    fn bind<B: ContractBody>(&self, body: B, block: &LatestBlock) -> HawalaResult<Transaction> {
        let reference = BlockReference::bind(block, self.options.expiration_window_ms)?;
        let mut raw = TransactionRaw {
            contract: vec![body.into_contract()],
            ..Default::default()
        };
        reference.apply(&mut raw);

        log_debug!(
            MODULE,
            "Bound to reference block",
            contract = B::NAME,
            block_number = block.number,
            expiration = reference.expiration
        );
        Ok(Transaction {
            raw_data: Some(raw),
            signature: Vec::new(),
        })
    }

    /// Unsigned TRX, TRC10 or TRC20 transfer
    pub fn build_transaction(&self, tx_data: &TronTxData) -> HawalaResult<Transaction> {
        let owner_address = decode_address(&tx_data.from)?;

        let mut tx = match &tx_data.contract_address {
            Some(contract_address) => {
                let body = TriggerSmartContract {
                    owner_address,
                    contract_address: decode_address(contract_address)?,
                    data: compose_trc20_data(&tx_data.to, &tx_data.value)?,
                    ..Default::default()
                };
                let mut tx = self.bind(body, &tx_data.latest_block)?;
                if let Some(raw) = tx.raw_data.as_mut() {
                    raw.fee_limit = self.options.trc20_fee_limit;
                    raw.timestamp = tx_data.latest_block.timestamp;
                }
                tx
            }
            None => {
                let to_address = decode_address(&tx_data.to)?;
                let amount = parse_amount(&tx_data.value)?;
                match tx_data.token.as_deref() {
                    Some(token) if !token.eq_ignore_ascii_case("TRX") => {
                        let body = TransferAssetContract {
                            asset_name: token.as_bytes().to_vec(),
                            owner_address,
                            to_address,
                            amount,
                        };
                        self.bind(body, &tx_data.latest_block)?
                    }
                    _ => {
                        let body = TransferContract {
                            owner_address,
                            to_address,
                            amount,
                        };
                        self.bind(body, &tx_data.latest_block)?
                    }
                }
            }
        };

        if let (Some(memo), Some(raw)) = (&tx_data.memo, tx.raw_data.as_mut()) {
            raw.data = memo.as_bytes().to_vec();
        }

        log_debug!(MODULE, "Transfer built", from = tx_data.from, to = tx_data.to, value = tx_data.value);
        Ok(tx)
    }

    pub fn build_vote(&self, vote_data: &VoteData) -> HawalaResult<Transaction> {
        if vote_data.votes.is_empty() {
            return Err(HawalaError::invalid_input("at least one vote is required"));
        }
        let votes = vote_data
            .votes
            .iter()
            .map(|vote| {
                Ok(Vote {
                    vote_address: decode_address(&vote.address)?,
                    vote_count: vote.count,
                })
            })
            .collect::<HawalaResult<Vec<_>>>()?;

        let body = VoteWitnessContract {
            owner_address: decode_address(&vote_data.address)?,
            votes,
            support: false,
        };
        self.bind(body, &vote_data.latest_block)
    }

    pub fn build_freeze(&self, data: &FreezeData) -> HawalaResult<Transaction> {
        if data.amount <= 0 {
            return Err(HawalaError::invalid_input("frozen balance must be positive"));
        }
        let body = FreezeBalanceContract {
            owner_address: decode_address(&data.address)?,
            frozen_balance: data.amount,
            frozen_duration: data.duration,
            resource: ResourceCode::from(data.resource_type) as i32,
            receiver_address: Vec::new(),
        };
        self.bind(body, &data.latest_block)
    }

    pub fn build_unfreeze(&self, data: &UnfreezeData) -> HawalaResult<Transaction> {
        let body = UnfreezeBalanceContract {
            owner_address: decode_address(&data.address)?,
            resource: ResourceCode::from(data.resource_type) as i32,
            receiver_address: Vec::new(),
        };
        self.bind(body, &data.latest_block)
    }

    pub fn build_withdraw(&self, data: &WithdrawData) -> HawalaResult<Transaction> {
        let body = WithdrawBalanceContract {
            owner_address: decode_address(&data.address)?,
        };
        self.bind(body, &data.latest_block)
    }

    pub fn generate_transaction(
        &self,
        tx_data: &TronTxData,
        signer: &dyn KeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction(self.build_transaction(tx_data)?, signer)
    }

    pub async fn generate_transaction_async(
        &self,
        tx_data: &TronTxData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction_async(self.build_transaction(tx_data)?, signer).await
    }

    pub fn vote(&self, vote_data: &VoteData, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
        sign_transaction(self.build_vote(vote_data)?, signer)
    }

    pub async fn vote_async(
        &self,
        vote_data: &VoteData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction_async(self.build_vote(vote_data)?, signer).await
    }

    pub fn freeze_balance(&self, data: &FreezeData, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
        sign_transaction(self.build_freeze(data)?, signer)
    }

    pub async fn freeze_balance_async(
        &self,
        data: &FreezeData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction_async(self.build_freeze(data)?, signer).await
    }

    pub fn unfreeze_balance(&self, data: &UnfreezeData, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
        sign_transaction(self.build_unfreeze(data)?, signer)
    }

    pub async fn unfreeze_balance_async(
        &self,
        data: &UnfreezeData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction_async(self.build_unfreeze(data)?, signer).await
    }

    pub fn withdraw_reward(&self, data: &WithdrawData, signer: &dyn KeyProvider) -> HawalaResult<SignedTransaction> {
        sign_transaction(self.build_withdraw(data)?, signer)
    }

    pub async fn withdraw_reward_async(
        &self,
        data: &WithdrawData,
        signer: &dyn AsyncKeyProvider,
    ) -> HawalaResult<SignedTransaction> {
        sign_transaction_async(self.build_withdraw(data)?, signer).await
    }

    /// `sha256(message)` signed, returned as `r || s || recId` hex
    pub fn sign_message(&self, message: &str, signer: &dyn SignProvider) -> HawalaResult<String> {
        let signature = signer.sign(&message_digest(message)).map_err(signer_failure)?;
        signature.validate()?;
        Ok(signature.to_rsv_hex())
    }

    pub async fn sign_message_async(&self, message: &str, signer: &dyn AsyncSignProvider) -> HawalaResult<String> {
        let signature = signer.sign(&message_digest(message)).await.map_err(signer_failure)?;
        signature.validate()?;
        Ok(signature.to_rsv_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::signing::{verify_signature, KeyProvider, PrivateKeySigner};
    use crate::tron_proto::ContractType;

    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const OWNER: &str = "TMVQGm1qAQYVdetCeGRRkTWYYrLXuHK2HC";
    const RECIPIENT: &str = "TBXSw8fM4jpQkGc6zZjsVABFpVN7UvXPdV";
    const OTHER: &str = "TD5gsCwxykWsLN9aPrq2TAfNjByuZKYp4E";

    // Block 12345678 with id bytes [8, 16) = 1122334455667788
    const BLOCK_HASH: &str = "0000000000bc614e112233445566778899999999999999999999999999999999";
    const EXPECTED_RAW: &str = "0a02614e2208112233445566778840c0eea7bcc82e5a67080112630a2d747970652e676f6f676c65617069732e636f6d2f70726f746f636f6c2e5472616e73666572436f6e747261637412320a15417e5f4552091a69125d5dfcb7b8c2659029395bdf121541111111111111111111111111111111111111111118c0843d";
    const EXPECTED_TXID: &str = "588c1fce88e593f7207c7b29f65a30699f8196e914243533651ca8e6b2132805";

    fn block() -> LatestBlock {
        LatestBlock {
            hash: BLOCK_HASH.to_string(),
            number: 12_345_678,
            timestamp: 1_600_000_000_000,
        }
    }

    fn transfer() -> TronTxData {
        TronTxData {
            from: OWNER.to_string(),
            to: RECIPIENT.to_string(),
            value: "1000000".to_string(),
            token: None,
            contract_address: None,
            memo: None,
            latest_block: block(),
        }
    }

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::from_hex(KEY_ONE).unwrap()
    }

    fn raw(tx: &Transaction) -> &TransactionRaw {
        tx.raw_data.as_ref().unwrap()
    }

    #[test]
    fn test_block_binding_golden_vector() {
        let reference = BlockReference::bind(&block(), 1_800_000).unwrap();
        assert_eq!(hex::encode(reference.ref_block_bytes), "614e");
        assert_eq!(hex::encode(reference.ref_block_hash), "1122334455667788");
        assert_eq!(reference.expiration, 1_600_001_800_000);
    }

    #[test]
    fn test_malformed_block_rejected() {
        let mut short = block();
        short.hash = "abcd".to_string();
        let err = BlockReference::bind(&short, 1_800_000).unwrap_err();
        assert!(err.is(ErrorCode::InvalidBlockReference));

        let mut not_hex = block();
        not_hex.hash = "zz".repeat(32);
        let err = BlockReference::bind(&not_hex, 1_800_000).unwrap_err();
        assert!(err.is(ErrorCode::InvalidBlockReference));

        let mut negative = block();
        negative.timestamp = -1;
        assert!(BlockReference::bind(&negative, 1_800_000).is_err());
    }

    #[test]
    fn test_generate_address() {
        let wallet = TronWallet::new();
        let pk = KeyProvider::public_key(&signer()).to_string();
        assert_eq!(wallet.generate_address(&pk).unwrap(), OWNER);

        let uncompressed = signer().public_key_uncompressed().unwrap();
        assert_eq!(wallet.generate_address(&uncompressed).unwrap(), OWNER);
    }

    #[test]
    fn test_address_validation_and_conversion() {
        let wallet = TronWallet::new();
        assert!(wallet.is_address_valid(OWNER));
        assert!(!wallet.is_address_valid("TMVQGm1qAQYVdetCeGRRkTWYYrLXuHK2HD"));
        assert!(!wallet.is_address_valid("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));
        assert_eq!(
            wallet.convert_address(OWNER).unwrap(),
            "417e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_transfer_raw_bytes() {
        let tx = TronWallet::new().build_transaction(&transfer()).unwrap();
        assert_eq!(hex::encode(raw(&tx).encode_to_vec()), EXPECTED_RAW);
        assert_eq!(raw(&tx).timestamp, 0);
        assert_eq!(raw(&tx).fee_limit, 0);
    }

    #[test]
    fn test_generate_transaction_signs_raw_digest() {
        let wallet = TronWallet::new();
        let signed = wallet.generate_transaction(&transfer(), &signer()).unwrap();
        assert_eq!(signed.chain, Chain::Tron);
        assert_eq!(signed.txid, EXPECTED_TXID);

        let decoded = Transaction::decode(hex::decode(&signed.raw_tx).unwrap().as_slice()).unwrap();
        assert_eq!(hex::encode(raw(&decoded).encode_to_vec()), EXPECTED_RAW);
        assert_eq!(decoded.signature.len(), 1);
        assert_eq!(decoded.signature[0].len(), 65);

        let sig = &decoded.signature[0];
        let result = SignatureResult {
            r: hex::encode(&sig[..32]),
            s: hex::encode(&sig[32..64]),
            rec_id: sig[64],
        };
        let digest: [u8; 32] = hex::decode(EXPECTED_TXID).unwrap().try_into().unwrap();
        let pk = secp256k1::PublicKey::from_slice(&hex::decode(KeyProvider::public_key(&signer())).unwrap()).unwrap();
        assert!(verify_signature(&digest, &result, &pk));
    }

    #[test]
    fn test_one_signature_per_contract() {
        let mut tx = TronWallet::new().build_transaction(&transfer()).unwrap();
        let extra = raw(&tx).contract[0].clone();
        tx.raw_data.as_mut().unwrap().contract.push(extra);

        let signed = sign_transaction(tx, &signer()).unwrap();
        let decoded = Transaction::decode(hex::decode(&signed.raw_tx).unwrap().as_slice()).unwrap();
        assert_eq!(decoded.signature.len(), 2);
        assert_eq!(decoded.signature[0], decoded.signature[1]);
    }

    #[test]
    fn test_memo_changes_txid() {
        let mut data = transfer();
        data.memo = Some("hello".to_string());
        let signed = TronWallet::new().generate_transaction(&data, &signer()).unwrap();
        assert_eq!(
            signed.txid,
            "1fc77208a08bbd024e8cf661f70e9cb0195c646d759bc7b049f66eca10c2bd34"
        );
    }

    #[test]
    fn test_trc10_transfer_uses_asset_contract() {
        let mut data = transfer();
        data.token = Some("1002000".to_string());
        let tx = TronWallet::new().build_transaction(&data).unwrap();

        let contract = &raw(&tx).contract[0];
        assert_eq!(contract.r#type, ContractType::TransferAssetContract as i32);
        let any = contract.parameter.as_ref().unwrap();
        let body = TransferAssetContract::decode(any.value.as_slice()).unwrap();
        assert_eq!(body.asset_name, b"1002000".to_vec());
        assert_eq!(body.amount, 1_000_000);

        data.token = Some("TRX".to_string());
        let tx = TronWallet::new().build_transaction(&data).unwrap();
        assert_eq!(raw(&tx).contract[0].r#type, ContractType::TransferContract as i32);
    }

    #[test]
    fn test_trc20_call_data() {
        let data = compose_trc20_data(RECIPIENT, "1000000").unwrap();
        let expected = format!(
            "a9059cbb{}{}{}{}",
            "00".repeat(12),
            "11".repeat(20),
            "00".repeat(29),
            "0f4240"
        );
        assert_eq!(hex::encode(data), expected);
        assert!(compose_trc20_data(RECIPIENT, "-5").is_err());
    }

    #[test]
    fn test_trc20_sets_fee_limit_and_timestamp() {
        let mut data = transfer();
        data.contract_address = Some(OTHER.to_string());
        let tx = TronWallet::new().build_transaction(&data).unwrap();

        let raw = raw(&tx);
        assert_eq!(raw.fee_limit, 1_000_000_000);
        assert_eq!(raw.timestamp, 1_600_000_000_000);
        assert_eq!(raw.expiration, 1_600_001_800_000);
        assert_eq!(raw.contract[0].r#type, ContractType::TriggerSmartContract as i32);

        let any = raw.contract[0].parameter.as_ref().unwrap();
        let body = TriggerSmartContract::decode(any.value.as_slice()).unwrap();
        assert_eq!(hex::encode(&body.contract_address), format!("41{}", "22".repeat(20)));
        assert_eq!(body.call_value, 0);
    }

    #[test]
    fn test_bad_addresses_raise_address_decode() {
        let mut data = transfer();
        data.contract_address = Some("not-an-address".to_string());
        let err = TronWallet::new().build_transaction(&data).unwrap_err();
        assert!(err.is(ErrorCode::AddressDecode));

        let mut data = transfer();
        data.from = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".to_string();
        let err = TronWallet::new().build_transaction(&data).unwrap_err();
        assert!(err.is(ErrorCode::AddressDecode));
    }

    #[test]
    fn test_vote_preserves_order() {
        let data = VoteData {
            address: OWNER.to_string(),
            votes: vec![
                VoteEntry { address: OTHER.to_string(), count: 5 },
                VoteEntry { address: RECIPIENT.to_string(), count: 7 },
            ],
            latest_block: block(),
        };
        let tx = TronWallet::new().build_vote(&data).unwrap();
        let contract = &raw(&tx).contract[0];
        assert_eq!(contract.r#type, ContractType::VoteWitnessContract as i32);

        let body = VoteWitnessContract::decode(contract.parameter.as_ref().unwrap().value.as_slice()).unwrap();
        assert_eq!(body.votes.len(), 2);
        assert_eq!(body.votes[0].vote_count, 5);
        assert_eq!(body.votes[1].vote_count, 7);
        assert!(!body.support);
    }

    #[test]
    fn test_freeze_defaults() {
        let json = format!(
            r#"{{"address":"{}","amount":1000000,"latestBlock":{{"hash":"{}","number":12345678,"timestamp":1600000000000}}}}"#,
            OWNER, BLOCK_HASH
        );
        let data: FreezeData = serde_json::from_str(&json).unwrap();
        assert_eq!(data.duration, 3);
        assert_eq!(data.resource_type, ResourceType::Bandwidth);

        let tx = TronWallet::new().build_freeze(&data).unwrap();
        let any = raw(&tx).contract[0].parameter.as_ref().unwrap();
        let body = FreezeBalanceContract::decode(any.value.as_slice()).unwrap();
        assert_eq!(body.frozen_duration, 3);
        assert_eq!(body.resource, ResourceCode::Bandwidth as i32);
    }

    #[test]
    fn test_unfreeze_and_withdraw() {
        let wallet = TronWallet::new();
        let unfreeze = UnfreezeData {
            address: OWNER.to_string(),
            resource_type: ResourceType::Energy,
            latest_block: block(),
        };
        let tx = wallet.build_unfreeze(&unfreeze).unwrap();
        let any = raw(&tx).contract[0].parameter.as_ref().unwrap();
        assert_eq!(UnfreezeBalanceContract::decode(any.value.as_slice()).unwrap().resource, 1);

        let withdraw = WithdrawData {
            address: OWNER.to_string(),
            latest_block: block(),
        };
        let signed = wallet.withdraw_reward(&withdraw, &signer()).unwrap();
        assert_eq!(signed.txid.len(), 64);
    }

    #[test]
    fn test_sign_message() {
        let sig = TronWallet::new().sign_message("hello tron", &signer()).unwrap();
        assert_eq!(sig.len(), 130);
        assert!(sig.ends_with("00") || sig.ends_with("01"));

        let expected = SignProvider::sign(
            &signer(),
            "3d7061e5be26245a2a110a685670f9adcc5ebba8d8c8e59ac5a59206e879fd14",
        )
        .unwrap();
        assert_eq!(sig, expected.to_rsv_hex());
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let wallet = TronWallet::new();
        let sync = wallet.generate_transaction(&transfer(), &signer()).unwrap();
        let signer = signer();
        let async_signed = wallet.generate_transaction_async(&transfer(), &signer).await.unwrap();
        assert_eq!(sync, async_signed);

        let msg = wallet.sign_message_async("hello tron", &signer).await.unwrap();
        assert_eq!(msg, wallet.sign_message("hello tron", &signer).unwrap());
    }

    /// Honest signer whose output is rewritten before it is returned
    struct TamperingSigner {
        inner: PrivateKeySigner,
        tamper: fn(SignatureResult) -> SignatureResult,
    }

    impl SignProvider for TamperingSigner {
        fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
            SignProvider::sign(&self.inner, digest_hex).map(self.tamper)
        }
    }

    impl KeyProvider for TamperingSigner {
        fn public_key(&self) -> &str {
            KeyProvider::public_key(&self.inner)
        }
    }

    #[async_trait::async_trait]
    impl AsyncSignProvider for TamperingSigner {
        async fn sign(&self, digest_hex: &str) -> Result<SignatureResult, SignerError> {
            SignProvider::sign(self, digest_hex)
        }
    }

    impl AsyncKeyProvider for TamperingSigner {
        fn public_key(&self) -> &str {
            KeyProvider::public_key(&self.inner)
        }
    }

    fn tampering(tamper: fn(SignatureResult) -> SignatureResult) -> TamperingSigner {
        TamperingSigner { inner: signer(), tamper }
    }

    #[test]
    fn test_out_of_range_recovery_id_rejected() {
        let forged = tampering(|sig| SignatureResult { rec_id: 27, ..sig });
        let err = TronWallet::new().generate_transaction(&transfer(), &forged).unwrap_err();
        assert!(err.is(ErrorCode::SigningFailed));
        assert!(err.to_string().contains("recovery id"));
    }

    #[test]
    fn test_wrong_recovery_id_rejected() {
        let forged = tampering(|sig| SignatureResult { rec_id: sig.rec_id ^ 1, ..sig });
        let err = TronWallet::new().generate_transaction(&transfer(), &forged).unwrap_err();
        assert!(err.is(ErrorCode::SigningFailed));
    }

    #[test]
    fn test_non_verifying_signature_rejected() {
        let forged = tampering(|sig| SignatureResult {
            r: "11".repeat(32),
            s: "22".repeat(32),
            ..sig
        });
        let tx = TronWallet::new().build_vote(&VoteData {
            address: OWNER.to_string(),
            votes: vec![VoteEntry { address: RECIPIENT.to_string(), count: 1 }],
            latest_block: block(),
        });
        assert!(sign_transaction(tx.unwrap(), &forged).unwrap_err().is(ErrorCode::SigningFailed));
    }

    #[tokio::test]
    async fn test_async_path_rejects_forged_signature() {
        let forged = tampering(|sig| SignatureResult { rec_id: 27, ..sig });
        let err = TronWallet::new()
            .generate_transaction_async(&transfer(), &forged)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::SigningFailed));
    }
}
