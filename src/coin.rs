//! Chain dispatch
//!
//! Every supported ledger offers the same capability set (address
//! generation, address validation, transaction generation, message
//! signing). [`Coin`] holds one builder per ledger and dispatches on
//! the [`Chain`] tag.

use crate::bitcoin_wallet::{BitcoinWallet, MultisigOmniTxData, MultisigTxData, OmniTxData, ScriptType, TxData};
use crate::error::{HawalaError, HawalaResult};
use crate::litecoin_wallet::LitecoinWallet;
use crate::signing::{AsyncKeyProvider, AsyncSignProvider, KeyProvider, SignProvider};
use crate::tron_wallet::{TronTxData, TronWallet};
use crate::types::{Chain, SignedTransaction};
use crate::xrp_wallet::{XrpTxData, XrpWallet};
use serde::{Deserialize, Serialize};

/// A transaction intent for any supported chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TransactionRequest {
    Utxo(TxData),
    UtxoMultisig(MultisigTxData),
    Omni(OmniTxData),
    OmniMultisig(MultisigOmniTxData),
    Tron(TronTxData),
    Xrp(XrpTxData),
    XrpJson(serde_json::Value),
}

impl TransactionRequest {
    fn name(&self) -> &'static str {
        match self {
            TransactionRequest::Utxo(_) => "utxo",
            TransactionRequest::UtxoMultisig(_) => "utxo_multisig",
            TransactionRequest::Omni(_) => "omni",
            TransactionRequest::OmniMultisig(_) => "omni_multisig",
            TransactionRequest::Tron(_) => "tron",
            TransactionRequest::Xrp(_) => "xrp",
            TransactionRequest::XrpJson(_) => "xrp_json",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Coin {
    Bitcoin(BitcoinWallet),
    Litecoin(LitecoinWallet),
    Tron(TronWallet),
    Xrp(XrpWallet),
}

fn mismatch(chain: Chain, request: &TransactionRequest) -> HawalaError {
    HawalaError::invalid_input(format!("{} request cannot be built on {}", request.name(), chain.symbol()))
}

impl Coin {
    pub fn for_chain(chain: Chain) -> Self {
        match chain {
            Chain::Bitcoin => Coin::Bitcoin(BitcoinWallet::mainnet()),
            Chain::BitcoinTestnet => Coin::Bitcoin(BitcoinWallet::testnet()),
            Chain::Litecoin => Coin::Litecoin(LitecoinWallet::new()),
            Chain::Tron => Coin::Tron(TronWallet::new()),
            Chain::Xrp => Coin::Xrp(XrpWallet::new()),
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            Coin::Bitcoin(wallet) => wallet.chain(),
            Coin::Litecoin(_) => Chain::Litecoin,
            Coin::Tron(_) => Chain::Tron,
            Coin::Xrp(_) => Chain::Xrp,
        }
    }

    /// Default receive address for a public key
    ///
    /// UTXO chains use wrapped segwit (P2SH-P2WPKH).
    pub fn generate_address(&self, public_key_hex: &str) -> HawalaResult<String> {
        match self {
            Coin::Bitcoin(wallet) => wallet.generate_address(public_key_hex, ScriptType::P2shP2wpkh),
            Coin::Litecoin(wallet) => wallet.generate_address(public_key_hex),
            Coin::Tron(wallet) => wallet.generate_address(public_key_hex),
            Coin::Xrp(wallet) => wallet.generate_address(public_key_hex),
        }
    }

    pub fn is_address_valid(&self, address: &str) -> bool {
        match self {
            Coin::Bitcoin(wallet) => wallet.is_address_valid(address),
            Coin::Litecoin(wallet) => wallet.is_address_valid(address),
            Coin::Tron(wallet) => wallet.is_address_valid(address),
            Coin::Xrp(wallet) => wallet.is_address_valid(address),
        }
    }

    pub fn sign_message(&self, message: &str, signer: &dyn SignProvider) -> HawalaResult<String> {
        match self {
            Coin::Tron(wallet) => wallet.sign_message(message, signer),
            Coin::Xrp(wallet) => wallet.sign_message(message, signer),
            Coin::Bitcoin(_) | Coin::Litecoin(_) => Err(HawalaError::unsupported(format!(
                "message signing is not available on {}",
                self.chain().symbol()
            ))),
        }
    }

    pub async fn sign_message_async(&self, message: &str, signer: &dyn AsyncSignProvider) -> HawalaResult<String> {
        match self {
            Coin::Tron(wallet) => wallet.sign_message_async(message, signer).await,
            Coin::Xrp(wallet) => wallet.sign_message_async(message, signer).await,
            Coin::Bitcoin(_) | Coin::Litecoin(_) => Err(HawalaError::unsupported(format!(
                "message signing is not available on {}",
                self.chain().symbol()
            ))),
        }
    }

    /// Build and sign `request` with a single key provider
    pub fn generate_transaction<S: KeyProvider>(
        &self,
        request: &TransactionRequest,
        signer: &S,
    ) -> HawalaResult<SignedTransaction> {
        let signers: [&dyn KeyProvider; 1] = [signer];
        match (self, request) {
            (Coin::Bitcoin(w), TransactionRequest::Utxo(data)) => w.generate_transaction(data, &signers),
            (Coin::Bitcoin(w), TransactionRequest::UtxoMultisig(data)) => w.generate_multisig_transaction(data, &signers),
            (Coin::Bitcoin(w), TransactionRequest::Omni(data)) => w.generate_omni_transaction(data, &signers),
            (Coin::Bitcoin(w), TransactionRequest::OmniMultisig(data)) => {
                w.generate_multisig_omni_transaction(data, &signers)
            }
            (Coin::Litecoin(w), TransactionRequest::Utxo(data)) => w.generate_transaction(data, &signers),
            (Coin::Litecoin(w), TransactionRequest::UtxoMultisig(data)) => {
                w.generate_multisig_transaction(data, &signers)
            }
            (Coin::Litecoin(w), TransactionRequest::Omni(_) | TransactionRequest::OmniMultisig(_)) => {
                w.generate_omni_transaction()
            }
            (Coin::Tron(w), TransactionRequest::Tron(data)) => w.generate_transaction(data, signer),
            (Coin::Xrp(w), TransactionRequest::Xrp(data)) => w.generate_transaction(data, signer),
            (Coin::Xrp(w), TransactionRequest::XrpJson(json)) => w.generate_transaction_from_json(json, signer),
            (coin, request) => Err(mismatch(coin.chain(), request)),
        }
    }

    pub async fn generate_transaction_async<S: AsyncKeyProvider>(
        &self,
        request: &TransactionRequest,
        signer: &S,
    ) -> HawalaResult<SignedTransaction> {
        let signers: [&dyn AsyncKeyProvider; 1] = [signer];
        match (self, request) {
            (Coin::Bitcoin(w), TransactionRequest::Utxo(data)) => w.generate_transaction_async(data, &signers).await,
            (Coin::Bitcoin(w), TransactionRequest::UtxoMultisig(data)) => {
                w.generate_multisig_transaction_async(data, &signers).await
            }
            (Coin::Bitcoin(w), TransactionRequest::Omni(data)) => w.generate_omni_transaction_async(data, &signers).await,
            (Coin::Bitcoin(w), TransactionRequest::OmniMultisig(data)) => {
                w.generate_multisig_omni_transaction_async(data, &signers).await
            }
            (Coin::Litecoin(w), TransactionRequest::Utxo(data)) => w.generate_transaction_async(data, &signers).await,
            (Coin::Litecoin(w), TransactionRequest::UtxoMultisig(data)) => {
                w.generate_multisig_transaction_async(data, &signers).await
            }
            (Coin::Litecoin(w), TransactionRequest::Omni(_) | TransactionRequest::OmniMultisig(_)) => {
                w.generate_omni_transaction()
            }
            (Coin::Tron(w), TransactionRequest::Tron(data)) => w.generate_transaction_async(data, signer).await,
            (Coin::Xrp(w), TransactionRequest::Xrp(data)) => w.generate_transaction_async(data, signer).await,
            (Coin::Xrp(w), TransactionRequest::XrpJson(json)) => {
                w.generate_transaction_from_json_async(json, signer).await
            }
            (coin, request) => Err(mismatch(coin.chain(), request)),
        }
    }
}
