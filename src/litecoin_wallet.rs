//! Litecoin adapter over the Bitcoin-family builder
//!
//! Litecoin shares Bitcoin's transaction format, so this wraps a
//! [`BitcoinWallet`] bound to Litecoin's version bytes. The only extra step
//! is rewriting Bitcoin-dialect legacy addresses (`1...`, `3...`) into their
//! Litecoin spelling before assembly.

use crate::bitcoin_wallet::{BitcoinWallet, MultisigTxData, Outputs, ScriptType, TxData};
use crate::config::NetworkParams;
use crate::error::{HawalaError, HawalaResult};
use crate::log_debug;
use crate::signing::{AsyncKeyProvider, KeyProvider};
use crate::types::{Chain, SignedTransaction};
use crate::utxo_address::{decode_segwit, LegacyAddress};

const MODULE: &str = "litecoin_wallet";

/// Version byte on the other side of the BTC/LTC mapping, if any
fn counterpart_version(version: u8) -> Option<u8> {
    let btc = NetworkParams::bitcoin();
    let ltc = NetworkParams::litecoin();

    match version {
        v if v == btc.script_hash => Some(ltc.script_hash),
        v if v == btc.pub_key_hash => Some(ltc.pub_key_hash),
        v if v == ltc.script_hash => Some(btc.script_hash),
        v if v == ltc.pub_key_hash => Some(btc.pub_key_hash),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct LitecoinWallet {
    inner: BitcoinWallet,
}

impl Default for LitecoinWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl LitecoinWallet {
    pub fn new() -> Self {
        Self {
            inner: BitcoinWallet::with_network(Chain::Litecoin, NetworkParams::litecoin()),
        }
    }

    pub fn inner(&self) -> &BitcoinWallet {
        &self.inner
    }

    /// Swap a legacy address between its Bitcoin and Litecoin spellings
    ///
    /// Bech32 addresses and unknown version bytes come back unchanged.
    pub fn convert_address(&self, address: &str) -> HawalaResult<String> {
        if address.to_lowercase().starts_with("ltc1") {
            return Ok(address.to_string());
        }

        let legacy = LegacyAddress::decode(address)?;
        Ok(match counterpart_version(legacy.version) {
            Some(version) => legacy.with_version(version).encode(),
            None => address.to_string(),
        })
    }

    /// Accepts `L`, `M` and deprecated `3` legacy addresses and `ltc1` segwit
    pub fn is_address_valid(&self, address: &str) -> bool {
        if address.starts_with('L') || address.starts_with('3') || address.starts_with('M') {
            LegacyAddress::decode(address).is_ok()
        } else if address.starts_with("ltc") {
            decode_segwit(address, "ltc").is_ok()
        } else {
            false
        }
    }

    /// P2SH-P2WPKH (`M...`) address of a compressed public key
    pub fn generate_address(&self, public_key_hex: &str) -> HawalaResult<String> {
        self.inner.generate_address(public_key_hex, ScriptType::P2shP2wpkh)
    }

    /// Rewrite Bitcoin-dialect legacy addresses into Litecoin ones
    fn convert_legacy_address(&self, address: &str) -> String {
        let btc = NetworkParams::bitcoin();
        match LegacyAddress::decode(address) {
            Ok(legacy) if legacy.version == btc.script_hash || legacy.version == btc.pub_key_hash => {
                match counterpart_version(legacy.version) {
                    Some(version) => {
                        let converted = legacy.with_version(version).encode();
                        log_debug!(MODULE, "Converted legacy address", from = address, to = converted);
                        converted
                    }
                    None => address.to_string(),
                }
            }
            _ => address.to_string(),
        }
    }

    fn process_outputs(&self, outputs: &Outputs) -> Outputs {
        match outputs {
            Outputs::Destination(dest) => {
                let mut dest = dest.clone();
                dest.to = self.convert_legacy_address(&dest.to);
                dest.change_address = self.convert_legacy_address(&dest.change_address);
                Outputs::Destination(dest)
            }
            Outputs::List(items) => Outputs::List(
                items
                    .iter()
                    .map(|item| {
                        let mut item = item.clone();
                        item.address = self.convert_legacy_address(&item.address);
                        item
                    })
                    .collect(),
            ),
        }
    }

    pub fn process_tx_data(&self, tx_data: &TxData) -> TxData {
        TxData {
            outputs: self.process_outputs(&tx_data.outputs),
            ..tx_data.clone()
        }
    }

    pub fn generate_transaction(&self, tx_data: &TxData, signers: &[&dyn KeyProvider]) -> HawalaResult<SignedTransaction> {
        self.inner.generate_transaction(&self.process_tx_data(tx_data), signers)
    }

    pub async fn generate_transaction_async(
        &self,
        tx_data: &TxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        self.inner
            .generate_transaction_async(&self.process_tx_data(tx_data), signers)
            .await
    }

    pub fn generate_multisig_transaction(
        &self,
        tx_data: &MultisigTxData,
        signers: &[&dyn KeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        let processed = MultisigTxData {
            outputs: self.process_outputs(&tx_data.outputs),
            ..tx_data.clone()
        };
        self.inner.generate_multisig_transaction(&processed, signers)
    }

    pub async fn generate_multisig_transaction_async(
        &self,
        tx_data: &MultisigTxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        let processed = MultisigTxData {
            outputs: self.process_outputs(&tx_data.outputs),
            ..tx_data.clone()
        };
        self.inner.generate_multisig_transaction_async(&processed, signers).await
    }

    /// Litecoin has no Omni Layer deployment
    pub fn generate_omni_transaction(&self) -> HawalaResult<SignedTransaction> {
        Err(HawalaError::unsupported("omni transfers are not available on litecoin"))
    }
}
