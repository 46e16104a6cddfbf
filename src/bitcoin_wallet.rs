//! Bitcoin-family transaction builder
//!
//! Assembly is split into immutable steps on [`UtxoTxBuilder`]: each step
//! validates its intent and returns a new builder, so a failed step never
//! leaves a half-built transaction behind. The finished builder becomes a
//! PSBT, one sighash is computed per input, and every supplied signer is
//! asked (in order, one request at a time) to sign the inputs it owns.
//!
//! Supported spends:
//! - P2WPKH and wrapped P2SH-P2WPKH single-key inputs
//! - P2SH-P2WSH m-of-n multisig inputs
//! - legacy inputs that carry the full parent transaction (P2PKH parents,
//!   or P2WPKH parents)

use crate::bitcoin_script::{
    p2pkh_script, p2sh_wrap, p2wpkh_script, p2wsh_wrap, parse_multisig, push_all, single_push,
    MultisigConfig,
};
use crate::config::{NetworkParams, UtxoBuilderOptions};
use crate::error::{HawalaError, HawalaResult};
use crate::omni::generate_omni_payload;
use crate::signing::{verify_signature, AsyncKeyProvider, KeyProvider, SignerError};
use crate::types::{Chain, SignatureResult, SignedTransaction};
use crate::utils::crypto::hash160;
use crate::utxo_address::{self, address_to_script};
use crate::{log_debug, log_info, log_warn};
use bitcoin::absolute::LockTime;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::psbt::{Input as PsbtInput, Psbt};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash, Witness};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const MODULE: &str = "bitcoin_wallet";

// =============================================================================
// Transaction Intent
// =============================================================================

/// Script template used for witness-descriptor inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptType {
    #[serde(rename = "P2WPKH")]
    P2wpkh,
    #[default]
    #[serde(rename = "P2SH-P2WPKH")]
    P2shP2wpkh,
}

/// BIP-32 origin of an input key, copied into the PSBT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bip32Derivation {
    /// 4-byte fingerprint as hex
    pub master_fingerprint: String,
    pub path: String,
    pub public_key: String,
}

/// Where a single-key input's spending data comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UtxoSource {
    /// Full raw parent transaction (legacy spend)
    NonWitness { raw_tx: String },
    /// Public key plus an optional explicit output script
    Witness {
        public_key: String,
        #[serde(default)]
        script: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
    /// Parent txid in display order
    pub hash: String,
    pub index: u32,
    #[serde(default)]
    pub sequence: Option<u32>,
    pub value: u64,
    pub utxo: UtxoSource,
    #[serde(default)]
    pub bip32_derivation: Vec<Bip32Derivation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultisigSource {
    NonWitness { raw_tx: String },
    Witness {
        public_keys: Vec<String>,
        #[serde(default)]
        script: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigInput {
    pub hash: String,
    pub index: u32,
    #[serde(default)]
    pub sequence: Option<u32>,
    pub value: u64,
    pub utxo: MultisigSource,
}

/// Single-recipient payment with automatic change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub to: String,
    pub amount: u64,
    pub fee: u64,
    pub change_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputItem {
    pub address: String,
    pub value: u64,
}

/// Output intent, decided when the request is constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outputs {
    Destination(Destination),
    List(Vec<TxOutputItem>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub inputs: Vec<UtxoInput>,
    pub outputs: Outputs,
    #[serde(default)]
    pub script_type: ScriptType,
    /// Reject output lists whose implied fee reaches `max_fee`
    #[serde(default)]
    pub disable_large_fee: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigTxData {
    pub inputs: Vec<MultisigInput>,
    pub required: usize,
    pub outputs: Outputs,
}

/// Omni simple-send intent shared by the single-sig and multisig paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmniTransfer {
    pub to: String,
    pub change_address: String,
    pub fee: u64,
    pub omni_amount: u64,
    /// Defaults to the network's USDT property
    #[serde(default)]
    pub property_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmniTxData {
    pub inputs: Vec<UtxoInput>,
    #[serde(flatten)]
    pub transfer: OmniTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigOmniTxData {
    pub inputs: Vec<MultisigInput>,
    pub required: usize,
    #[serde(flatten)]
    pub transfer: OmniTransfer,
}

/// Anything that contributes value to a transaction
pub trait SpendInput {
    fn value(&self) -> u64;
}

impl SpendInput for UtxoInput {
    fn value(&self) -> u64 {
        self.value
    }
}

impl SpendInput for MultisigInput {
    fn value(&self) -> u64 {
        self.value
    }
}

/// Sum of input values; `None` on overflow
pub fn total_inputs<I: SpendInput>(inputs: &[I]) -> Option<u64> {
    inputs.iter().try_fold(0u64, |acc, input| acc.checked_add(input.value()))
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone)]
struct PreparedInput {
    outpoint: OutPoint,
    sequence: Sequence,
    psbt: PsbtInput,
}

/// Immutable transaction builder
#[derive(Debug, Clone)]
pub struct UtxoTxBuilder {
    network: NetworkParams,
    options: UtxoBuilderOptions,
    inputs: Vec<PreparedInput>,
    outputs: Vec<TxOut>,
}

impl UtxoTxBuilder {
    pub fn new(network: NetworkParams, options: UtxoBuilderOptions) -> Self {
        Self {
            network,
            options,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// Whether the inputs fund the outputs under the fee policy
    pub fn verify_economics<I: SpendInput>(&self, inputs: &[I], outputs: &Outputs, disable_large_fee: bool) -> bool {
        let Some(total) = total_inputs(inputs) else {
            return false;
        };

        match outputs {
            Outputs::Destination(dest) => dest
                .fee
                .checked_add(dest.amount)
                .map_or(false, |needed| total >= needed),
            Outputs::List(items) => {
                let Some(total_outputs) = items.iter().try_fold(0u64, |acc, o| acc.checked_add(o.value)) else {
                    return false;
                };
                match total.checked_sub(total_outputs) {
                    Some(fee) => !disable_large_fee || fee < self.options.max_fee,
                    None => false,
                }
            }
        }
    }

    /// Whether the inputs cover the recipient's dust output plus the fee
    pub fn verify_omni<I: SpendInput>(&self, inputs: &[I], fee: u64) -> bool {
        match (total_inputs(inputs), self.options.dust_amount.checked_add(fee)) {
            (Some(total), Some(needed)) => total >= needed,
            _ => false,
        }
    }

    pub fn add_inputs(&self, tx_data: &TxData) -> HawalaResult<Self> {
        if !self.verify_economics(&tx_data.inputs, &tx_data.outputs, tx_data.disable_large_fee) {
            return Err(insufficient_inputs(&tx_data.inputs));
        }

        let prepared = tx_data
            .inputs
            .iter()
            .map(|input| self.prepare_input(input, tx_data.script_type))
            .collect::<HawalaResult<Vec<_>>>()?;

        log_debug!(MODULE, "Inputs added", count = prepared.len(), script_type = format!("{:?}", tx_data.script_type));
        Ok(self.with_inputs(prepared))
    }

    pub fn add_multisig_inputs(&self, tx_data: &MultisigTxData) -> HawalaResult<Self> {
        if !self.verify_economics(&tx_data.inputs, &tx_data.outputs, false) {
            return Err(insufficient_inputs(&tx_data.inputs));
        }
        self.push_multisig_inputs(&tx_data.inputs, tx_data.required)
    }

    /// Single-sig Omni inputs are no longer supported; use the multisig path
    pub fn add_omni_inputs(&self, _tx_data: &OmniTxData) -> HawalaResult<Self> {
        Err(HawalaError::unsupported("single-sig omni inputs are deprecated"))
    }

    pub fn add_omni_multisig_inputs(&self, tx_data: &MultisigOmniTxData) -> HawalaResult<Self> {
        if !self.verify_omni(&tx_data.inputs, tx_data.transfer.fee) {
            return Err(insufficient_inputs(&tx_data.inputs));
        }
        self.push_multisig_inputs(&tx_data.inputs, tx_data.required)
    }

    pub fn add_outputs<I: SpendInput>(&self, inputs: &[I], outputs: &Outputs) -> HawalaResult<Self> {
        let mut added = Vec::new();

        match outputs {
            Outputs::Destination(dest) => {
                let change = total_inputs(inputs)
                    .and_then(|total| total.checked_sub(dest.amount))
                    .and_then(|rest| rest.checked_sub(dest.fee))
                    .ok_or_else(|| insufficient_inputs(inputs))?;

                added.push(self.output(&dest.to, dest.amount)?);
                // No dust floor on plain-payment change
                if change > 0 {
                    added.push(self.output(&dest.change_address, change)?);
                }
            }
            Outputs::List(items) => {
                for item in items {
                    added.push(self.output(&item.address, item.value)?);
                }
            }
        }

        log_debug!(MODULE, "Outputs added", count = added.len());
        Ok(self.with_outputs(added))
    }

    /// Emit `[change?, OP_RETURN payload, recipient]`
    pub fn add_omni_outputs<I: SpendInput>(&self, inputs: &[I], transfer: &OmniTransfer) -> HawalaResult<Self> {
        let dust = self.options.dust_amount;
        let change = total_inputs(inputs)
            .zip(dust.checked_add(transfer.fee))
            .and_then(|(total, reserved)| total.checked_sub(reserved))
            .ok_or_else(|| insufficient_inputs(inputs))?;

        let mut added = Vec::new();
        if change > dust {
            added.push(self.output(&transfer.change_address, change)?);
        }

        let property_id = transfer
            .property_id
            .unwrap_or_else(|| self.network.usdt_property_id());
        added.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: generate_omni_payload(transfer.omni_amount, property_id)?,
        });
        added.push(self.output(&transfer.to, dust)?);

        log_debug!(
            MODULE,
            "Omni outputs added",
            property_id = property_id,
            omni_amount = transfer.omni_amount,
            count = added.len()
        );
        Ok(self.with_outputs(added))
    }

    /// Unsigned version-2 transaction with all input metadata attached
    pub fn build_psbt(&self) -> HawalaResult<Psbt> {
        if self.inputs.is_empty() {
            return Err(HawalaError::invalid_input("transaction has no inputs"));
        }
        if self.outputs.is_empty() {
            return Err(HawalaError::invalid_input("transaction has no outputs"));
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: input.sequence,
                    witness: Witness::default(),
                })
                .collect(),
            output: self.outputs.clone(),
        };

        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        for (slot, prepared) in psbt.inputs.iter_mut().zip(&self.inputs) {
            *slot = prepared.psbt.clone();
        }
        Ok(psbt)
    }

    fn with_inputs(&self, prepared: Vec<PreparedInput>) -> Self {
        let mut next = self.clone();
        next.inputs.extend(prepared);
        next
    }

    fn with_outputs(&self, added: Vec<TxOut>) -> Self {
        let mut next = self.clone();
        next.outputs.extend(added);
        next
    }

    fn output(&self, address: &str, value: u64) -> HawalaResult<TxOut> {
        Ok(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: address_to_script(address, &self.network)?,
        })
    }

    fn prepare_input(&self, input: &UtxoInput, script_type: ScriptType) -> HawalaResult<PreparedInput> {
        let outpoint = parse_outpoint(&input.hash, input.index)?;
        let sequence = Sequence(input.sequence.unwrap_or(self.options.default_sequence));

        let mut psbt = PsbtInput::default();
        match &input.utxo {
            UtxoSource::NonWitness { raw_tx } => {
                psbt.non_witness_utxo = Some(decode_parent(raw_tx, &outpoint, input.value)?);
            }
            UtxoSource::Witness { public_key, script } => {
                let p2wpkh = p2wpkh_script(public_key)?;
                match script_type {
                    // Any explicit script is ignored for native segwit
                    ScriptType::P2wpkh => {
                        psbt.witness_utxo = Some(TxOut {
                            value: Amount::from_sat(input.value),
                            script_pubkey: p2wpkh,
                        });
                    }
                    ScriptType::P2shP2wpkh => {
                        let script_pubkey = match script {
                            Some(explicit) => parse_script(explicit)?,
                            None => p2sh_wrap(&p2wpkh),
                        };
                        psbt.witness_utxo = Some(TxOut {
                            value: Amount::from_sat(input.value),
                            script_pubkey,
                        });
                        psbt.redeem_script = Some(p2wpkh);
                    }
                }
            }
        }

        for derivation in &input.bip32_derivation {
            let (key, source) = parse_derivation(derivation)?;
            psbt.bip32_derivation.insert(key, source);
        }

        Ok(PreparedInput {
            outpoint,
            sequence,
            psbt,
        })
    }

    fn push_multisig_inputs(&self, inputs: &[MultisigInput], required: usize) -> HawalaResult<Self> {
        let prepared = inputs
            .iter()
            .map(|input| prepare_multisig_input(input, required))
            .collect::<HawalaResult<Vec<_>>>()?;

        log_debug!(MODULE, "Multisig inputs added", count = prepared.len(), required = required);
        Ok(self.with_inputs(prepared))
    }
}

fn prepare_multisig_input(input: &MultisigInput, required: usize) -> HawalaResult<PreparedInput> {
    let outpoint = parse_outpoint(&input.hash, input.index)?;
    let sequence = input.sequence.map(Sequence).unwrap_or(Sequence::MAX);

    let mut psbt = PsbtInput::default();
    match &input.utxo {
        MultisigSource::NonWitness { raw_tx } => {
            psbt.non_witness_utxo = Some(decode_parent(raw_tx, &outpoint, input.value)?);
        }
        MultisigSource::Witness { public_keys, script } => {
            let config = MultisigConfig::new(required, public_keys.clone())?;
            let witness_script = config.witness_script()?;
            let redeem_script = p2wsh_wrap(&witness_script);
            let script_pubkey = match script {
                Some(explicit) => parse_script(explicit)?,
                None => p2sh_wrap(&redeem_script),
            };

            psbt.witness_utxo = Some(TxOut {
                value: Amount::from_sat(input.value),
                script_pubkey,
            });
            psbt.witness_script = Some(witness_script);
            psbt.redeem_script = Some(redeem_script);
        }
    }

    Ok(PreparedInput {
        outpoint,
        sequence,
        psbt,
    })
}

fn insufficient_inputs<I: SpendInput>(inputs: &[I]) -> HawalaError {
    let total = total_inputs(inputs).map_or_else(|| "overflow".to_string(), |t| t.to_string());
    HawalaError::invalid_input("input values do not cover outputs and fee")
        .with_details(format!("total_inputs={}", total))
}

fn parse_outpoint(hash: &str, index: u32) -> HawalaResult<OutPoint> {
    let txid = Txid::from_str(hash)
        .map_err(|e| HawalaError::invalid_input(format!("invalid input hash {}: {}", hash, e)))?;
    Ok(OutPoint::new(txid, index))
}

fn parse_script(script_hex: &str) -> HawalaResult<ScriptBuf> {
    Ok(ScriptBuf::from_bytes(hex::decode(script_hex)?))
}

/// Decode a raw parent and check it is the transaction the outpoint names
fn decode_parent(raw_tx: &str, outpoint: &OutPoint, value: u64) -> HawalaResult<Transaction> {
    let parent: Transaction = encode::deserialize(&hex::decode(raw_tx)?)?;

    if parent.compute_txid() != outpoint.txid {
        return Err(HawalaError::invalid_input("parent transaction does not match input hash")
            .with_details(format!("expected {}, got {}", outpoint.txid, parent.compute_txid())));
    }

    let spent = parent
        .output
        .get(outpoint.vout as usize)
        .ok_or_else(|| HawalaError::invalid_input(format!("parent has no output {}", outpoint.vout)))?;
    if spent.value.to_sat() != value {
        return Err(HawalaError::invalid_input(format!(
            "input value {} does not match parent output value {}",
            value,
            spent.value.to_sat()
        )));
    }

    Ok(parent)
}

fn parse_derivation(
    derivation: &Bip32Derivation,
) -> HawalaResult<(secp256k1::PublicKey, (Fingerprint, DerivationPath))> {
    let fingerprint: [u8; 4] = hex::decode(&derivation.master_fingerprint)?
        .try_into()
        .map_err(|_| HawalaError::invalid_input("master fingerprint must be 4 bytes"))?;
    let path = DerivationPath::from_str(&derivation.path)
        .map_err(|e| HawalaError::invalid_input(format!("invalid derivation path: {}", e)))?;
    let key = secp256k1::PublicKey::from_slice(&hex::decode(&derivation.public_key)?)
        .map_err(|e| HawalaError::invalid_input(format!("invalid derivation public key: {}", e)))?;

    Ok((key, (Fingerprint::from(fingerprint), path)))
}

// =============================================================================
// Signing
// =============================================================================

/// How an input is spent, read back from its PSBT fields
#[derive(Debug, Clone)]
enum SpendPath {
    P2wpkh { script_pubkey: ScriptBuf, value: Amount },
    P2shP2wpkh { redeem_script: ScriptBuf, value: Amount },
    P2shP2wshMultisig { witness_script: ScriptBuf, value: Amount },
    P2pkh { script_pubkey: ScriptBuf },
}

impl SpendPath {
    fn of(psbt: &Psbt, index: usize) -> HawalaResult<Self> {
        let input = &psbt.inputs[index];

        if let Some(utxo) = &input.witness_utxo {
            let value = utxo.value;
            if let Some(witness_script) = &input.witness_script {
                return Ok(SpendPath::P2shP2wshMultisig {
                    witness_script: witness_script.clone(),
                    value,
                });
            }
            if let Some(redeem_script) = &input.redeem_script {
                return Ok(SpendPath::P2shP2wpkh {
                    redeem_script: redeem_script.clone(),
                    value,
                });
            }
            return Ok(SpendPath::P2wpkh {
                script_pubkey: utxo.script_pubkey.clone(),
                value,
            });
        }

        let parent = input
            .non_witness_utxo
            .as_ref()
            .ok_or_else(|| HawalaError::internal(format!("input {} has no utxo data", index)))?;
        let vout = psbt.unsigned_tx.input[index].previous_output.vout as usize;
        let spent = parent
            .output
            .get(vout)
            .ok_or_else(|| HawalaError::invalid_input(format!("parent has no output {}", vout)))?;

        if spent.script_pubkey.is_p2pkh() {
            Ok(SpendPath::P2pkh {
                script_pubkey: spent.script_pubkey.clone(),
            })
        } else if spent.script_pubkey.is_p2wpkh() {
            Ok(SpendPath::P2wpkh {
                script_pubkey: spent.script_pubkey.clone(),
                value: spent.value,
            })
        } else {
            Err(HawalaError::unsupported(format!(
                "input {} spends a parent output script that cannot be signed",
                index
            )))
        }
    }

    fn digest(&self, cache: &mut SighashCache<&Transaction>, index: usize) -> HawalaResult<[u8; 32]> {
        let sighash_err = |e: &dyn std::fmt::Display| HawalaError::signing_failed(format!("sighash for input {}: {}", index, e));

        let digest = match self {
            SpendPath::P2wpkh { script_pubkey, value } => cache
                .p2wpkh_signature_hash(index, script_pubkey, *value, EcdsaSighashType::All)
                .map_err(|e| sighash_err(&e))?
                .to_byte_array(),
            SpendPath::P2shP2wpkh { redeem_script, value } => cache
                .p2wpkh_signature_hash(index, redeem_script, *value, EcdsaSighashType::All)
                .map_err(|e| sighash_err(&e))?
                .to_byte_array(),
            SpendPath::P2shP2wshMultisig { witness_script, value } => cache
                .p2wsh_signature_hash(index, witness_script, *value, EcdsaSighashType::All)
                .map_err(|e| sighash_err(&e))?
                .to_byte_array(),
            SpendPath::P2pkh { script_pubkey } => cache
                .legacy_signature_hash(index, script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(|e| sighash_err(&e))?
                .to_byte_array(),
        };
        Ok(digest)
    }

    /// The key as the locking script commits to it, if `public_key` can
    /// spend this input
    fn spend_key(&self, public_key: &secp256k1::PublicKey) -> Option<bitcoin::PublicKey> {
        let compressed = bitcoin::PublicKey::new(*public_key);
        let p2wpkh = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash160(&compressed.to_bytes())));

        match self {
            SpendPath::P2wpkh { script_pubkey, .. } => (*script_pubkey == p2wpkh).then_some(compressed),
            SpendPath::P2shP2wpkh { redeem_script, .. } => (*redeem_script == p2wpkh).then_some(compressed),
            SpendPath::P2pkh { script_pubkey } => {
                let uncompressed = bitcoin::PublicKey::new_uncompressed(*public_key);
                [compressed, uncompressed]
                    .into_iter()
                    .find(|key| *script_pubkey == p2pkh_script(&key.to_bytes()))
            }
            SpendPath::P2shP2wshMultisig { witness_script, .. } => parse_multisig(witness_script)?
                .1
                .iter()
                .filter_map(|k| bitcoin::PublicKey::from_slice(k).ok())
                .find(|k| k.inner == *public_key),
        }
    }
}

/// Spend paths and sighash digests of every input
struct SigningPlan {
    paths: Vec<SpendPath>,
    digests: Vec<[u8; 32]>,
}

impl SigningPlan {
    fn new(psbt: &Psbt) -> HawalaResult<Self> {
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let mut paths = Vec::with_capacity(psbt.inputs.len());
        let mut digests = Vec::with_capacity(psbt.inputs.len());

        for index in 0..psbt.inputs.len() {
            let path = SpendPath::of(psbt, index)?;
            digests.push(path.digest(&mut cache, index)?);
            paths.push(path);
        }

        Ok(Self { paths, digests })
    }

    /// Inputs `public_key` can sign, with the key form each one expects
    fn owned_by(&self, public_key: &secp256k1::PublicKey) -> Vec<(usize, bitcoin::PublicKey)> {
        self.paths
            .iter()
            .enumerate()
            .filter_map(|(index, path)| path.spend_key(public_key).map(|key| (index, key)))
            .collect()
    }
}

fn signer_key(public_key_hex: &str) -> HawalaResult<secp256k1::PublicKey> {
    secp256k1::PublicKey::from_slice(&hex::decode(public_key_hex)?)
        .map_err(|e| HawalaError::signing_failed(format!("signer exposes an invalid public key: {}", e)))
}

fn signer_failure(index: usize, error: SignerError) -> HawalaError {
    log_warn!(MODULE, "Signing provider failed", input = index, error = error);
    error.into()
}

/// Verify a provider signature and record it as a partial signature
fn attach_signature(
    psbt: &mut Psbt,
    index: usize,
    public_key: bitcoin::PublicKey,
    digest: &[u8; 32],
    signature: &SignatureResult,
) -> HawalaResult<()> {
    if !verify_signature(digest, signature, &public_key.inner) {
        return Err(HawalaError::signing_failed(format!(
            "signature for input {} does not verify against the signer's key",
            index
        )));
    }

    let mut normalized = secp256k1::ecdsa::Signature::from_compact(&signature.compact_bytes()?)?;
    normalized.normalize_s();

    psbt.inputs[index].partial_sigs.insert(
        public_key,
        bitcoin::ecdsa::Signature {
            signature: normalized,
            sighash_type: EcdsaSighashType::All,
        },
    );
    log_debug!(MODULE, "Signature attached", input = index);
    Ok(())
}

fn finalize_input(psbt: &mut Psbt, index: usize, path: &SpendPath) -> HawalaResult<()> {
    let input = &mut psbt.inputs[index];
    let unsigned = || HawalaError::signing_failed(format!("input {} was not signed by any supplied signer", index));

    match path {
        SpendPath::P2wpkh { .. } | SpendPath::P2shP2wpkh { .. } => {
            let (key, sig) = input.partial_sigs.iter().next().ok_or_else(unsigned)?;
            let mut witness = Witness::new();
            witness.push(sig.to_vec());
            witness.push(key.to_bytes());

            if let SpendPath::P2shP2wpkh { redeem_script, .. } = path {
                input.final_script_sig = Some(single_push(redeem_script.as_bytes())?);
            }
            input.final_script_witness = Some(witness);
        }
        SpendPath::P2shP2wshMultisig { witness_script, .. } => {
            let (required, keys) = parse_multisig(witness_script)
                .ok_or_else(|| HawalaError::internal("witness script is not a multisig script"))?;

            // CHECKMULTISIG consumes signatures in script key order
            let sigs: Vec<Vec<u8>> = keys
                .iter()
                .filter_map(|key| bitcoin::PublicKey::from_slice(key).ok())
                .filter_map(|key| input.partial_sigs.get(&key).map(|sig| sig.to_vec()))
                .take(required)
                .collect();
            if sigs.len() < required {
                return Err(HawalaError::signing_failed(format!(
                    "input {} has {} of {} required signatures",
                    index,
                    sigs.len(),
                    required
                )));
            }

            let mut witness = Witness::new();
            witness.push(Vec::new());
            for sig in sigs {
                witness.push(sig);
            }
            witness.push(witness_script.as_bytes());

            let redeem_script = input
                .redeem_script
                .clone()
                .unwrap_or_else(|| p2wsh_wrap(witness_script));
            input.final_script_sig = Some(single_push(redeem_script.as_bytes())?);
            input.final_script_witness = Some(witness);
        }
        SpendPath::P2pkh { .. } => {
            let (key, sig) = input.partial_sigs.iter().next().ok_or_else(unsigned)?;
            input.final_script_sig = Some(push_all(&[sig.to_vec().as_slice(), key.to_bytes().as_slice()])?);
        }
    }

    input.partial_sigs.clear();
    Ok(())
}

fn finalize_and_extract(mut psbt: Psbt, plan: &SigningPlan, chain: Chain) -> HawalaResult<SignedTransaction> {
    for (index, path) in plan.paths.iter().enumerate() {
        finalize_input(&mut psbt, index, path)?;
    }

    let tx = psbt.extract_tx_unchecked_fee_rate();
    let signed = SignedTransaction {
        chain,
        raw_tx: encode::serialize_hex(&tx),
        txid: tx.compute_txid().to_string(),
    };

    log_info!(
        MODULE,
        "Transaction signed",
        chain = chain.symbol(),
        inputs = tx.input.len(),
        outputs = tx.output.len(),
        txid = signed.txid
    );
    Ok(signed)
}

/// Sign every input with the providers that own it, then finalize
pub fn sign_psbt(psbt: Psbt, signers: &[&dyn KeyProvider], chain: Chain) -> HawalaResult<SignedTransaction> {
    let plan = SigningPlan::new(&psbt)?;
    let mut psbt = psbt;

    for signer in signers {
        let public_key = signer_key(signer.public_key())?;
        for (index, spend_key) in plan.owned_by(&public_key) {
            let digest_hex = hex::encode(plan.digests[index]);
            log_debug!(MODULE, "Requesting signature", input = index, digest = digest_hex);

            let signature = signer.sign(&digest_hex).map_err(|e| signer_failure(index, e))?;
            attach_signature(&mut psbt, index, spend_key, &plan.digests[index], &signature)?;
        }
    }

    finalize_and_extract(psbt, &plan, chain)
}

/// Suspending variant of [`sign_psbt`]; requests are awaited one at a time
pub async fn sign_psbt_async(
    psbt: Psbt,
    signers: &[&dyn AsyncKeyProvider],
    chain: Chain,
) -> HawalaResult<SignedTransaction> {
    let plan = SigningPlan::new(&psbt)?;
    let mut psbt = psbt;

    for signer in signers {
        let public_key = signer_key(signer.public_key())?;
        for (index, spend_key) in plan.owned_by(&public_key) {
            let digest_hex = hex::encode(plan.digests[index]);
            log_debug!(MODULE, "Requesting signature", input = index, digest = digest_hex);

            let signature = signer.sign(&digest_hex).await.map_err(|e| signer_failure(index, e))?;
            attach_signature(&mut psbt, index, spend_key, &plan.digests[index], &signature)?;
        }
    }

    finalize_and_extract(psbt, &plan, chain)
}

// =============================================================================
// Wallet
// =============================================================================

/// Bitcoin-family wallet bound to one network
#[derive(Debug, Clone)]
pub struct BitcoinWallet {
    chain: Chain,
    network: NetworkParams,
    options: UtxoBuilderOptions,
}

impl BitcoinWallet {
    /// Wallet for any network described by `network`, reported as `chain`
    pub fn with_network(chain: Chain, network: NetworkParams) -> Self {
        Self {
            chain,
            network,
            options: UtxoBuilderOptions::default(),
        }
    }

    pub fn new(chain: Chain) -> HawalaResult<Self> {
        let network = match chain {
            Chain::Bitcoin => NetworkParams::bitcoin(),
            Chain::BitcoinTestnet => NetworkParams::bitcoin_testnet(),
            Chain::Litecoin => NetworkParams::litecoin(),
            other => {
                return Err(HawalaError::unsupported(format!(
                    "{} is not a UTXO chain",
                    other.symbol()
                )))
            }
        };
        Ok(Self::with_network(chain, network))
    }

    pub fn mainnet() -> Self {
        Self::with_network(Chain::Bitcoin, NetworkParams::bitcoin())
    }

    pub fn testnet() -> Self {
        Self::with_network(Chain::BitcoinTestnet, NetworkParams::bitcoin_testnet())
    }

    pub fn with_options(mut self, options: UtxoBuilderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn builder(&self) -> UtxoTxBuilder {
        UtxoTxBuilder::new(self.network.clone(), self.options)
    }

    /// Address of a compressed public key under the given template
    pub fn generate_address(&self, public_key_hex: &str, script_type: ScriptType) -> HawalaResult<String> {
        match script_type {
            ScriptType::P2wpkh => utxo_address::p2wpkh_address(public_key_hex, &self.network),
            ScriptType::P2shP2wpkh => utxo_address::p2sh_p2wpkh_address(public_key_hex, &self.network),
        }
    }

    pub fn is_address_valid(&self, address: &str) -> bool {
        utxo_address::is_address_valid(address, &self.network)
    }

    pub fn build_transaction_psbt(&self, tx_data: &TxData) -> HawalaResult<Psbt> {
        self.builder()
            .add_inputs(tx_data)?
            .add_outputs(&tx_data.inputs, &tx_data.outputs)?
            .build_psbt()
    }

    pub fn build_omni_psbt(&self, tx_data: &OmniTxData) -> HawalaResult<Psbt> {
        self.builder()
            .add_omni_inputs(tx_data)?
            .add_omni_outputs(&tx_data.inputs, &tx_data.transfer)?
            .build_psbt()
    }

    pub fn build_multisig_psbt(&self, tx_data: &MultisigTxData) -> HawalaResult<Psbt> {
        self.builder()
            .add_multisig_inputs(tx_data)?
            .add_outputs(&tx_data.inputs, &tx_data.outputs)?
            .build_psbt()
    }

    pub fn build_multisig_omni_psbt(&self, tx_data: &MultisigOmniTxData) -> HawalaResult<Psbt> {
        self.builder()
            .add_omni_multisig_inputs(tx_data)?
            .add_omni_outputs(&tx_data.inputs, &tx_data.transfer)?
            .build_psbt()
    }

    pub fn generate_transaction(&self, tx_data: &TxData, signers: &[&dyn KeyProvider]) -> HawalaResult<SignedTransaction> {
        sign_psbt(self.build_transaction_psbt(tx_data)?, signers, self.chain)
    }

    pub async fn generate_transaction_async(
        &self,
        tx_data: &TxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt_async(self.build_transaction_psbt(tx_data)?, signers, self.chain).await
    }

    pub fn generate_omni_transaction(
        &self,
        tx_data: &OmniTxData,
        signers: &[&dyn KeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt(self.build_omni_psbt(tx_data)?, signers, self.chain)
    }

    pub async fn generate_omni_transaction_async(
        &self,
        tx_data: &OmniTxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt_async(self.build_omni_psbt(tx_data)?, signers, self.chain).await
    }

    pub fn generate_multisig_transaction(
        &self,
        tx_data: &MultisigTxData,
        signers: &[&dyn KeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt(self.build_multisig_psbt(tx_data)?, signers, self.chain)
    }

    pub async fn generate_multisig_transaction_async(
        &self,
        tx_data: &MultisigTxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt_async(self.build_multisig_psbt(tx_data)?, signers, self.chain).await
    }

    pub fn generate_multisig_omni_transaction(
        &self,
        tx_data: &MultisigOmniTxData,
        signers: &[&dyn KeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt(self.build_multisig_omni_psbt(tx_data)?, signers, self.chain)
    }

    pub async fn generate_multisig_omni_transaction_async(
        &self,
        tx_data: &MultisigOmniTxData,
        signers: &[&dyn AsyncKeyProvider],
    ) -> HawalaResult<SignedTransaction> {
        sign_psbt_async(self.build_multisig_omni_psbt(tx_data)?, signers, self.chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::omni::decode_omni_script;
    use crate::signing::PrivateKeySigner;
    use secp256k1::{Message, Secp256k1};

    const TXID: &str = "a4b4a0b5c8f1d8e0f2a6c7b8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8";

    fn signer(byte: u8) -> PrivateKeySigner {
        PrivateKeySigner::from_hex(&format!("{:02x}", byte).repeat(32)).unwrap()
    }

    fn pubkey(signer: &PrivateKeySigner) -> String {
        KeyProvider::public_key(signer).to_string()
    }

    fn address_of(signer: &PrivateKeySigner) -> String {
        utxo_address::p2wpkh_address(&pubkey(signer), &NetworkParams::bitcoin()).unwrap()
    }

    fn witness_input(public_key: &str, value: u64, index: u32) -> UtxoInput {
        UtxoInput {
            hash: TXID.to_string(),
            index,
            sequence: None,
            value,
            utxo: UtxoSource::Witness {
                public_key: public_key.to_string(),
                script: None,
            },
            bip32_derivation: vec![],
        }
    }

    fn destination(to: &str, change: &str, amount: u64, fee: u64) -> Outputs {
        Outputs::Destination(Destination {
            to: to.to_string(),
            amount,
            fee,
            change_address: change.to_string(),
        })
    }

    #[test]
    fn test_verify_economics_destination() {
        let builder = BitcoinWallet::mainnet().builder();
        let inputs = vec![witness_input(&pubkey(&signer(1)), 100_000, 0)];
        let to = address_of(&signer(2));

        assert!(builder.verify_economics(&inputs, &destination(&to, &to, 99_000, 1_000), false));
        assert!(!builder.verify_economics(&inputs, &destination(&to, &to, 99_001, 1_000), false));
    }

    #[test]
    fn test_verify_economics_output_list() {
        let builder = BitcoinWallet::mainnet().builder();
        let inputs = vec![witness_input(&pubkey(&signer(1)), 2_000_000, 0)];
        let to = address_of(&signer(2));
        let list = |value| {
            Outputs::List(vec![TxOutputItem {
                address: to.clone(),
                value,
            }])
        };

        assert!(builder.verify_economics(&inputs, &list(2_000_000), true));
        assert!(!builder.verify_economics(&inputs, &list(2_000_001), false));
        // fee of exactly 1_000_000 is rejected only when large fees are disabled
        assert!(builder.verify_economics(&inputs, &list(1_000_000), false));
        assert!(!builder.verify_economics(&inputs, &list(1_000_000), true));
        assert!(builder.verify_economics(&inputs, &list(1_000_001), true));
    }

    #[test]
    fn test_change_emitted_when_positive() {
        let wallet = BitcoinWallet::mainnet();
        let to = address_of(&signer(2));
        let change = address_of(&signer(3));
        let tx_data = TxData {
            inputs: vec![witness_input(&pubkey(&signer(1)), 100_000, 0)],
            outputs: destination(&to, &change, 50_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };

        let builder = wallet
            .builder()
            .add_inputs(&tx_data)
            .unwrap()
            .add_outputs(&tx_data.inputs, &tx_data.outputs)
            .unwrap();
        let outputs = builder.outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].value.to_sat(), 50_000);
        assert_eq!(outputs[0].script_pubkey, address_to_script(&to, wallet.network()).unwrap());
        assert_eq!(outputs[1].value.to_sat(), 49_000);
        assert_eq!(outputs[1].script_pubkey, address_to_script(&change, wallet.network()).unwrap());
    }

    #[test]
    fn test_no_change_when_exact() {
        let wallet = BitcoinWallet::mainnet();
        let to = address_of(&signer(2));
        let inputs = vec![witness_input(&pubkey(&signer(1)), 100_000, 0)];

        let builder = wallet
            .builder()
            .add_outputs(&inputs, &destination(&to, &to, 99_500, 500))
            .unwrap();
        assert_eq!(builder.outputs().len(), 1);
        assert_eq!(builder.outputs()[0].value.to_sat(), 99_500);
    }

    #[test]
    fn test_insufficient_inputs_rejected_before_mutation() {
        let wallet = BitcoinWallet::mainnet();
        let to = address_of(&signer(2));
        let tx_data = TxData {
            inputs: vec![witness_input(&pubkey(&signer(1)), 1_000, 0)],
            outputs: destination(&to, &to, 1_000, 1),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };

        let builder = wallet.builder();
        let err = builder.add_inputs(&tx_data).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(builder.input_count(), 0);
        assert!(wallet.generate_transaction(&tx_data, &[&signer(1)]).is_err());
    }

    #[test]
    fn test_input_scripts_and_sequence() {
        let wallet = BitcoinWallet::mainnet();
        let key = pubkey(&signer(1));
        let to = address_of(&signer(2));
        let explicit = "a914000000000000000000000000000000000000000087";

        let mut wrapped = witness_input(&key, 50_000, 0);
        wrapped.utxo = UtxoSource::Witness {
            public_key: key.clone(),
            script: Some(explicit.to_string()),
        };
        let mut zero_sequence = witness_input(&key, 50_000, 1);
        zero_sequence.sequence = Some(0);

        let tx_data = TxData {
            inputs: vec![wrapped.clone(), zero_sequence],
            outputs: destination(&to, &to, 90_000, 1_000),
            script_type: ScriptType::P2shP2wpkh,
            disable_large_fee: false,
        };
        let psbt = wallet.build_transaction_psbt(&tx_data).unwrap();

        assert_eq!(psbt.unsigned_tx.input[0].sequence, Sequence(0xFFFF_FFFD));
        assert_eq!(psbt.unsigned_tx.input[1].sequence, Sequence(0));
        assert_eq!(psbt.unsigned_tx.version, Version::TWO);

        let first = &psbt.inputs[0];
        assert_eq!(hex::encode(first.witness_utxo.as_ref().unwrap().script_pubkey.as_bytes()), explicit);
        assert_eq!(first.redeem_script.as_ref().unwrap(), &p2wpkh_script(&key).unwrap());
        let second = &psbt.inputs[1];
        assert_eq!(
            second.witness_utxo.as_ref().unwrap().script_pubkey,
            crate::bitcoin_script::calculate_script(&key).unwrap()
        );

        // Native segwit ignores the explicit script
        let native = TxData {
            inputs: vec![wrapped],
            outputs: destination(&to, &to, 40_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };
        let psbt = wallet.build_transaction_psbt(&native).unwrap();
        assert!(psbt.inputs[0].witness_utxo.as_ref().unwrap().script_pubkey.is_p2wpkh());
        assert!(psbt.inputs[0].redeem_script.is_none());
    }

    #[test]
    fn test_bip32_derivation_copied() {
        let wallet = BitcoinWallet::mainnet();
        let key = pubkey(&signer(1));
        let to = address_of(&signer(2));
        let mut input = witness_input(&key, 50_000, 0);
        input.bip32_derivation = vec![Bip32Derivation {
            master_fingerprint: "d34db33f".to_string(),
            path: "m/84'/0'/0'/0/0".to_string(),
            public_key: key.clone(),
        }];

        let tx_data = TxData {
            inputs: vec![input],
            outputs: destination(&to, &to, 40_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };
        let psbt = wallet.build_transaction_psbt(&tx_data).unwrap();
        let (_, (fingerprint, path)) = psbt.inputs[0].bip32_derivation.iter().next().unwrap();
        assert_eq!(fingerprint.to_string(), "d34db33f");
        assert_eq!(path, &DerivationPath::from_str("m/84'/0'/0'/0/0").unwrap());
    }

    #[test]
    fn test_sign_p2wpkh_end_to_end() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let to = address_of(&signer(2));
        let tx_data = TxData {
            inputs: vec![witness_input(&pubkey(&owner), 100_000, 0)],
            outputs: destination(&to, &address_of(&owner), 50_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };

        let signed = wallet.generate_transaction(&tx_data, &[&owner]).unwrap();
        assert_eq!(signed.chain, Chain::Bitcoin);

        let tx: Transaction = encode::deserialize(&hex::decode(&signed.raw_tx).unwrap()).unwrap();
        assert_eq!(tx.compute_txid().to_string(), signed.txid);
        assert_eq!(tx.input[0].witness.len(), 2);
        assert!(tx.input[0].script_sig.is_empty());

        let script_pubkey = p2wpkh_script(&pubkey(&owner)).unwrap();
        let sighash = SighashCache::new(&tx)
            .p2wpkh_signature_hash(0, &script_pubkey, Amount::from_sat(100_000), EcdsaSighashType::All)
            .unwrap();
        let sig = bitcoin::ecdsa::Signature::from_slice(&tx.input[0].witness.to_vec()[0]).unwrap();
        let key = secp256k1::PublicKey::from_slice(&tx.input[0].witness.to_vec()[1]).unwrap();
        assert!(Secp256k1::verification_only()
            .verify_ecdsa(&Message::from_digest(sighash.to_byte_array()), &sig.signature, &key)
            .is_ok());
    }

    #[test]
    fn test_sign_wrapped_segwit_sets_script_sig() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let to = address_of(&signer(2));
        let tx_data = TxData {
            inputs: vec![witness_input(&pubkey(&owner), 100_000, 0)],
            outputs: destination(&to, &to, 50_000, 1_000),
            script_type: ScriptType::P2shP2wpkh,
            disable_large_fee: false,
        };

        let signed = wallet.generate_transaction(&tx_data, &[&owner]).unwrap();
        let tx: Transaction = encode::deserialize(&hex::decode(&signed.raw_tx).unwrap()).unwrap();
        let redeem = p2wpkh_script(&pubkey(&owner)).unwrap();

        let mut expected = vec![0x16];
        expected.extend_from_slice(redeem.as_bytes());
        assert_eq!(tx.input[0].script_sig.as_bytes(), expected.as_slice());
        assert_eq!(tx.input[0].witness.len(), 2);
    }

    #[test]
    fn test_unowned_input_fails_to_finalize() {
        let wallet = BitcoinWallet::mainnet();
        let to = address_of(&signer(2));
        let tx_data = TxData {
            inputs: vec![witness_input(&pubkey(&signer(1)), 100_000, 0)],
            outputs: destination(&to, &to, 50_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };

        let err = wallet.generate_transaction(&tx_data, &[&signer(9)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningFailed);
    }

    fn p2pkh_parent(owner: &PrivateKeySigner, value: u64) -> Transaction {
        p2pkh_parent_for_key(&hex::decode(pubkey(owner)).unwrap(), value)
    }

    fn p2pkh_parent_for_key(key: &[u8], value: u64) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_str(TXID).unwrap(), 7),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: p2pkh_script(key),
            }],
        }
    }

    #[test]
    fn test_sign_non_witness_p2pkh() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let parent = p2pkh_parent(&owner, 80_000);
        let to = address_of(&signer(2));

        let tx_data = TxData {
            inputs: vec![UtxoInput {
                hash: parent.compute_txid().to_string(),
                index: 0,
                sequence: None,
                value: 80_000,
                utxo: UtxoSource::NonWitness {
                    raw_tx: encode::serialize_hex(&parent),
                },
                bip32_derivation: vec![],
            }],
            outputs: destination(&to, &to, 70_000, 1_000),
            script_type: ScriptType::default(),
            disable_large_fee: false,
        };

        let signed = wallet.generate_transaction(&tx_data, &[&owner]).unwrap();
        let tx: Transaction = encode::deserialize(&hex::decode(&signed.raw_tx).unwrap()).unwrap();
        assert!(tx.input[0].witness.is_empty());
        assert_eq!(tx.input[0].script_sig.instructions().count(), 2);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].value.to_sat(), 9_000);
    }

    #[test]
    fn test_sign_p2pkh_locked_to_uncompressed_key() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let uncompressed = hex::decode(owner.public_key_uncompressed().unwrap()).unwrap();
        let parent = p2pkh_parent_for_key(&uncompressed, 80_000);
        let to = address_of(&signer(2));

        let tx_data = TxData {
            inputs: vec![UtxoInput {
                hash: parent.compute_txid().to_string(),
                index: 0,
                sequence: None,
                value: 80_000,
                utxo: UtxoSource::NonWitness {
                    raw_tx: encode::serialize_hex(&parent),
                },
                bip32_derivation: vec![],
            }],
            outputs: destination(&to, &to, 70_000, 1_000),
            script_type: ScriptType::default(),
            disable_large_fee: false,
        };

        let signed = wallet.generate_transaction(&tx_data, &[&owner]).unwrap();
        let tx: Transaction = encode::deserialize(&hex::decode(&signed.raw_tx).unwrap()).unwrap();
        let pushes: Vec<Vec<u8>> = tx.input[0]
            .script_sig
            .instructions()
            .map(|ins| ins.unwrap().push_bytes().unwrap().as_bytes().to_vec())
            .collect();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1], uncompressed);
        assert_eq!(p2pkh_script(&pushes[1]), parent.output[0].script_pubkey);
    }

    #[test]
    fn test_parent_mismatch_rejected() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let parent = p2pkh_parent(&owner, 80_000);
        let to = address_of(&signer(2));

        let mut input = UtxoInput {
            hash: TXID.to_string(),
            index: 0,
            sequence: None,
            value: 80_000,
            utxo: UtxoSource::NonWitness {
                raw_tx: encode::serialize_hex(&parent),
            },
            bip32_derivation: vec![],
        };
        let tx_data = |input: UtxoInput| TxData {
            inputs: vec![input],
            outputs: destination(&to, &to, 70_000, 1_000),
            script_type: ScriptType::default(),
            disable_large_fee: false,
        };

        let err = wallet.build_transaction_psbt(&tx_data(input.clone())).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        input.hash = parent.compute_txid().to_string();
        input.value = 79_999;
        assert!(wallet.build_transaction_psbt(&tx_data(input)).is_err());
    }

    fn multisig_inputs(keys: &[String], value: u64) -> Vec<MultisigInput> {
        vec![MultisigInput {
            hash: TXID.to_string(),
            index: 1,
            sequence: None,
            value,
            utxo: MultisigSource::Witness {
                public_keys: keys.to_vec(),
                script: None,
            },
        }]
    }

    #[test]
    fn test_multisig_two_of_three() {
        let wallet = BitcoinWallet::mainnet();
        let (a, b, c) = (signer(1), signer(2), signer(3));
        let keys = vec![pubkey(&a), pubkey(&b), pubkey(&c)];
        let to = address_of(&signer(4));

        let tx_data = MultisigTxData {
            inputs: multisig_inputs(&keys, 100_000),
            required: 2,
            outputs: destination(&to, &to, 90_000, 2_000),
        };

        let psbt = wallet.build_multisig_psbt(&tx_data).unwrap();
        assert_eq!(psbt.unsigned_tx.input[0].sequence, Sequence::MAX);
        let config = MultisigConfig::new(2, keys.clone()).unwrap();
        assert_eq!(psbt.inputs[0].witness_script.as_ref().unwrap(), &config.witness_script().unwrap());
        assert_eq!(psbt.inputs[0].redeem_script.as_ref().unwrap(), &config.redeem_script().unwrap());
        assert_eq!(
            psbt.inputs[0].witness_utxo.as_ref().unwrap().script_pubkey,
            config.script_pubkey().unwrap()
        );

        // Signer order differs from key order; witness must follow key order
        let signed = wallet.generate_multisig_transaction(&tx_data, &[&c, &a]).unwrap();
        let tx: Transaction = encode::deserialize(&hex::decode(&signed.raw_tx).unwrap()).unwrap();
        let witness = tx.input[0].witness.to_vec();
        assert_eq!(witness.len(), 4);
        assert!(witness[0].is_empty());
        assert_eq!(witness[3], config.witness_script().unwrap().to_bytes());

        let sighash = SighashCache::new(&tx)
            .p2wsh_signature_hash(
                0,
                &config.witness_script().unwrap(),
                Amount::from_sat(100_000),
                EcdsaSighashType::All,
            )
            .unwrap();
        let msg = Message::from_digest(sighash.to_byte_array());
        let first = bitcoin::ecdsa::Signature::from_slice(&witness[1]).unwrap();
        let a_key = secp256k1::PublicKey::from_slice(&hex::decode(pubkey(&a)).unwrap()).unwrap();
        assert!(Secp256k1::verification_only().verify_ecdsa(&msg, &first.signature, &a_key).is_ok());
    }

    #[test]
    fn test_multisig_below_threshold_fails() {
        let wallet = BitcoinWallet::mainnet();
        let (a, b) = (signer(1), signer(2));
        let to = address_of(&signer(4));
        let tx_data = MultisigTxData {
            inputs: multisig_inputs(&[pubkey(&a), pubkey(&b)], 100_000),
            required: 2,
            outputs: destination(&to, &to, 90_000, 2_000),
        };

        let err = wallet.generate_multisig_transaction(&tx_data, &[&a]).unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningFailed);
    }

    #[test]
    fn test_multisig_empty_keys_rejected() {
        let wallet = BitcoinWallet::mainnet();
        let to = address_of(&signer(4));
        let tx_data = MultisigTxData {
            inputs: multisig_inputs(&[], 100_000),
            required: 1,
            outputs: destination(&to, &to, 90_000, 2_000),
        };
        let err = wallet.build_multisig_psbt(&tx_data).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMultisigConfig);
    }

    #[test]
    fn test_omni_outputs_ordering() {
        let wallet = BitcoinWallet::mainnet();
        let (a, b) = (signer(1), signer(2));
        let to = address_of(&signer(4));
        let change = address_of(&signer(5));

        let tx_data = MultisigOmniTxData {
            inputs: multisig_inputs(&[pubkey(&a), pubkey(&b)], 10_000),
            required: 1,
            transfer: OmniTransfer {
                to: to.clone(),
                change_address: change.clone(),
                fee: 1_000,
                omni_amount: 1_000_000,
                property_id: None,
            },
        };

        let psbt = wallet.build_multisig_omni_psbt(&tx_data).unwrap();
        let outputs = &psbt.unsigned_tx.output;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].value.to_sat(), 10_000 - 546 - 1_000);
        assert_eq!(outputs[1].value, Amount::ZERO);
        let payload = decode_omni_script(&outputs[1].script_pubkey).unwrap();
        assert_eq!(payload.property_id, 31);
        assert_eq!(payload.amount, 1_000_000);
        assert_eq!(outputs[2].value.to_sat(), 546);

        let signed = wallet.generate_multisig_omni_transaction(&tx_data, &[&b]).unwrap();
        assert!(!signed.txid.is_empty());
    }

    #[test]
    fn test_omni_change_dropped_at_dust() {
        let wallet = BitcoinWallet::testnet();
        let (a, to) = (signer(1), signer(4));
        let to = utxo_address::p2wpkh_address(&pubkey(&to), wallet.network()).unwrap();
        let transfer = OmniTransfer {
            to: to.clone(),
            change_address: to,
            fee: 1_000,
            omni_amount: 5,
            property_id: None,
        };
        let inputs = multisig_inputs(&[pubkey(&a)], 546 + 1_000 + 546);

        let builder = wallet.builder().add_omni_outputs(&inputs, &transfer).unwrap();
        assert_eq!(builder.outputs().len(), 2);
        assert_eq!(decode_omni_script(&builder.outputs()[0].script_pubkey).unwrap().property_id, 1);

        let short = multisig_inputs(&[pubkey(&a)], 1_545);
        assert!(!wallet.builder().verify_omni(&short, 1_000));
    }

    #[test]
    fn test_single_sig_omni_is_deprecated() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let tx_data = OmniTxData {
            inputs: vec![witness_input(&pubkey(&owner), 10_000, 0)],
            transfer: OmniTransfer {
                to: address_of(&signer(2)),
                change_address: address_of(&owner),
                fee: 1_000,
                omni_amount: 1,
                property_id: Some(31),
            },
        };
        let err = wallet.generate_omni_transaction(&tx_data, &[&owner]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
    }

    #[test]
    fn test_intent_json_shape() {
        let json = r#"{
            "inputs": [{
                "hash": "a4b4a0b5c8f1d8e0f2a6c7b8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8",
                "index": 0,
                "value": 1000,
                "utxo": {"kind": "witness", "public_key": "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"}
            }],
            "outputs": {"list": [{"address": "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", "value": 900}]},
            "script_type": "P2WPKH"
        }"#;
        let tx_data: TxData = serde_json::from_str(json).unwrap();
        assert_eq!(tx_data.script_type, ScriptType::P2wpkh);
        assert!(!tx_data.disable_large_fee);
        assert!(matches!(tx_data.outputs, Outputs::List(ref items) if items.len() == 1));
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let wallet = BitcoinWallet::mainnet();
        let owner = signer(1);
        let to = address_of(&signer(2));
        let tx_data = TxData {
            inputs: vec![
                witness_input(&pubkey(&owner), 60_000, 0),
                witness_input(&pubkey(&owner), 40_000, 1),
            ],
            outputs: destination(&to, &address_of(&owner), 90_000, 1_000),
            script_type: ScriptType::P2wpkh,
            disable_large_fee: false,
        };

        let sync = wallet.generate_transaction(&tx_data, &[&owner]).unwrap();
        let async_signed = wallet.generate_transaction_async(&tx_data, &[&owner]).await.unwrap();
        assert_eq!(sync, async_signed);
    }
}
