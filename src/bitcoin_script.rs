//! Script templates for single-sig, wrapped segwit and multisig spends

use crate::config::NetworkParams;
use crate::error::{HawalaError, HawalaResult};
use crate::utils::crypto::{hash160, sha256};
use crate::utxo_address::{parse_compressed_pubkey, LegacyAddress};
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash, WPubkeyHash, WScriptHash};
use serde::{Deserialize, Serialize};

/// Largest key count a bare CHECKMULTISIG script can carry as a small integer
pub const MAX_MULTISIG_KEYS: usize = 16;

/// `OP_0 <hash160(pk)>`
pub fn p2wpkh_script(public_key_hex: &str) -> HawalaResult<ScriptBuf> {
    let pubkey = parse_compressed_pubkey(public_key_hex)?;
    Ok(ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash160(&pubkey))))
}

/// `OP_DUP OP_HASH160 <hash160(pk)> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(public_key: &[u8]) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash160(public_key)))
}

/// `OP_HASH160 <hash160(script)> OP_EQUAL`
pub fn p2sh_wrap(script: &Script) -> ScriptBuf {
    ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash160(script.as_bytes())))
}

/// `OP_0 <sha256(script)>`
pub fn p2wsh_wrap(script: &Script) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(sha256(script.as_bytes())))
}

/// Output script of a wrapped segwit (P2SH-P2WPKH) key
pub fn calculate_script(public_key_hex: &str) -> HawalaResult<ScriptBuf> {
    Ok(p2sh_wrap(&p2wpkh_script(public_key_hex)?))
}

/// scriptSig consisting of a single push of `data`
pub fn single_push(data: &[u8]) -> HawalaResult<ScriptBuf> {
    let push = PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| HawalaError::encoding_error("push exceeds script element limit"))?;
    Ok(Builder::new().push_slice(push).into_script())
}

/// scriptSig pushing each item in order
pub fn push_all(items: &[&[u8]]) -> HawalaResult<ScriptBuf> {
    let mut builder = Builder::new();
    for item in items {
        let push = PushBytesBuf::try_from(item.to_vec())
            .map_err(|_| HawalaError::encoding_error("push exceeds script element limit"))?;
        builder = builder.push_slice(push);
    }
    Ok(builder.into_script())
}

/// m-of-n spending policy
///
/// Public keys are used in the order given and are never sorted. Every
/// co-signer must agree on that order out of band, since reordering the
/// list yields a different script and therefore a different address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigConfig {
    pub required: usize,
    pub public_keys: Vec<String>,
}

impl MultisigConfig {
    pub fn new(required: usize, public_keys: Vec<String>) -> HawalaResult<Self> {
        let config = Self {
            required,
            public_keys,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HawalaResult<()> {
        if self.public_keys.is_empty() {
            return Err(HawalaError::invalid_multisig_config("public key list cannot be empty"));
        }
        if self.public_keys.len() > MAX_MULTISIG_KEYS {
            return Err(HawalaError::invalid_multisig_config(format!(
                "at most {} public keys are supported, got {}",
                MAX_MULTISIG_KEYS,
                self.public_keys.len()
            )));
        }
        if self.required == 0 || self.required > self.public_keys.len() {
            return Err(HawalaError::invalid_multisig_config(format!(
                "required signatures must be between 1 and {}, got {}",
                self.public_keys.len(),
                self.required
            )));
        }
        Ok(())
    }

    fn parsed_keys(&self) -> HawalaResult<Vec<bitcoin::PublicKey>> {
        self.public_keys
            .iter()
            .map(|key| {
                let bytes = hex::decode(key)?;
                bitcoin::PublicKey::from_slice(&bytes).map_err(|e| {
                    HawalaError::invalid_multisig_config(format!("invalid public key {}: {}", key, e))
                })
            })
            .collect()
    }

    /// Bare `OP_m <pk1> .. <pkn> OP_n OP_CHECKMULTISIG` (the witness script)
    pub fn witness_script(&self) -> HawalaResult<ScriptBuf> {
        self.validate()?;
        let keys = self.parsed_keys()?;

        let mut builder = Builder::new().push_int(self.required as i64);
        for key in &keys {
            builder = builder.push_key(key);
        }
        Ok(builder
            .push_int(keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script())
    }

    /// P2WSH program of the witness script (the P2SH redeem script)
    pub fn redeem_script(&self) -> HawalaResult<ScriptBuf> {
        Ok(p2wsh_wrap(&self.witness_script()?))
    }

    /// P2SH output script wrapping the redeem script
    pub fn script_pubkey(&self) -> HawalaResult<ScriptBuf> {
        Ok(p2sh_wrap(&self.redeem_script()?))
    }

    /// P2SH-P2WSH address of the policy
    pub fn address(&self, params: &NetworkParams) -> HawalaResult<String> {
        let redeem = self.redeem_script()?;
        Ok(LegacyAddress {
            version: params.script_hash,
            hash: hash160(redeem.as_bytes()),
        }
        .encode())
    }
}

/// Read `(m, keys)` back out of a bare multisig script
pub fn parse_multisig(script: &Script) -> Option<(usize, Vec<Vec<u8>>)> {
    let instructions: Vec<Instruction> = script.instructions().collect::<Result<_, _>>().ok()?;
    let (first, rest) = instructions.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (count, keys) = rest.split_last()?;

    if *last != Instruction::Op(OP_CHECKMULTISIG) {
        return None;
    }

    let small_int = |ins: &Instruction| -> Option<usize> {
        match ins {
            Instruction::Op(op) => {
                let code = op.to_u8();
                (0x51..=0x60).contains(&code).then(|| usize::from(code - 0x50))
            }
            _ => None,
        }
    };

    let required = small_int(first)?;
    let total = small_int(count)?;
    let keys: Vec<Vec<u8>> = keys
        .iter()
        .map(|ins| match ins {
            Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        })
        .collect::<Option<_>>()?;

    (keys.len() == total && required <= total).then_some((required, keys))
}
