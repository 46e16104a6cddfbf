//! Builder Configuration
//!
//! Typed configuration values handed to the builders at construction.
//! Defaults reproduce the protocol constants; overriding them is meant
//! for regtest setups and tests.

use serde::{Deserialize, Serialize};

/// Satoshis below which an output is not economically spendable
pub const DUST_AMOUNT: u64 = 546;
/// Upper bound (exclusive) on the implied fee when large fees are disabled
pub const MAX_FEE: u64 = 1_000_000;
/// Enables locktime and signals replaceability
pub const DEFAULT_SEQUENCE: u32 = 0xFFFF_FFFD;

pub const USDT_PROPERTY_ID_MAINNET: u32 = 31;
pub const USDT_PROPERTY_ID_TESTNET: u32 = 1;

/// TRON expiration window: 600 * 5 seconds
pub const TRON_EXPIRATION_WINDOW_MS: i64 = 600 * 5 * 1000;
/// Fee limit attached to TRC20 contract calls (in sun)
pub const TRC20_FEE_LIMIT: i64 = 1_000_000_000;

/// Address version bytes of a UTXO network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub name: String,
    pub pub_key_hash: u8,
    pub script_hash: u8,
    pub bech32_hrp: String,
    pub is_mainnet: bool,
}

impl NetworkParams {
    pub fn bitcoin() -> Self {
        Self {
            name: "bitcoin".to_string(),
            pub_key_hash: 0x00,
            script_hash: 0x05,
            bech32_hrp: "bc".to_string(),
            is_mainnet: true,
        }
    }

    pub fn bitcoin_testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            pub_key_hash: 0x6f,
            script_hash: 0xc4,
            bech32_hrp: "tb".to_string(),
            is_mainnet: false,
        }
    }

    pub fn litecoin() -> Self {
        Self {
            name: "litecoin".to_string(),
            pub_key_hash: 0x30,
            script_hash: 0x32,
            bech32_hrp: "ltc".to_string(),
            is_mainnet: true,
        }
    }

    /// Well-known USDT property id for this network
    ///
    /// Only Bitcoin mainnet uses 31; every other network falls back to
    /// the test property.
    pub fn usdt_property_id(&self) -> u32 {
        if *self == Self::bitcoin() {
            USDT_PROPERTY_ID_MAINNET
        } else {
            USDT_PROPERTY_ID_TESTNET
        }
    }
}

/// Knobs of the UTXO builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtxoBuilderOptions {
    pub default_sequence: u32,
    pub max_fee: u64,
    pub dust_amount: u64,
}

impl Default for UtxoBuilderOptions {
    fn default() -> Self {
        Self {
            default_sequence: DEFAULT_SEQUENCE,
            max_fee: MAX_FEE,
            dust_amount: DUST_AMOUNT,
        }
    }
}

/// Knobs of the TRON builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TronOptions {
    pub expiration_window_ms: i64,
    pub trc20_fee_limit: i64,
}

impl Default for TronOptions {
    fn default() -> Self {
        Self {
            expiration_window_ms: TRON_EXPIRATION_WINDOW_MS,
            trc20_fee_limit: TRC20_FEE_LIMIT,
        }
    }
}
