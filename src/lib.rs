//! Hawala Transaction Core
//!
//! Transaction assembly and signing for UTXO (BTC/LTC), account-model
//! (TRON) and ledger-native (XRP) chains.
//!
//! # Architecture
//!
//! - **signing**: the signing-provider contract (blocking and async)
//! - **bitcoin_wallet**: PSBT assembly, fee policy, sighash and finalization
//! - **bitcoin_script** / **omni** / **utxo_address**: script templates,
//!   Omni Layer payloads, address ↔ scriptPubKey
//! - **litecoin_wallet**: address dialect adapter over the Bitcoin builder
//! - **tron_wallet** / **tron_proto**: TRON contracts and block binding
//! - **xrp_wallet** / **xrp_codec**: XRP canonical binary format and signing
//! - **coin**: dispatch by [`Chain`]
//!
//! # Security
//!
//! Private keys never enter the builders; they only see digests and
//! signatures. [`signing::PrivateKeySigner`] keeps its key in a
//! `zeroize` buffer that is cleared on drop.
//!
//! # Example
//!
//! ```rust,ignore
//! use hawala_txcore::{signing::PrivateKeySigner, tron_wallet::TronWallet};
//!
//! let signer = PrivateKeySigner::from_hex(&key_hex)?;
//! let signed = TronWallet::new().generate_transaction(&tx_data, &signer)?;
//! println!("{} {}", signed.txid, signed.raw_tx);
//! ```

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub mod signing;

pub mod bitcoin_script;
pub mod bitcoin_wallet;
pub mod litecoin_wallet;
pub mod omni;
pub mod utxo_address;

pub mod tron_proto;
pub mod tron_wallet;

pub mod xrp_codec;
pub mod xrp_wallet;

pub mod coin;

pub use coin::{Coin, TransactionRequest};
pub use error::{ErrorCode, HawalaError, HawalaResult};
pub use signing::{AsyncKeyProvider, AsyncSignProvider, KeyProvider, PrivateKeySigner, SignProvider};
pub use types::*;
