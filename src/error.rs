//! Unified error types for the transaction core
//!
//! Every builder reports failures through [`HawalaError`]. Validation
//! errors are raised before any output or signature state is produced,
//! so a returned error never leaves a half-built artifact behind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all builder and signing operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HawalaError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl HawalaError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_multisig_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidMultisigConfig, msg)
    }

    pub fn address_decode(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AddressDecode, msg)
    }

    pub fn invalid_tag(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTag, msg)
    }

    pub fn invalid_block_reference(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidBlockReference, msg)
    }

    pub fn signing_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningFailed, msg)
    }

    pub fn encoding_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::EncodingError, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedOperation, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for HawalaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for HawalaError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Validation errors
    /// Economic check failed: insufficient funds or excessive fee
    InvalidInput,
    /// Multisig policy is unusable (no keys, m out of range)
    InvalidMultisigConfig,
    /// Chain-specific address encoding could not be decoded
    AddressDecode,
    /// XRP destination tag outside [0, 0xFFFFFFFF]
    InvalidTag,
    /// TRON latest-block reference is malformed
    InvalidBlockReference,

    // Signing errors
    SigningFailed,

    // Encoding errors
    EncodingError,
    HexError,
    JsonError,

    UnsupportedOperation,
    Internal,
}

/// Result type alias for builder operations
pub type HawalaResult<T> = Result<T, HawalaError>;

// Conversions from common error types

impl From<serde_json::Error> for HawalaError {
    fn from(e: serde_json::Error) -> Self {
        HawalaError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for HawalaError {
    fn from(e: hex::FromHexError) -> Self {
        HawalaError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<secp256k1::Error> for HawalaError {
    fn from(e: secp256k1::Error) -> Self {
        HawalaError::new(ErrorCode::SigningFailed, format!("Secp256k1 error: {}", e))
    }
}

impl From<bitcoin::psbt::Error> for HawalaError {
    fn from(e: bitcoin::psbt::Error) -> Self {
        HawalaError::new(ErrorCode::InvalidInput, format!("PSBT error: {}", e))
    }
}

impl From<bitcoin::consensus::encode::Error> for HawalaError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        HawalaError::new(ErrorCode::EncodingError, format!("Consensus decode error: {}", e))
    }
}

impl From<prost::DecodeError> for HawalaError {
    fn from(e: prost::DecodeError) -> Self {
        HawalaError::new(ErrorCode::EncodingError, format!("Protobuf decode error: {}", e))
    }
}
