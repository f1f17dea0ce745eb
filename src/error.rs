//! Error types for Starchain

use thiserror::Error;

/// Every failure the ledger, the identity store and the registry can surface.
///
/// Chain-integrity problems are not part of this enum: `Ledger::validate_chain`
/// reports them as data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Missing height, hash, address or identity challenge.
    #[error("Not found: {0}")]
    NotFound(String),
    /// No valid identity proof for the address.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    /// Malformed star record.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Underlying key-value store failure.
    #[error("Storage error: {0}")]
    Storage(String),
    /// Key handling outside signature verification (bad secret key bytes, signing failure).
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Storage(format!("Corrupt record: {}", err))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
