//! Error types for vault core operations.
//!
//! Errors are descriptive at the core level; the host layer maps them to
//! structured wire responses. None of these are fatal to the process.

use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Core error type for vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Master password did not verify against the canary
    #[error("Invalid master password")]
    WrongPassword,

    /// Operation requires an unlocked vault
    #[error("Vault is locked")]
    Locked,

    /// Too many consecutive failed unlock attempts
    #[error("Too many failed attempts. Try again in {retry_after_secs} seconds")]
    LockedOut { retry_after_secs: u64 },

    /// Record does not exist
    #[error("Record not found: {0}")]
    NotFound(i64),

    /// Ciphertext failed authentication (wrong key, corruption, or tampering)
    #[error("Decryption failed: data is corrupted or the key is wrong")]
    Authentication,

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Breach-check network failure (always advisory, never fatal)
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Storage(err.to_string())
    }
}
