//! # VaultKeeper Core
//!
//! Core library for VaultKeeper - a local-first encrypted credential vault
//! with a browser-extension native messaging host.
//!
//! This crate provides the vault engine, crypto primitives, and storage
//! abstractions independent of the messaging host binary.
//!
//! ## Architecture
//!
//! - **crypto**: Argon2id key derivation and AES-256-GCM field encryption
//! - **session**: The lock/unlock state machine that owns the master key
//! - **storage**: Record store trait and SQLite implementation
//! - **totp**: RFC 6238 time-based one-time codes
//! - **breach**: k-anonymity breach checking
//! - **cache**: Decrypted list views memoized per session

pub mod breach;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod session;
pub mod storage;
pub mod totp;

pub use breach::{BreachChecker, BreachStatus};
pub use error::{Result, VaultError};
pub use session::{CardInput, CredentialInput, SessionConfig, VaultSession, VaultStatus};
pub use storage::{RecordStore, SqliteStore};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
