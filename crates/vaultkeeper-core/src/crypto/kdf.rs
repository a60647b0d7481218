//! Master key derivation using Argon2id.
//!
//! The master key is derived from the user's master password and a per-vault
//! salt. Argon2id is memory-hard, so offline brute force against a stolen
//! database stays expensive.

use argon2::Argon2;
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, VaultError};

/// Argon2id parameters.
///
/// These values balance security and usability:
/// - Memory: 64 MB (64 * 1024 KB)
/// - Iterations: 3
/// - Parallelism: 1 (single-threaded for simplicity)
///
/// Derivation is intentionally slow (hundreds of milliseconds); it runs once
/// per unlock, never per field.
const ARGON2_MEMORY_KB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;

/// Length of the derived key in bytes (32 bytes = AES-256).
pub const KEY_LENGTH: usize = 32;

/// Length of the per-vault salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// The symmetric key derived from the master password.
///
/// Held only in process memory while the vault is unlocked and zeroized from
/// memory when dropped. Never serialized.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate
    /// encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random salt for a new vault.
pub fn generate_salt() -> Result<[u8; SALT_LENGTH]> {
    let mut salt = [0u8; SALT_LENGTH];
    getrandom::getrandom(&mut salt)
        .map_err(|e| VaultError::Storage(format!("Failed to generate salt: {}", e)))?;
    Ok(salt)
}

/// Derive the master key from a password and salt using Argon2id.
///
/// Deterministic: the same password and salt always produce the same key, so
/// the vault can be re-unlocked after a restart. A wrong password yields a
/// *different* key, not an error; correctness is verified downstream by
/// decrypting the canary field.
///
/// # Errors
///
/// Returns `VaultError::InvalidInput` for an empty password or a salt
/// shorter than 16 bytes. Derivation itself does not fail on wrong passwords.
pub fn derive_key(master_password: &str, salt: &[u8]) -> Result<MasterKey> {
    if master_password.is_empty() {
        return Err(VaultError::InvalidInput(
            "Master password cannot be empty".to_string(),
        ));
    }

    if salt.len() < SALT_LENGTH {
        return Err(VaultError::InvalidInput(
            "Salt must be at least 16 bytes".to_string(),
        ));
    }

    let params = argon2::Params::new(
        ARGON2_MEMORY_KB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_LENGTH),
    )
    .map_err(|e| VaultError::Storage(format!("Failed to create Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(master_password.as_bytes(), salt, &mut key_bytes)
        .map_err(|e| VaultError::Storage(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(key_bytes))
}
