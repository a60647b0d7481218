//! Per-field authenticated encryption using AES-256-GCM.
//!
//! Every sensitive field (password, card number, note body, TOTP secret) is
//! encrypted independently under the master key with its own random nonce.
//! Tampering with ciphertext or nonce is detected by the GCM tag, never
//! silently decrypted into garbage.

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};

use crate::crypto::kdf::MasterKey;
use crate::error::{Result, VaultError};

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LENGTH: usize = 16;

/// One encrypted field: nonce plus ciphertext (tag appended by GCM).
///
/// The nonce is unique per encryption operation under a given key; it comes
/// from the OS CSPRNG on every `encrypt` call. Persisted as an opaque blob
/// inside records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Serialize as `nonce || ciphertext` for storage.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(NONCE_LENGTH + self.ciphertext.len());
        blob.extend_from_slice(&self.nonce);
        blob.extend_from_slice(&self.ciphertext);
        blob
    }

    /// Parse a stored blob back into nonce and ciphertext.
    ///
    /// A blob shorter than nonce + tag cannot be a valid encryption and is
    /// reported as an authentication failure, same as a corrupted one.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(VaultError::Authentication);
        }
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&blob[..NONCE_LENGTH]);
        Ok(Self {
            nonce,
            ciphertext: blob[NONCE_LENGTH..].to_vec(),
        })
    }
}

/// Encrypt one field under the master key with a fresh random nonce.
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<EncryptedField> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| VaultError::Authentication)?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    nonce_bytes.copy_from_slice(nonce.as_slice());

    Ok(EncryptedField {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt one field under the master key.
///
/// # Errors
///
/// Returns `VaultError::Authentication` when the GCM tag does not verify:
/// wrong key, corrupted data, or tampering.
pub fn decrypt(key: &MasterKey, field: &EncryptedField) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&field.nonce);

    cipher
        .decrypt(nonce, field.ciphertext.as_slice())
        .map_err(|_| VaultError::Authentication)
}

/// Decrypt a field straight from its stored blob form.
pub fn decrypt_blob(key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>> {
    let field = EncryptedField::from_blob(blob)?;
    decrypt(key, &field)
}

/// Decrypt a blob into a UTF-8 string.
pub fn decrypt_string(key: &MasterKey, blob: &[u8]) -> Result<String> {
    let plaintext = decrypt_blob(key, blob)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Authentication)
}
