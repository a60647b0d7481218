//! Cryptographic primitives: key derivation and per-field encryption.

pub mod aead;
pub mod kdf;

pub use aead::{decrypt, decrypt_blob, decrypt_string, encrypt, EncryptedField};
pub use kdf::{derive_key, generate_salt, MasterKey};
