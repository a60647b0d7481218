//! Time-based one-time passwords (RFC 6238).
//!
//! Pure functions of (secret, time) — no I/O, no key material involved.
//! Stored TOTP secrets are base32 strings as handed out by websites; they are
//! normalized (whitespace and dashes stripped, re-padded) before decoding.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Result, VaultError};

/// Default code length in decimal digits.
pub const DEFAULT_DIGITS: u32 = 6;

/// Default time step in seconds.
pub const DEFAULT_PERIOD: u64 = 30;

/// Normalize a user-supplied base32 secret: strip spaces and dashes,
/// uppercase, restore stripped padding.
pub fn normalize_secret(secret: &str) -> String {
    let mut normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();

    let padding = 8 - (normalized.len() % 8);
    if padding != 8 {
        normalized.extend(std::iter::repeat('=').take(padding));
    }
    normalized
}

/// Decode a normalized base32 secret into raw key bytes.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let normalized = normalize_secret(secret);
    data_encoding::BASE32
        .decode(normalized.as_bytes())
        .map_err(|_| {
            VaultError::InvalidInput("Invalid TOTP secret. Must be a valid base32 string".into())
        })
}

/// Whether a secret decodes as base32 after normalization.
pub fn is_valid_secret(secret: &str) -> bool {
    !secret.trim().is_empty() && decode_secret(secret).is_ok()
}

/// HMAC-based one-time password for a single counter value (RFC 4226).
///
/// Dynamic truncation: the low nibble of the last HMAC byte selects a 4-byte
/// window, masked to 31 bits and reduced modulo 10^digits.
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> String {
    // HMAC-SHA1 accepts keys of any length
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let code = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;

    let code = code % 10u32.pow(digits);
    format!("{:0width$}", code, width = digits as usize)
}

/// Time-based code for the window containing `unix_time`.
///
/// Returns the code and the seconds remaining until the window rolls over.
pub fn totp_code(secret: &[u8], unix_time: u64, digits: u32, period: u64) -> (String, u8) {
    let counter = unix_time / period;
    let remaining = (period - (unix_time % period)) as u8;
    (hotp(secret, counter, digits), remaining)
}

/// Current 6-digit code for a base32 secret, plus seconds remaining.
///
/// Safe to call every second: no key derivation, just one HMAC.
pub fn totp_now(secret_base32: &str) -> Result<(String, u8)> {
    let secret = decode_secret(secret_base32)?;
    let unix_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| VaultError::Storage(format!("System time error: {}", e)))?
        .as_secs();
    Ok(totp_code(&secret, unix_time, DEFAULT_DIGITS, DEFAULT_PERIOD))
}
