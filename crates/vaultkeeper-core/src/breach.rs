//! k-anonymity breach checking against an HIBP-style range endpoint.
//!
//! The password is SHA-1 hashed locally and only the first five hex
//! characters leave the process. The endpoint answers with every known
//! suffix for that prefix; the match is found locally. Breach checking is
//! advisory: network failures surface as a status, never as an operation
//! failure.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tracing::warn;

/// Default range-query endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.pwnedpasswords.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a breach check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreachStatus {
    /// Suffix not present in the range response
    Safe,
    /// Password seen in breaches, with the reported occurrence count
    Compromised(u64),
    /// Network or endpoint failure; the check is inconclusive
    Error(String),
}

/// Client for the range-query endpoint, with a per-prefix response cache.
pub struct BreachChecker {
    base_url: String,
    client: reqwest::blocking::Client,
    // One range body per 5-hex prefix; range contents change rarely
    cache: Mutex<HashMap<String, String>>,
}

impl BreachChecker {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the checker at a different endpoint (used by tests).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Check a password against the breach database.
    ///
    /// Never fails: timeouts, HTTP errors, and malformed responses all map
    /// to `BreachStatus::Error`.
    pub fn check(&self, password: &str) -> BreachStatus {
        if password.is_empty() {
            return BreachStatus::Safe;
        }

        let digest = Sha1::digest(password.as_bytes());
        let hash = hex_upper(&digest);
        let (prefix, suffix) = hash.split_at(5);

        let body = match self.range_body(prefix) {
            Ok(body) => body,
            Err(reason) => {
                warn!(prefix, %reason, "breach range query failed");
                return BreachStatus::Error(reason);
            }
        };

        match scan_range(&body, suffix) {
            Some(count) => BreachStatus::Compromised(count),
            None => BreachStatus::Safe,
        }
    }

    fn range_body(&self, prefix: &str) -> Result<String, String> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(body) = cache.get(prefix) {
                return Ok(body.clone());
            }
        }

        let url = format!("{}/range/{}", self.base_url, prefix);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| format!("Request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Endpoint returned status {}", response.status()));
        }

        let body = response
            .text()
            .map_err(|e| format!("Failed to read response: {}", e))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(prefix.to_string(), body.clone());
        }
        Ok(body)
    }
}

impl Default for BreachChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan a range response (`SUFFIX:COUNT` per line) for a 35-hex-char suffix.
///
/// Pure and case-insensitive; lines that do not parse are skipped.
pub fn scan_range(body: &str, suffix: &str) -> Option<u64> {
    for line in body.lines() {
        let mut parts = line.trim().splitn(2, ':');
        let candidate = parts.next()?;
        if candidate.eq_ignore_ascii_case(suffix) {
            return parts.next().and_then(|count| count.trim().parse().ok());
        }
    }
    None
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-1("password") = 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
    const PASSWORD_SUFFIX: &str = "1E4C9B93F3F0682250B6CF8331B7EE68FD8";

    #[test]
    fn test_scan_range_finds_suffix() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\n\
                    1E4C9B93F3F0682250B6CF8331B7EE68FD8:3730471\n\
                    011053FD0102E94D6AE2F8B83D76FAF94F6:1";
        assert_eq!(scan_range(body, PASSWORD_SUFFIX), Some(3_730_471));
    }

    #[test]
    fn test_scan_range_case_insensitive() {
        let body = "1e4c9b93f3f0682250b6cf8331b7ee68fd8:42";
        assert_eq!(scan_range(body, PASSWORD_SUFFIX), Some(42));
    }

    #[test]
    fn test_scan_range_miss() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1";
        assert_eq!(scan_range(body, PASSWORD_SUFFIX), None);
    }

    #[test]
    fn test_scan_range_skips_malformed_lines() {
        let body = "garbage\n\n1E4C9B93F3F0682250B6CF8331B7EE68FD8:7";
        assert_eq!(scan_range(body, PASSWORD_SUFFIX), Some(7));
    }

    #[test]
    fn test_empty_password_is_safe_without_network() {
        let checker = BreachChecker::with_base_url("http://127.0.0.1:1");
        assert_eq!(checker.check(""), BreachStatus::Safe);
    }

    #[test]
    fn test_unreachable_endpoint_maps_to_error() {
        let checker = BreachChecker::with_base_url("http://127.0.0.1:1");
        assert!(matches!(checker.check("password"), BreachStatus::Error(_)));
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[0x5b, 0xaa, 0x61]), "5BAA61");
    }
}
