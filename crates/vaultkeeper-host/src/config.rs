use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vaultkeeper_core::SessionConfig;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub breach: BreachSection,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct VaultSection {
    /// Path to the vault database. Defaults to the XDG data dir.
    pub path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Idle seconds before the vault auto-locks; 0 disables auto-locking.
    pub inactivity_timeout_seconds: u64,
    pub max_failed_attempts: u32,
    pub lockout_base_seconds: u64,
    pub lockout_cap_seconds: u64,
}

impl Default for SecuritySection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            inactivity_timeout_seconds: defaults.inactivity_timeout.as_secs(),
            max_failed_attempts: defaults.max_failed_attempts,
            lockout_base_seconds: defaults.lockout_base.as_secs(),
            lockout_cap_seconds: defaults.lockout_cap.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BreachSection {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for BreachSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: vaultkeeper_core::breach::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl HostConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            inactivity_timeout: Duration::from_secs(self.security.inactivity_timeout_seconds),
            max_failed_attempts: self.security.max_failed_attempts,
            lockout_base: Duration::from_secs(self.security.lockout_base_seconds),
            lockout_cap: Duration::from_secs(self.security.lockout_cap_seconds),
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_vault_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("vault.db"))
}

pub fn default_log_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("native_host.log"))
}

/// Read a config file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<HostConfig> {
    if !path.exists() {
        return Ok(HostConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &HostConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("vaultkeeper"));
        }
    }
    Ok(home_dir()?.join(".config").join("vaultkeeper"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("vaultkeeper"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("vaultkeeper"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.toml")).unwrap();
        assert!(config.breach.enabled);
        assert_eq!(config.security.inactivity_timeout_seconds, 300);
        assert_eq!(config.security.max_failed_attempts, 5);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = HostConfig::default();
        config.vault.path = Some("/tmp/custom.db".to_string());
        config.security.inactivity_timeout_seconds = 60;
        write_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.vault.path.as_deref(), Some("/tmp/custom.db"));
        assert_eq!(loaded.session_config().inactivity_timeout.as_secs(), 60);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[breach]\nenabled = false\nendpoint = \"http://localhost:9\"\n")
            .unwrap();

        let config = load_config(&path).unwrap();
        assert!(!config.breach.enabled);
        assert_eq!(config.security.max_failed_attempts, 5);
    }
}
