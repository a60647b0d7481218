//! VaultKeeper native messaging host.
//!
//! Speaks the browser native messaging protocol over stdin/stdout: 4-byte
//! native-endian length prefix + JSON, one response per request, in order.
//! stdout belongs to the wire, so all diagnostics go to a log file.

mod channel;
mod config;
mod dispatch;

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vaultkeeper_core::{BreachChecker, SqliteStore, VaultSession, VERSION};

use crate::dispatch::Dispatcher;

/// VaultKeeper - native messaging host for the browser extension
#[derive(Parser)]
#[command(name = "vaultkeeper-host")]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, env = "VAULTKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the vault database (overrides config)
    #[arg(long, env = "VAULTKEEPER_VAULT")]
    vault: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Extension origin and other arguments passed by the browser; unused
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    browser_args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let host_config = config::load_config(&config_path)?;

    init_logging(&cli.log_level)?;
    info!(version = VERSION, "vaultkeeper host starting");

    if io::stdin().is_terminal() {
        eprintln!(
            "vaultkeeper-host speaks the native messaging protocol on stdin/stdout; \
             it is meant to be launched by the browser, not interactively."
        );
    }

    let vault_path = match cli.vault.or_else(|| host_config.vault.path.clone().map(PathBuf::from)) {
        Some(path) => path,
        None => config::default_vault_path()?,
    };
    info!(vault = %vault_path.display(), "opening vault");

    let store = SqliteStore::open(&vault_path)
        .with_context(|| format!("Failed to open vault at {}", vault_path.display()))?;
    let session = VaultSession::with_config(store, host_config.session_config());

    let breach = if host_config.breach.enabled {
        Some(Arc::new(BreachChecker::with_base_url(
            &host_config.breach.endpoint,
        )))
    } else {
        None
    };

    let mut dispatcher = Dispatcher::new(session, breach);
    let stdin = io::stdin();
    let stdout = io::stdout();
    dispatch::serve(&mut dispatcher, &mut stdin.lock(), &mut stdout.lock())
        .context("native messaging channel failed")?;

    info!("vaultkeeper host stopped");
    Ok(())
}

/// Log to a file under the data dir; stdout is the wire and must stay clean.
fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let log_path = config::default_log_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
