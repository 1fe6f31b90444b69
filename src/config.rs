//! Runtime configuration
//!
//! Defaults, overridden by environment variables (a `.env` file is loaded
//! first by the binary), overridden in turn by command-line flags.

use crate::db::StorageMode;
use crate::error::{BalancerError, Result};
use clap::Parser;
use std::path::PathBuf;

pub const ENV_DATABASE: &str = "DATABALANCER_DATABASE";
pub const ENV_ADDRESS: &str = "DATABALANCER_ADDRESS";
pub const ENV_CACHE_TABLES: &str = "DATABALANCER_CACHE_TABLES";
pub const ENV_STORAGE_MODE: &str = "DATABALANCER_STORAGE_MODE";
pub const ENV_LOG: &str = "DATABALANCER_LOG";
pub const ENV_MAX_BODY: &str = "DATABALANCER_MAX_BODY";

#[derive(Debug, Clone, PartialEq)]
pub struct BalancerConfig {
    /// SQLite database file; `:memory:` for a throwaway database
    pub database_path: PathBuf,
    /// Address the HTTP server binds
    pub server_address: String,
    /// Keep the advisory family -> table cache
    pub cache_tables: bool,
    pub storage_mode: StorageMode,
    /// Default tracing level when `RUST_LOG` is unset
    pub log_level: String,
    /// Largest request the server will read
    pub max_body_bytes: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("databalancer.db"),
            server_address: "127.0.0.1:8080".to_string(),
            cache_tables: true,
            storage_mode: StorageMode::Typed,
            log_level: "info".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl BalancerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(address) = lookup(ENV_ADDRESS) {
            config.server_address = address;
        }
        if let Some(flag) = lookup(ENV_CACHE_TABLES) {
            config.cache_tables = parse_bool(ENV_CACHE_TABLES, &flag)?;
        }
        if let Some(mode) = lookup(ENV_STORAGE_MODE) {
            config.storage_mode = mode.parse()?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            config.log_level = level;
        }
        if let Some(max) = lookup(ENV_MAX_BODY) {
            config.max_body_bytes = max.trim().parse().map_err(|_| {
                BalancerError::Config(format!("{} must be a byte count, got '{}'", ENV_MAX_BODY, max))
            })?;
        }

        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(path) = &overrides.database {
            self.database_path = path.clone();
        }
        if let Some(address) = &overrides.address {
            self.server_address = address.clone();
        }
        if overrides.no_cache {
            self.cache_tables = false;
        }
        if let Some(mode) = overrides.storage_mode {
            self.storage_mode = mode;
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        self
    }
}

/// Command-line flags for the server binary
#[derive(Parser, Debug, Default)]
#[command(name = "databalancer")]
#[command(about = "Ingests schema-tagged event batches into typed SQLite tables")]
#[command(version)]
pub struct Overrides {
    /// SQLite database file (default: databalancer.db)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Address and port to serve HTTP on (default: 127.0.0.1:8080)
    #[arg(long)]
    pub address: Option<String>,

    /// Disable the family -> table cache
    #[arg(long)]
    pub no_cache: bool,

    /// Storage layout: typed or raw
    #[arg(long, value_parser = parse_storage_mode)]
    pub storage_mode: Option<StorageMode>,

    /// Default log level when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
}

fn parse_storage_mode(s: &str) -> std::result::Result<StorageMode, String> {
    s.parse().map_err(|e: BalancerError| e.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BalancerError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
