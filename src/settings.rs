//! Runtime settings.
//!
//! Layered, later sources win:
//! - Built-in defaults
//! - An optional TOML file
//! - `LEDGER__SECTION__KEY` environment variables

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::balance::DeriveOptions;

const ENV_PREFIX: &str = "LEDGER";
const ENV_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub log_filter: String,
    pub storage: StorageSettings,
    pub balance: BalanceSettings,
    pub snapshot: SnapshotSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StorageSettings {
    /// In-memory stores when unset.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BalanceSettings {
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub page_size: usize,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(
            path,
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("log_filter", "info")?
            .set_default("storage.timeout_ms", 5_000)?
            .set_default("balance.cache_ttl_secs", 86_400)?
            .set_default("snapshot.enabled", true)?
            .set_default("snapshot.interval_secs", 600)?
            .set_default("snapshot.page_size", 100)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder.add_source(env).build()?.try_deserialize()
    }

    pub fn derive_options(&self) -> DeriveOptions {
        DeriveOptions {
            store_timeout: Duration::from_millis(self.storage.timeout_ms),
            cache_ttl: Duration::from_secs(self.balance.cache_ttl_secs),
        }
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot.interval_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            storage: StorageSettings {
                sqlite_path: None,
                timeout_ms: 5_000,
            },
            balance: BalanceSettings {
                cache_ttl_secs: 86_400,
            },
            snapshot: SnapshotSettings {
                enabled: true,
                interval_secs: 600,
                page_size: 100,
            },
        }
    }
}
