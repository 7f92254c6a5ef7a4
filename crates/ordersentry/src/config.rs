//! Runner configuration, loaded from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Accounting system connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountingConfig {
    /// Base URL of the accounting API. Empty means run degraded, with no
    /// customer matching.
    pub base_url: Option<String>,
    /// Bearer token for the accounting API.
    pub token: Option<String>,
}

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Path to the alert database. Defaults to the platform data dir.
    pub database_path: Option<PathBuf>,
    /// Accounting system settings.
    pub accounting: AccountingConfig,
    /// Hours before an unanswered PO escalates. Defaults to 4.
    pub escalation_hours: Option<i64>,
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ordersentry")
            .join("config.json")
    }

    /// Loads the config from `path`, or from the default location. A
    /// missing file at the default location yields the default config; an
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolves the alert database path, creating its parent directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        let path = match &self.database_path {
            Some(p) => p.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ordersentry")
                .join("ordersentry.db"),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        Ok(path)
    }
}
