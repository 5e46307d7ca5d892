//! Configuration management
//!
//! Settings live in `settings.json` inside the miniverse directory:
//! ```json
//! {
//!   "ledger": { "allowSelfTransfer": false, "maxRetries": 5 },
//!   "api": { "referencePrefix": "" }
//! }
//! ```
//! Keys this crate does not know about are kept when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default number of attempts for a unit of work that hits a conflict
pub const DEFAULT_MAX_RETRIES: u32 = 5;

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    api: ApiSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default)]
    allow_self_transfer: bool,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            allow_self_transfer: false,
            max_retries: DEFAULT_MAX_RETRIES,
            other: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSettings {
    #[serde(default)]
    reference_prefix: String,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Miniverse configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether a transfer may move money between two movements of one user
    pub allow_self_transfer: bool,
    /// Attempts per unit of work when it fails with a retryable error
    pub max_retries: u32,
    /// Prefix for reference tokens, e.g. `https://api.example.com`
    pub reference_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_self_transfer: false,
            max_retries: DEFAULT_MAX_RETRIES,
            reference_prefix: String::new(),
        }
    }
}

impl Config {
    /// Load config from the miniverse directory
    ///
    /// Environment overrides (for CI/testing):
    /// - `MINIVERSE_ALLOW_SELF_TRANSFER`
    /// - `MINIVERSE_REFERENCE_PREFIX`
    pub fn load(miniverse_dir: &Path) -> Result<Self> {
        let raw = read_settings(miniverse_dir)?;

        let allow_self_transfer = match std::env::var("MINIVERSE_ALLOW_SELF_TRANSFER")
            .ok()
            .as_deref()
        {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => false,
            _ => raw.ledger.allow_self_transfer,
        };

        let reference_prefix = std::env::var("MINIVERSE_REFERENCE_PREFIX")
            .unwrap_or(raw.api.reference_prefix);

        Ok(Self {
            allow_self_transfer,
            // Zero attempts would never run the operation at all
            max_retries: raw.ledger.max_retries.max(1),
            reference_prefix: reference_prefix.trim_end_matches('/').to_string(),
        })
    }

    /// Save config to the miniverse directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, miniverse_dir: &Path) -> Result<()> {
        let mut settings = read_settings(miniverse_dir)?;

        settings.ledger.allow_self_transfer = self.allow_self_transfer;
        settings.ledger.max_retries = self.max_retries;
        settings.api.reference_prefix = self.reference_prefix.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(settings_path(miniverse_dir), content)?;
        Ok(())
    }
}

fn settings_path(miniverse_dir: &Path) -> PathBuf {
    miniverse_dir.join(SETTINGS_FILE)
}

fn read_settings(miniverse_dir: &Path) -> Result<SettingsFile> {
    let path = settings_path(miniverse_dir);
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&path)?;
    // A malformed file falls back to defaults rather than locking the user out
    Ok(serde_json::from_str(&content).unwrap_or_default())
}
