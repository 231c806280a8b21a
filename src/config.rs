//! Kiln configuration (loaded from `kiln.toml`).
//!
//! Configuration is discovered by walking up the directory tree from the
//! working directory, so a project checkout can carry its own kiln.toml.
//! All sections have defaults; an absent file means defaults throughout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::plan::ExtensionStep;

pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Complete kiln configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KilnConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub compat: CompatConfig,

    #[serde(default)]
    pub provision: ProvisionConfig,

    /// Caller-supplied steps appended to every generated plan.
    #[serde(default)]
    pub extra_steps: Vec<ExtensionStep>,
}

/// Cache ledger location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    /// Directory holding ledger files (one per target environment).
    /// Defaults to the XDG state directory.
    pub dir: Option<String>,
}

/// Compatibility table location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompatConfig {
    /// Path to the compatibility table TOML. Defaults to `compat.toml`
    /// next to the config file, or in the working directory.
    pub table: Option<String>,
}

/// Execution tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvisionConfig {
    /// Per-step timeout in seconds; unset means no timeout.
    pub step_timeout_secs: Option<u64>,
}

impl KilnConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

/// Discover a `kiln.toml` by traversing up from `start`.
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Load the explicit config when given, otherwise discover one, otherwise
/// fall back to defaults.
pub fn load_config(explicit: Option<&str>) -> Result<KilnConfig> {
    if let Some(path) = explicit {
        return KilnConfig::from_file(Path::new(path));
    }
    match discover_config(&std::env::current_dir()?) {
        Some(path) => {
            tracing::info!("using config: {}", path.display());
            KilnConfig::from_file(&path)
        }
        None => {
            tracing::debug!("no {CONFIG_FILE_NAME} found, using defaults");
            Ok(KilnConfig::default())
        }
    }
}
