//! XDG Base Directory support.
//!
//! Follows the XDG Base Directory Specification:
//! - https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html
//!
//! Directory structure:
//! - `$XDG_STATE_HOME/kiln/` (default: `~/.local/state/kiln/`) - Cache ledgers
//! - `$XDG_CONFIG_HOME/kiln/` (default: `~/.config/kiln/`) - Configuration files

use std::path::PathBuf;

/// Get the kiln state directory (cache ledgers live here by default).
///
/// Respects the XDG_STATE_HOME environment variable; falls back to
/// `$HOME/.local/state/kiln`.
pub fn state_dir() -> PathBuf {
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        PathBuf::from(xdg_state).join("kiln")
    } else if let Some(home) = dirs::home_dir() {
        // XDG spec default: $HOME/.local/state
        home.join(".local").join("state").join("kiln")
    } else {
        // Fallback to current directory (should rarely happen)
        PathBuf::from(".kiln-state")
    }
}

/// Get the kiln configuration directory.
///
/// Respects the XDG_CONFIG_HOME environment variable; falls back to the
/// platform config directory.
#[allow(dead_code)]
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("kiln")
    } else if let Some(config) = dirs::config_dir() {
        config.join("kiln")
    } else {
        PathBuf::from(".kiln-config")
    }
}

/// Default directory for cache ledgers.
pub fn ledger_dir() -> PathBuf {
    state_dir().join("ledgers")
}
