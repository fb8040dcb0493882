use crate::error::{Result, RollgateError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ROLLGATE_DIR: &str = ".rollgate";
pub const CONFIG_FILE: &str = ".rollgate/config.yaml";
pub const STATE_FILE: &str = ".rollgate/state.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn rollgate_dir(root: &Path) -> PathBuf {
    root.join(ROLLGATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

/// Resolve a configured path relative to the project root. Absolute paths
/// are returned unchanged.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

// ---------------------------------------------------------------------------
// Environment (namespace) name validation
// ---------------------------------------------------------------------------

static LABEL_RE: OnceLock<Regex> = OnceLock::new();

fn label_re() -> &'static Regex {
    LABEL_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?$").unwrap())
}

/// Environments double as Kubernetes namespaces, so names must be DNS-1123 labels.
pub fn validate_environment(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 || !label_re().is_match(name) {
        return Err(RollgateError::InvalidEnvironment(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
