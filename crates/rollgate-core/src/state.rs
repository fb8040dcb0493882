use crate::error::Result;
use crate::paths;
use crate::trigger::TriggerLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent run state: the trigger ledger plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Cluster identity observed on the last apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub applied: TriggerLedger,
    pub last_updated: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: 1,
            cluster_id: None,
            applied: TriggerLedger::new(),
            last_updated: Utc::now(),
        }
    }
}

impl State {
    /// Load the state file; a missing file means nothing has been applied yet.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::state_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let state: State = serde_yaml::from_str(&data)?;
        Ok(state)
    }

    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        let path = paths::state_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerSet;
    use tempfile::TempDir;

    #[test]
    fn missing_state_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = State::load(dir.path()).unwrap();
        assert!(state.applied.is_empty());
        assert!(state.cluster_id.is_none());
    }

    #[test]
    fn save_and_reload_ledger() {
        let dir = TempDir::new().unwrap();
        let mut state = State::load(dir.path()).unwrap();
        state.cluster_id = Some("uid-1".into());
        state.applied.record_success(
            "staging/readiness",
            TriggerSet::new().with("cluster", "uid-1"),
        );
        state.save(dir.path()).unwrap();

        let reloaded = State::load(dir.path()).unwrap();
        assert_eq!(reloaded.cluster_id.as_deref(), Some("uid-1"));
        assert_eq!(
            reloaded
                .applied
                .last_applied("staging/readiness")
                .and_then(|t| t.get("cluster")),
            Some("uid-1")
        );
    }
}
