use crate::dashboard::DuplicatePolicy;
use crate::error::{Result, RollgateError};
use crate::paths;
use crate::readiness::{GateOptions, NamePatterns, Scheduling, DEFAULT_EXCLUDED_WORKLOAD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ClusterConfig
// ---------------------------------------------------------------------------

/// Declared shape of the cluster. Provisioning happens outside rollgate;
/// these values are reported by `status` and checked by `config validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    #[serde(default = "default_node_count")]
    pub node_count: u32,
}

fn default_machine_type() -> String {
    "e2-standard-2".to_string()
}

fn default_node_count() -> u32 {
    4
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: None,
            location: None,
            machine_type: default_machine_type(),
            node_count: default_node_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// ManifestConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("release/kubernetes-manifests.yaml")
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadinessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Workload-name patterns never gated on. Literal names or `*` globs.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default)]
    pub scheduling: Scheduling,
}

fn default_exclude() -> Vec<String> {
    vec![DEFAULT_EXCLUDED_WORKLOAD.to_string()]
}

fn default_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            exclude: default_exclude(),
            timeout_seconds: default_timeout(),
            poll_interval_seconds: default_poll_interval(),
            scheduling: Scheduling::default(),
        }
    }
}

impl ReadinessConfig {
    pub fn gate_options(&self) -> GateOptions {
        GateOptions {
            timeout_per_workload: Duration::from_secs(self.timeout_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds.max(1)),
            scheduling: self.scheduling,
        }
    }

    pub fn exclusions(&self) -> Result<NamePatterns> {
        NamePatterns::new(self.exclude.iter().cloned())
    }
}

// ---------------------------------------------------------------------------
// DashboardsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardsConfig {
    #[serde(default = "default_dashboards_dir")]
    pub dir: PathBuf,
    /// Cloud project that owns the dashboards.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

fn default_dashboards_dir() -> PathBuf {
    PathBuf::from("dashboards")
}

fn default_endpoint() -> String {
    "https://monitoring.googleapis.com".to_string()
}

impl Default for DashboardsConfig {
    fn default() -> Self {
        Self {
            dir: default_dashboards_dir(),
            project: None,
            endpoint: default_endpoint(),
            duplicates: DuplicatePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    /// Ordered deployment targets; each is also the namespace name.
    #[serde(default)]
    pub environments: Vec<String>,
    /// Used when `environments` is empty.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub manifests: ManifestConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub dashboards: DashboardsConfig,
}

fn default_version() -> u32 {
    1
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            environments: vec!["staging".to_string(), "production".to_string()],
            default_namespace: default_namespace(),
            cluster: ClusterConfig::default(),
            manifests: ManifestConfig::default(),
            readiness: ReadinessConfig::default(),
            dashboards: DashboardsConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RollgateError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Ordered, deduplicated environments to operate over.
    pub fn environments(&self) -> Result<Vec<String>> {
        crate::environment::enumerate(&self.environments, &self.default_namespace)
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.manifests.path)
    }

    pub fn dashboards_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.dashboards.dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        // 1. Environment set must be non-empty and every name a namespace label
        match self.environments() {
            Ok(envs) => {
                for env in &envs {
                    if let Err(e) = paths::validate_environment(env) {
                        warnings.push(error(e.to_string()));
                    }
                }
                if envs.len() < self.environments.len() {
                    warnings.push(warning(
                        "duplicate entries in environments; later ones are ignored".to_string(),
                    ));
                }
            }
            Err(e) => warnings.push(error(e.to_string())),
        }

        // 2. Readiness budget
        if self.readiness.timeout_seconds == 0 {
            warnings.push(error(
                "readiness.timeout_seconds is 0; no workload could ever become ready".to_string(),
            ));
        } else if self.readiness.poll_interval_seconds > self.readiness.timeout_seconds {
            warnings.push(warning(format!(
                "readiness.poll_interval_seconds ({}) exceeds timeout_seconds ({}); each workload is polled at most twice",
                self.readiness.poll_interval_seconds, self.readiness.timeout_seconds
            )));
        }

        // 3. Exclusion patterns
        if self.readiness.exclude.iter().any(|p| p.trim().is_empty()) {
            warnings.push(warning(
                "readiness.exclude contains an empty pattern".to_string(),
            ));
        }

        // 4. Cluster shape
        if self.cluster.node_count == 0 {
            warnings.push(warning("cluster.node_count is 0".to_string()));
        }

        // 5. Dashboards need a project to sync against
        if self.dashboards.project.as_deref().map_or(true, |p| p.trim().is_empty()) {
            warnings.push(warning(
                "dashboards.project is not set; sync-dashboards requires --project".to_string(),
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("boutique");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "boutique");
        assert_eq!(parsed.environments, vec!["staging", "production"]);
        assert_eq!(parsed.readiness.exclude, vec!["loadgenerator"]);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let yaml = "project:\n  name: boutique\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert!(cfg.environments.is_empty());
        assert_eq!(cfg.environments().unwrap(), vec!["default"]);
        assert_eq!(cfg.readiness.timeout_seconds, 300);
        assert_eq!(cfg.readiness.poll_interval_seconds, 5);
        assert_eq!(cfg.readiness.scheduling, Scheduling::Sequential);
        assert_eq!(cfg.dashboards.duplicates, DuplicatePolicy::Reject);
        assert_eq!(
            cfg.manifests.path,
            PathBuf::from("release/kubernetes-manifests.yaml")
        );
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
version: 1
project:
  name: boutique
environments: [staging, production, staging]
cluster:
  name: demo
  location: us-central1-a
  machine_type: e2-standard-4
  node_count: 3
readiness:
  exclude: [loadgenerator, "canary-*"]
  timeout_seconds: 120
  scheduling: parallel
dashboards:
  dir: monitoring/dashboards
  project: my-project
  duplicates: last_wins
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.environments().unwrap(), vec!["staging", "production"]);
        assert_eq!(cfg.cluster.node_count, 3);
        assert_eq!(cfg.readiness.scheduling, Scheduling::Parallel);
        assert_eq!(cfg.dashboards.duplicates, DuplicatePolicy::LastWins);
        let opts = cfg.readiness.gate_options();
        assert_eq!(opts.timeout_per_workload, Duration::from_secs(120));
        let exclude = cfg.readiness.exclusions().unwrap();
        assert_eq!(exclude.patterns().len(), 2);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(RollgateError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("boutique");
        cfg.dashboards.project = Some("my-project".into());
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.dashboards.project.as_deref(), Some("my-project"));
    }

    #[test]
    fn validate_clean_config() {
        let mut cfg = Config::new("boutique");
        cfg.dashboards.project = Some("my-project".into());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_environment_name() {
        let mut cfg = Config::new("boutique");
        cfg.environments = vec!["Prod_EU".into()];
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("Prod_EU")));
    }

    #[test]
    fn validate_flags_empty_fallback() {
        let mut cfg = Config::new("boutique");
        cfg.environments.clear();
        cfg.default_namespace = String::new();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn validate_flags_duplicates_and_zero_timeout() {
        let mut cfg = Config::new("boutique");
        cfg.environments = vec!["staging".into(), "staging".into()];
        cfg.readiness.timeout_seconds = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("timeout_seconds")));
    }

    #[test]
    fn validate_warns_missing_dashboard_project() {
        let cfg = Config::new("boutique");
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("dashboards.project")));
    }
}
