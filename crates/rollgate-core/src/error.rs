use crate::readiness::ReadinessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollgateError {
    #[error("not initialized: run 'rollgate init'")]
    NotInitialized,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no environments configured and the fallback namespace is empty")]
    EmptyEnvironments,

    #[error("invalid environment name '{0}': must be a lowercase DNS-1123 label")]
    InvalidEnvironment(String),

    #[error("duplicate dashboard displayName '{display_name}' in {first} and {second}")]
    DuplicateDisplayName {
        display_name: String,
        first: String,
        second: String,
    },

    #[error("dashboard definition {0} has no displayName")]
    MissingDisplayName(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RollgateError {
    /// Short machine-readable failure kind, used in CLI reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RollgateError::Readiness(e) => e.kind(),
            RollgateError::Provisioning(_) => "provisioning",
            RollgateError::NotInitialized
            | RollgateError::Config(_)
            | RollgateError::EmptyEnvironments
            | RollgateError::InvalidEnvironment(_)
            | RollgateError::DuplicateDisplayName { .. }
            | RollgateError::MissingDisplayName(_)
            | RollgateError::Pipeline(_) => "configuration",
            RollgateError::Io(_) | RollgateError::Yaml(_) | RollgateError::Json(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, RollgateError>;
