use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("monitoring API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("access token unavailable: {0}")]
    Token(String),
}

impl MonitoringError {
    /// HTTP status of an API rejection, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            MonitoringError::Api { status, .. } => Some(*status),
            MonitoringError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitoringError>;
