//! OAuth access token discovery.
//!
//! An explicit token wins. Otherwise the token is borrowed from the local
//! `gcloud` installation, the same credential an operator would use by hand.

use crate::error::{MonitoringError, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub const TOKEN_ENV: &str = "ROLLGATE_ACCESS_TOKEN";

pub async fn resolve_access_token(explicit: Option<&str>) -> Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    gcloud_access_token().await
}

async fn gcloud_access_token() -> Result<String> {
    let gcloud = which::which("gcloud").map_err(|_| {
        MonitoringError::Token(format!(
            "no token given and gcloud not found on PATH (set {TOKEN_ENV} or --access-token)"
        ))
    })?;
    debug!(gcloud = %gcloud.display(), "requesting access token from gcloud");
    let output = Command::new(gcloud)
        .args(["auth", "print-access-token"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| MonitoringError::Token(format!("failed to run gcloud: {e}")))?;
    if !output.status.success() {
        return Err(MonitoringError::Token(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(MonitoringError::Token("gcloud printed an empty token".into()));
    }
    Ok(token)
}
