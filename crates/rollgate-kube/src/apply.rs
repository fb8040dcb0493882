//! Manifest application through the `kubectl` binary.
//!
//! Server-side merge of arbitrary multi-document bundles is what `kubectl
//! apply` already does well, so rollgate shells out rather than
//! re-implementing it.

use crate::error::{KubeError, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

pub fn kubectl_apply_args(manifest: &Path, namespace: &str) -> Vec<OsString> {
    vec![
        "apply".into(),
        "--namespace".into(),
        namespace.into(),
        "--filename".into(),
        manifest.as_os_str().to_owned(),
    ]
}

/// Apply `manifest` into `namespace`. Returns kubectl's stdout.
pub async fn apply_manifests(manifest: &Path, namespace: &str) -> Result<String> {
    if !manifest.exists() {
        return Err(KubeError::ManifestMissing(manifest.display().to_string()));
    }
    let kubectl = which::which("kubectl").map_err(|_| KubeError::KubectlNotFound)?;

    let output = Command::new(kubectl)
        .args(kubectl_apply_args(manifest, namespace))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KubeError::Kubectl {
            namespace: namespace.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().chars().take(500).collect(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    info!(
        namespace,
        manifest = %manifest.display(),
        resources = stdout.lines().count(),
        "manifests applied"
    );
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_args_target_namespace_and_file() {
        let args = kubectl_apply_args(Path::new("release/manifests.yaml"), "staging");
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "apply",
                "--namespace",
                "staging",
                "--filename",
                "release/manifests.yaml"
            ]
        );
    }

    #[tokio::test]
    async fn missing_manifest_fails_before_kubectl() {
        let dir = TempDir::new().unwrap();
        let err = apply_manifests(&dir.path().join("absent.yaml"), "staging")
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::ManifestMissing(_)));
    }
}
