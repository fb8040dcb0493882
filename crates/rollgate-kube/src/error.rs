use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("kubectl not found on PATH")]
    KubectlNotFound,

    #[error("manifest bundle not found: {0}")]
    ManifestMissing(String),

    #[error("kubectl apply into '{namespace}' exited with {code}: {stderr}")]
    Kubectl {
        namespace: String,
        code: i32,
        stderr: String,
    },

    #[error("cluster identity unavailable: {0}")]
    ClusterIdentity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KubeError>;
