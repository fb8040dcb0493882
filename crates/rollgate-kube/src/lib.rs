//! Kubernetes side of rollgate.
//!
//! - [`KubeOrchestrator`] lists Deployments and reports their rollout status
//!   for the readiness gate, creates namespaces and reads the cluster identity.
//! - [`apply::apply_manifests`] pushes a manifest bundle into a namespace.
//! - [`rollout::deployment_rollout_status`] is the pure status derivation,
//!   usable without a cluster.

pub mod apply;
pub mod error;
pub mod orchestrator;
pub mod rollout;

pub use error::{KubeError, Result};
pub use orchestrator::KubeOrchestrator;
