//! Readiness gate: block until every gated workload of an environment has
//! finished rolling out.
//!
//! Workloads are listed, filtered through an injected [`WorkloadMatcher`]
//! (the exclusion set), sorted by name, and polled until each reports
//! [`RolloutStatus::Succeeded`] or its per-workload budget runs out.
//!
//! With [`Scheduling::Sequential`] the first failing workload aborts the
//! gate and the remaining ones are never queried. With
//! [`Scheduling::Parallel`] every workload is polled to completion and the
//! failure of the lowest-index workload is reported, so both modes give the
//! same answer for the same cluster state.

use crate::cancel::CancelToken;
use crate::error::{Result as CoreResult, RollgateError};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Workload excluded from gating unless configured otherwise. It generates
/// synthetic traffic; its readiness says nothing about platform health and
/// used to fail the gate spuriously.
pub const DEFAULT_EXCLUDED_WORKLOAD: &str = "loadgenerator";

// ---------------------------------------------------------------------------
// Workloads and the orchestrator capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    /// Resource kind, e.g. `Deployment`.
    pub kind: String,
}

impl Workload {
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "Deployment".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutStatus {
    /// Still converging; the string says what is being waited on.
    InProgress(String),
    Succeeded,
    /// The orchestrator gave up on the rollout (e.g. progress deadline exceeded).
    Failed(String),
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct OrchestratorError(pub String);

/// Namespace-scoped view of workloads. Implementations only observe, the
/// gate never mutates workloads.
#[allow(async_fn_in_trait)]
pub trait WorkloadOrchestrator {
    async fn list_workloads(
        &self,
        namespace: &str,
    ) -> std::result::Result<Vec<Workload>, OrchestratorError>;

    async fn rollout_status(
        &self,
        namespace: &str,
        workload: &str,
    ) -> std::result::Result<RolloutStatus, OrchestratorError>;
}

// ---------------------------------------------------------------------------
// Exclusion
// ---------------------------------------------------------------------------

pub trait WorkloadMatcher {
    fn matches(&self, name: &str) -> bool;
}

impl<F> WorkloadMatcher for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, name: &str) -> bool {
        self(name)
    }
}

/// Set of workload-name patterns. A pattern is a literal name or a glob
/// where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct NamePatterns {
    patterns: Vec<String>,
    compiled: Vec<Regex>,
}

impl NamePatterns {
    pub fn new<I, S>(patterns: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in &patterns {
            let body = p
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let re = Regex::new(&format!("^{body}$")).map_err(|e| {
                RollgateError::Config(format!("invalid exclusion pattern '{p}': {e}"))
            })?;
            compiled.push(re);
        }
        Ok(Self { patterns, compiled })
    }

    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
            compiled: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for NamePatterns {
    fn default() -> Self {
        Self {
            patterns: vec![DEFAULT_EXCLUDED_WORKLOAD.to_string()],
            compiled: vec![Regex::new(&format!("^{DEFAULT_EXCLUDED_WORKLOAD}$")).unwrap()],
        }
    }
}

impl WorkloadMatcher for NamePatterns {
    fn matches(&self, name: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(name))
    }
}

// ---------------------------------------------------------------------------
// Options, report, errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduling {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone)]
pub struct GateOptions {
    pub timeout_per_workload: Duration,
    pub poll_interval: Duration,
    pub scheduling: Scheduling,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            timeout_per_workload: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            scheduling: Scheduling::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub namespace: String,
    /// Gated workloads, in the order they were checked.
    pub ready: Vec<String>,
    pub excluded: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Error)]
pub enum ReadinessError {
    #[error(
        "workload {namespace}/{workload} did not finish rolling out within {}s",
        .timeout.as_secs()
    )]
    TimedOut {
        namespace: String,
        workload: String,
        timeout: Duration,
    },

    #[error("workload {namespace}/{workload} rollout failed: {message}")]
    RolloutFailed {
        namespace: String,
        workload: String,
        message: String,
    },

    #[error("cancelled while waiting on {namespace}/{}", .workload.as_deref().unwrap_or("*"))]
    Cancelled {
        namespace: String,
        workload: Option<String>,
    },

    #[error("failed to list workloads in {namespace}: {source}")]
    ListFailed {
        namespace: String,
        #[source]
        source: OrchestratorError,
    },

    #[error("rollout status of {namespace}/{workload} unavailable until the deadline: {source}")]
    StatusUnavailable {
        namespace: String,
        workload: String,
        #[source]
        source: OrchestratorError,
    },
}

impl ReadinessError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReadinessError::TimedOut { .. } => "timeout",
            ReadinessError::RolloutFailed { .. } => "rollout-failed",
            ReadinessError::Cancelled { .. } => "cancelled",
            ReadinessError::ListFailed { .. } => "list-failed",
            ReadinessError::StatusUnavailable { .. } => "status-unavailable",
        }
    }

    pub fn workload(&self) -> Option<&str> {
        match self {
            ReadinessError::TimedOut { workload, .. }
            | ReadinessError::RolloutFailed { workload, .. }
            | ReadinessError::StatusUnavailable { workload, .. } => Some(workload),
            ReadinessError::Cancelled { workload, .. } => workload.as_deref(),
            ReadinessError::ListFailed { .. } => None,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            ReadinessError::TimedOut { namespace, .. }
            | ReadinessError::RolloutFailed { namespace, .. }
            | ReadinessError::Cancelled { namespace, .. }
            | ReadinessError::ListFailed { namespace, .. }
            | ReadinessError::StatusUnavailable { namespace, .. } => namespace,
        }
    }

    /// A failed rollout means a bad deployment; everything else may clear up
    /// on a later apply cycle.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReadinessError::RolloutFailed { .. })
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Wait for every non-excluded workload in `namespace` to finish rolling out.
///
/// Worst-case blocking time is `timeout_per_workload` times the number of
/// gated workloads. An environment whose workloads are all excluded (or that
/// has none) succeeds without polling anything.
pub async fn await_ready<O, M>(
    orchestrator: &O,
    namespace: &str,
    exclude: &M,
    options: &GateOptions,
    cancel: &CancelToken,
) -> std::result::Result<ReadinessReport, ReadinessError>
where
    O: WorkloadOrchestrator,
    M: WorkloadMatcher + ?Sized,
{
    let started = Instant::now();

    let listed = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(ReadinessError::Cancelled {
                namespace: namespace.to_string(),
                workload: None,
            });
        }
        res = orchestrator.list_workloads(namespace) => res,
    }
    .map_err(|source| ReadinessError::ListFailed {
        namespace: namespace.to_string(),
        source,
    })?;

    let (excluded, mut gated): (Vec<Workload>, Vec<Workload>) =
        listed.into_iter().partition(|w| exclude.matches(&w.name));
    gated.sort_by(|a, b| a.name.cmp(&b.name));
    gated.dedup_by(|a, b| a.name == b.name);
    let mut excluded: Vec<String> = excluded.into_iter().map(|w| w.name).collect();
    excluded.sort();

    info!(
        namespace,
        gated = gated.len(),
        excluded = ?excluded,
        "waiting for rollouts"
    );

    let names: Vec<&str> = gated.iter().map(|w| w.name.as_str()).collect();
    match options.scheduling {
        Scheduling::Sequential => {
            for name in &names {
                poll_workload(orchestrator, namespace, name, options, cancel).await?;
            }
        }
        Scheduling::Parallel => {
            let results = join_all(
                names
                    .iter()
                    .map(|name| poll_workload(orchestrator, namespace, name, options, cancel)),
            )
            .await;
            // Results come back in input (lexical) order: the first error is
            // the lowest-index failure.
            if let Some(err) = results.into_iter().find_map(|r| r.err()) {
                return Err(err);
            }
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(namespace, elapsed_ms, "environment ready");
    Ok(ReadinessReport {
        namespace: namespace.to_string(),
        ready: names.iter().map(|s| s.to_string()).collect(),
        excluded,
        elapsed_ms,
    })
}

/// Poll one workload until it settles, its budget runs out, or the run is
/// cancelled. Status-query errors are treated as transient until the
/// deadline; the last one is reported if the budget runs out.
async fn poll_workload<O>(
    orchestrator: &O,
    namespace: &str,
    workload: &str,
    options: &GateOptions,
    cancel: &CancelToken,
) -> std::result::Result<(), ReadinessError>
where
    O: WorkloadOrchestrator,
{
    let cancelled = || ReadinessError::Cancelled {
        namespace: namespace.to_string(),
        workload: Some(workload.to_string()),
    };

    let deadline = Instant::now() + options.timeout_per_workload;
    let mut last_error: Option<OrchestratorError> = None;

    loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            res = tokio::time::timeout_at(deadline, orchestrator.rollout_status(namespace, workload)) => res,
        };

        match polled {
            Err(_) => break,
            Ok(Ok(RolloutStatus::Succeeded)) => {
                debug!(namespace, workload, "rollout complete");
                return Ok(());
            }
            Ok(Ok(RolloutStatus::Failed(message))) => {
                warn!(namespace, workload, %message, "rollout failed");
                return Err(ReadinessError::RolloutFailed {
                    namespace: namespace.to_string(),
                    workload: workload.to_string(),
                    message,
                });
            }
            Ok(Ok(RolloutStatus::InProgress(reason))) => {
                last_error = None;
                debug!(namespace, workload, %reason, "rollout in progress");
            }
            Ok(Err(e)) => {
                warn!(namespace, workload, error = %e, "rollout status query failed");
                last_error = Some(e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let pause = options.poll_interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(pause) => {}
        }
    }

    Err(match last_error {
        Some(source) => ReadinessError::StatusUnavailable {
            namespace: namespace.to_string(),
            workload: workload.to_string(),
            source,
        },
        None => ReadinessError::TimedOut {
            namespace: namespace.to_string(),
            workload: workload.to_string(),
            timeout: options.timeout_per_workload,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
