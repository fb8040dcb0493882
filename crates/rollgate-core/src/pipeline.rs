//! Explicit provisioning chain: named steps, declared dependencies, declared
//! triggers.
//!
//! A [`Pipeline`] is a validated DAG of [`Step`]s in a fixed topological
//! order. Running it evaluates each step against the [`TriggerLedger`]:
//! a step runs when forced, when one of its dependencies ran in this pass,
//! or when its triggers changed since its last success. A failed step blocks
//! its dependents and leaves its ledger entry untouched, so the next run
//! retries it.

use crate::error::{Result, RollgateError};
use crate::trigger::{TriggerLedger, TriggerSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

pub const TRIGGER_CLUSTER: &str = "cluster";
pub const TRIGGER_NAMESPACE: &str = "namespace";
pub const TRIGGER_MANIFESTS: &str = "manifests";

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Create the environment's namespace if absent.
    Namespace,
    /// Apply the deployment manifests into the namespace.
    Manifests,
    /// Block until the namespace's workloads have rolled out.
    Readiness,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Namespace => "namespace",
            StepKind::Manifests => "manifests",
            StepKind::Readiness => "readiness",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub environment: String,
    pub depends_on: Vec<String>,
    pub triggers: TriggerSet,
}

pub fn step_id(environment: &str, kind: StepKind) -> String {
    format!("{environment}/{kind}")
}

/// Upstream identities that parameterize an environment's chain.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    /// Incarnation of the cluster; changes only when it is recreated.
    pub cluster_id: String,
    /// Digest of the manifest bundle.
    pub manifests_digest: String,
}

/// namespace → manifests → readiness for one environment.
pub fn plan_environment(environment: &str, inputs: &PlanInputs) -> Vec<Step> {
    let base = TriggerSet::new()
        .with(TRIGGER_CLUSTER, inputs.cluster_id.as_str())
        .with(TRIGGER_NAMESPACE, environment);
    let with_manifests = base
        .clone()
        .with(TRIGGER_MANIFESTS, inputs.manifests_digest.as_str());

    let namespace = step_id(environment, StepKind::Namespace);
    let manifests = step_id(environment, StepKind::Manifests);
    let readiness = step_id(environment, StepKind::Readiness);

    vec![
        Step {
            id: namespace.clone(),
            kind: StepKind::Namespace,
            environment: environment.to_string(),
            depends_on: vec![],
            triggers: base,
        },
        Step {
            id: manifests.clone(),
            kind: StepKind::Manifests,
            environment: environment.to_string(),
            depends_on: vec![namespace],
            triggers: with_manifests.clone(),
        },
        Step {
            id: readiness,
            kind: StepKind::Readiness,
            environment: environment.to_string(),
            depends_on: vec![manifests],
            triggers: with_manifests,
        },
    ]
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[allow(async_fn_in_trait)]
pub trait StepExecutor {
    async fn execute(&self, step: &Step) -> Result<()>;
}

#[derive(Debug)]
pub enum StepOutcome {
    Applied,
    UpToDate,
    Failed(RollgateError),
    /// Not attempted because the named upstream step failed.
    Blocked { by: String },
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Applied => "applied",
            StepOutcome::UpToDate => "up-to-date",
            StepOutcome::Failed(_) => "failed",
            StepOutcome::Blocked { .. } => "blocked",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_) | StepOutcome::Blocked { .. })
    }
}

#[derive(Debug)]
pub struct StepReport {
    pub id: String,
    pub kind: StepKind,
    pub environment: String,
    pub outcome: StepOutcome,
}

/// The first step that actually failed, with its error.
pub fn first_failure(reports: &[StepReport]) -> Option<(&StepReport, &RollgateError)> {
    reports.iter().find_map(|r| match &r.outcome {
        StepOutcome::Failed(e) => Some((r, e)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Validate the step graph and fix a stable topological order: among
    /// ready steps, the one declared first goes first.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let mut ids = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(RollgateError::Pipeline(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }
        for step in &steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(RollgateError::Pipeline(format!(
                        "step '{}' depends on unknown step '{dep}'",
                        step.id
                    )));
                }
            }
        }

        let mut remaining = steps;
        let mut ordered: Vec<Step> = Vec::with_capacity(remaining.len());
        let mut placed: HashSet<String> = HashSet::new();
        while !remaining.is_empty() {
            let Some(idx) = remaining
                .iter()
                .position(|s| s.depends_on.iter().all(|d| placed.contains(d)))
            else {
                let stuck: Vec<&str> = remaining.iter().map(|s| s.id.as_str()).collect();
                return Err(RollgateError::Pipeline(format!(
                    "dependency cycle among steps: {}",
                    stuck.join(", ")
                )));
            };
            let step = remaining.remove(idx);
            placed.insert(step.id.clone());
            ordered.push(step);
        }
        Ok(Self { steps: ordered })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub async fn run<E: StepExecutor>(
        &self,
        executor: &E,
        ledger: &mut TriggerLedger,
        force: bool,
    ) -> Vec<StepReport> {
        let mut applied: HashSet<&str> = HashSet::new();
        // failed or blocked step id → id of the step that actually failed
        let mut broken: HashMap<&str, String> = HashMap::new();
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let outcome = if let Some(root) = step
                .depends_on
                .iter()
                .find_map(|d| broken.get(d.as_str()).cloned())
            {
                warn!(step = %step.id, blocked_by = %root, "step blocked");
                broken.insert(step.id.as_str(), root.clone());
                StepOutcome::Blocked { by: root }
            } else {
                let upstream_ran = step.depends_on.iter().any(|d| applied.contains(d.as_str()));
                let changed = ledger.must_rerun(&step.id, &step.triggers);
                if !(force || upstream_ran || changed) {
                    info!(step = %step.id, "up to date");
                    StepOutcome::UpToDate
                } else {
                    info!(step = %step.id, force, upstream_ran, changed, "running step");
                    match executor.execute(step).await {
                        Ok(()) => {
                            ledger.record_success(&step.id, step.triggers.clone());
                            applied.insert(step.id.as_str());
                            StepOutcome::Applied
                        }
                        Err(e) => {
                            warn!(step = %step.id, error = %e, "step failed");
                            broken.insert(step.id.as_str(), step.id.clone());
                            StepOutcome::Failed(e)
                        }
                    }
                }
            };
            reports.push(StepReport {
                id: step.id.clone(),
                kind: step.kind,
                environment: step.environment.clone(),
                outcome,
            });
        }
        reports
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
