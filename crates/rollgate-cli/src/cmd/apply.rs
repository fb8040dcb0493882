use crate::cmd::cancel_on_ctrl_c;
use crate::output::{print_json, print_table};
use anyhow::Context;
use rollgate_core::cancel::CancelToken;
use rollgate_core::config::Config;
use rollgate_core::environment;
use rollgate_core::pipeline::{
    first_failure, plan_environment, Pipeline, PlanInputs, Step, StepExecutor, StepKind,
    StepOutcome, StepReport,
};
use rollgate_core::readiness::{await_ready, GateOptions, NamePatterns, ReadinessReport};
use rollgate_core::state::State;
use rollgate_core::{io, paths, RollgateError};
use rollgate_kube::{apply::apply_manifests, KubeOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub struct ApplyArgs {
    pub envs: Vec<String>,
    pub cluster_id: Option<String>,
    pub force: bool,
    pub timeout: Option<u64>,
}

/// Runs pipeline steps against the live cluster.
struct KubeStepExecutor<'a> {
    orchestrator: &'a KubeOrchestrator,
    manifest: PathBuf,
    exclude: NamePatterns,
    gate: GateOptions,
    cancel: CancelToken,
    readiness: Mutex<Vec<ReadinessReport>>,
}

impl StepExecutor for KubeStepExecutor<'_> {
    async fn execute(&self, step: &Step) -> rollgate_core::Result<()> {
        let ns = step.environment.as_str();
        match step.kind {
            StepKind::Namespace => {
                self.orchestrator
                    .ensure_namespace(ns)
                    .await
                    .map_err(|e| RollgateError::Provisioning(format!("namespace {ns}: {e}")))?;
            }
            StepKind::Manifests => {
                if self.cancel.is_cancelled() {
                    return Err(RollgateError::Provisioning(format!(
                        "manifests for {ns} not applied: interrupted"
                    )));
                }
                apply_manifests(&self.manifest, ns)
                    .await
                    .map_err(|e| RollgateError::Provisioning(e.to_string()))?;
            }
            StepKind::Readiness => {
                let report =
                    await_ready(self.orchestrator, ns, &self.exclude, &self.gate, &self.cancel)
                        .await?;
                if let Ok(mut reports) = self.readiness.lock() {
                    reports.push(report);
                }
            }
        }
        Ok(())
    }
}

pub fn run(root: &Path, args: ApplyArgs, json: bool) -> anyhow::Result<()> {
    let ApplyArgs {
        envs,
        cluster_id,
        force,
        timeout,
    } = args;
    let config = Config::load(root).context("failed to load config")?;
    let envs = environment::select(&config.environments()?, &envs)?;
    for env in &envs {
        paths::validate_environment(env)?;
    }

    let manifest = config.manifest_path(root);
    let manifests_digest = io::file_digest(&manifest)
        .with_context(|| format!("failed to read manifests at {}", manifest.display()))?;

    let mut gate = config.readiness.gate_options();
    if let Some(secs) = timeout {
        gate.timeout_per_workload = Duration::from_secs(secs);
    }
    let exclude = config.readiness.exclusions()?;

    let mut state = State::load(root).context("failed to load state")?;

    let rt = tokio::runtime::Runtime::new()?;
    let cancel = cancel_on_ctrl_c(&rt);

    let (reports, readiness) = rt.block_on(async {
        let orchestrator = KubeOrchestrator::connect()
            .await
            .context("failed to connect to the Kubernetes cluster")?;
        let cluster_id = match cluster_id {
            Some(id) => id,
            None => orchestrator
                .cluster_identity()
                .await
                .context("failed to read cluster identity")?,
        };
        if state.cluster_id.as_deref().is_some_and(|prev| prev != cluster_id) {
            tracing::warn!(
                previous = state.cluster_id.as_deref().unwrap_or_default(),
                current = %cluster_id,
                "cluster was recreated; every step will run again"
            );
        }

        let inputs = PlanInputs {
            cluster_id: cluster_id.clone(),
            manifests_digest,
        };
        let steps = envs
            .iter()
            .flat_map(|env| plan_environment(env, &inputs))
            .collect();
        let pipeline = Pipeline::new(steps)?;

        let executor = KubeStepExecutor {
            orchestrator: &orchestrator,
            manifest,
            exclude,
            gate,
            cancel,
            readiness: Mutex::new(Vec::new()),
        };
        let reports = pipeline.run(&executor, &mut state.applied, force).await;
        state.cluster_id = Some(cluster_id);
        let readiness = executor.readiness.into_inner().unwrap_or_default();
        anyhow::Ok((reports, readiness))
    })?;

    state.save(root).context("failed to save state")?;

    if json {
        let steps: Vec<_> = reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "step": r.id,
                    "environment": r.environment,
                    "kind": r.kind.as_str(),
                    "outcome": r.outcome.label(),
                    "error": match &r.outcome {
                        StepOutcome::Failed(e) => Some(e.to_string()),
                        _ => None,
                    },
                })
            })
            .collect();
        print_json(&serde_json::json!({ "steps": steps, "readiness": readiness }))?;
    } else {
        let rows = reports
            .iter()
            .map(|r| {
                let detail = match &r.outcome {
                    StepOutcome::Blocked { by } => format!("blocked by {by}"),
                    StepOutcome::Failed(e) => e.kind().to_string(),
                    _ => String::new(),
                };
                vec![r.id.clone(), r.outcome.label().to_string(), detail]
            })
            .collect();
        print_table(&["STEP", "OUTCOME", "DETAIL"], rows);
    }

    if let Some((report, err)) = first_failure(&reports) {
        anyhow::bail!("{}", failure_summary(report, err));
    }
    Ok(())
}

/// One-line report of the first failed step: step id, workload when the
/// failure came from the readiness gate, and the failure kind.
fn failure_summary(report: &StepReport, err: &RollgateError) -> String {
    let workload = match err {
        RollgateError::Readiness(e) => e.workload().map(|w| format!(" workload {w}")),
        _ => None,
    };
    format!(
        "{}{} failed ({}): {err}",
        report.id,
        workload.unwrap_or_default(),
        err.kind()
    )
}
