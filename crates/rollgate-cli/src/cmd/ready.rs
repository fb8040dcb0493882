use crate::cmd::cancel_on_ctrl_c;
use crate::output::{print_json, print_table};
use anyhow::Context;
use rollgate_core::config::Config;
use rollgate_core::environment;
use rollgate_core::readiness::{await_ready, ReadinessError, ReadinessReport};
use rollgate_kube::KubeOrchestrator;
use std::path::Path;
use std::time::Duration;

/// Gate each environment in turn. Environments are independent: a failure in
/// one is reported and the rest are still checked.
pub fn run(root: &Path, envs: &[String], timeout: Option<u64>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let envs = environment::select(&config.environments()?, envs)?;
    let mut gate = config.readiness.gate_options();
    if let Some(secs) = timeout {
        gate.timeout_per_workload = Duration::from_secs(secs);
    }
    let exclude = config.readiness.exclusions()?;

    let rt = tokio::runtime::Runtime::new()?;
    let cancel = cancel_on_ctrl_c(&rt);

    let results: Vec<(String, Result<ReadinessReport, ReadinessError>)> = rt.block_on(async {
        let orchestrator = KubeOrchestrator::connect()
            .await
            .context("failed to connect to the Kubernetes cluster")?;
        let mut results = Vec::with_capacity(envs.len());
        for env in &envs {
            let result = await_ready(&orchestrator, env, &exclude, &gate, &cancel).await;
            results.push((env.clone(), result));
        }
        anyhow::Ok(results)
    })?;

    if json {
        let value: Vec<_> = results
            .iter()
            .map(|(env, result)| match result {
                Ok(report) => serde_json::json!({ "environment": env, "ready": true, "report": report }),
                Err(e) => serde_json::json!({
                    "environment": env,
                    "ready": false,
                    "kind": e.kind(),
                    "workload": e.workload(),
                    "error": e.to_string(),
                }),
            })
            .collect();
        print_json(&value)?;
    } else {
        let rows = results
            .iter()
            .map(|(env, result)| match result {
                Ok(report) => vec![
                    env.clone(),
                    "ready".to_string(),
                    format!(
                        "{} gated, {} excluded, {}ms",
                        report.ready.len(),
                        report.excluded.len(),
                        report.elapsed_ms
                    ),
                ],
                Err(e) => vec![
                    env.clone(),
                    e.kind().to_string(),
                    e.workload().unwrap_or("-").to_string(),
                ],
            })
            .collect();
        print_table(&["ENVIRONMENT", "STATUS", "DETAIL"], rows);
    }

    if let Some((env, err)) = results.iter().find_map(|(env, r)| r.as_ref().err().map(|e| (env, e))) {
        anyhow::bail!("{}", not_ready_summary(env, err));
    }
    Ok(())
}

fn not_ready_summary(env: &str, err: &ReadinessError) -> String {
    format!(
        "environment {env} not ready: first failure {} ({}): {err}",
        err.workload().unwrap_or("<listing>"),
        err.kind()
    )
}
