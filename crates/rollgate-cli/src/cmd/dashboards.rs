use crate::output::{print_json, print_table};
use anyhow::Context;
use monitoring_client::{token::resolve_access_token, MonitoringClient, MonitoringStore};
use rollgate_core::config::Config;
use rollgate_core::dashboard::{load_definitions, reconcile, resolve_duplicates};
use std::path::{Path, PathBuf};

pub struct SyncArgs {
    pub dir: Option<PathBuf>,
    pub project: Option<String>,
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
}

pub fn run(root: &Path, args: SyncArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;

    let dir = match args.dir {
        Some(dir) => rollgate_core::paths::resolve(root, &dir),
        None => config.dashboards_dir(root),
    };
    // Local problems (bad JSON, duplicate display names) surface before any
    // credential lookup or network call.
    let defs = load_definitions(&dir)?;
    let defs = resolve_duplicates(defs, config.dashboards.duplicates)?;

    let project = args
        .project
        .or_else(|| config.dashboards.project.clone())
        .filter(|p| !p.trim().is_empty())
        .context("no monitoring project: pass --project or set dashboards.project")?;
    let endpoint = args
        .endpoint
        .unwrap_or_else(|| config.dashboards.endpoint.clone());

    if defs.is_empty() {
        if json {
            print_json(&serde_json::json!([]))?;
        } else {
            println!("No dashboard definitions in {}", dir.display());
        }
        return Ok(());
    }

    let access_token = args.access_token;
    let rt = tokio::runtime::Runtime::new()?;
    let outcomes = rt.block_on(async {
        let token = resolve_access_token(access_token.as_deref()).await?;
        let client = MonitoringClient::new(&endpoint, &project, &token)?;
        let store = MonitoringStore::new(client);
        anyhow::Ok(reconcile(&defs, &store).await)
    })?;

    if json {
        let value: Vec<_> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(action) => serde_json::json!({
                    "display_name": o.display_name,
                    "action": action.label(),
                    "name": action.name(),
                }),
                Err(e) => serde_json::json!({
                    "display_name": o.display_name,
                    "action": "failed",
                    "kind": e.kind(),
                    "retryable": e.is_retryable(),
                    "error": e.to_string(),
                }),
            })
            .collect();
        print_json(&value)?;
    } else {
        let rows = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(action) => vec![
                    o.display_name.clone(),
                    action.label().to_string(),
                    action.name().to_string(),
                ],
                Err(e) => vec![o.display_name.clone(), "failed".to_string(), e.to_string()],
            })
            .collect();
        print_table(&["DASHBOARD", "ACTION", "NAME"], rows);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} dashboards failed to reconcile", outcomes.len());
    }
    Ok(())
}
