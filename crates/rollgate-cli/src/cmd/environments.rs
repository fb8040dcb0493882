use crate::output::{print_json, print_table};
use anyhow::Context;
use rollgate_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let envs = config.environments()?;
    let fallback = config.environments.is_empty();

    if json {
        return print_json(&serde_json::json!({
            "environments": envs,
            "fallback": fallback,
        }));
    }

    let rows = envs
        .iter()
        .enumerate()
        .map(|(i, env)| {
            let source = if fallback { "default_namespace" } else { "environments" };
            vec![(i + 1).to_string(), env.clone(), source.to_string()]
        })
        .collect();
    print_table(&["#", "ENVIRONMENT", "SOURCE"], rows);
    Ok(())
}
