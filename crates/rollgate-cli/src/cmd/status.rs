use crate::output::{print_json, print_table};
use anyhow::Context;
use rollgate_core::config::{ClusterConfig, Config};
use rollgate_core::state::State;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let state = State::load(root).context("failed to load state")?;

    if json {
        return print_json(&serde_json::json!({
            "declared_cluster": config.cluster,
            "cluster_id": state.cluster_id,
            "applied": state.applied,
            "last_updated": state.last_updated,
        }));
    }

    println!("declared cluster: {}", describe_cluster(&config.cluster));
    if let Some(id) = &state.cluster_id {
        println!("cluster: {id}");
    }
    if state.applied.is_empty() {
        println!("No steps applied yet.");
        return Ok(());
    }

    let rows = state
        .applied
        .iter()
        .map(|(step, entry)| {
            let triggers: Vec<String> = entry
                .triggers
                .iter()
                .map(|(k, v)| format!("{k}={}", abbreviate(v)))
                .collect();
            vec![
                step.to_string(),
                entry.applied_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                triggers.join(" "),
            ]
        })
        .collect();
    print_table(&["STEP", "APPLIED", "TRIGGERS"], rows);
    Ok(())
}

fn describe_cluster(cluster: &ClusterConfig) -> String {
    format!(
        "{} in {}, {} x {}",
        cluster.name.as_deref().unwrap_or("<unnamed>"),
        cluster.location.as_deref().unwrap_or("<no location>"),
        cluster.node_count,
        cluster.machine_type
    )
}

/// Digests and UIDs are long; the first 12 characters identify them well enough.
fn abbreviate(value: &str) -> &str {
    match value.char_indices().nth(12) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviate_keeps_short_values() {
        assert_eq!(abbreviate("staging"), "staging");
        assert_eq!(abbreviate("0123456789abcdef"), "0123456789ab");
    }

    #[test]
    fn describe_cluster_fills_unset_fields() {
        let mut cluster = ClusterConfig::default();
        assert_eq!(
            describe_cluster(&cluster),
            "<unnamed> in <no location>, 4 x e2-standard-2"
        );
        cluster.name = Some("demo".into());
        cluster.location = Some("us-central1-a".into());
        cluster.node_count = 3;
        assert_eq!(describe_cluster(&cluster), "demo in us-central1-a, 3 x e2-standard-2");
    }
}
