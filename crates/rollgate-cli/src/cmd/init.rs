use anyhow::Context;
use rollgate_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing rollgate in: {}", root.display());

    let dir = paths::rollgate_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config = if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config.yaml")?
    } else {
        let config = Config::new(&project_name);
        config.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        config
    };

    let dashboards = config.dashboards_dir(root);
    io::ensure_dir(&dashboards)
        .with_context(|| format!("failed to create {}", dashboards.display()))?;

    println!("\nNext: set dashboards.project and review environments in {}", paths::CONFIG_FILE);
    Ok(())
}
