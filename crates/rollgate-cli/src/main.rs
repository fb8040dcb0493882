mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rollgate",
    about = "Apply manifests per environment, gate on rollout readiness, and reconcile monitoring dashboards",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .rollgate/ or .git/)
    #[arg(long, global = true, env = "ROLLGATE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter .rollgate/config.yaml
    Init,

    /// List the environments rollgate operates over
    Environments,

    /// Create namespaces, apply manifests and wait for readiness, per environment
    Apply {
        /// Restrict to these environments (repeatable)
        #[arg(long = "env", value_name = "ENV")]
        envs: Vec<String>,

        /// Cluster identity to record instead of asking the cluster
        #[arg(long)]
        cluster_id: Option<String>,

        /// Re-run every step regardless of recorded triggers
        #[arg(long)]
        force: bool,

        /// Per-workload readiness timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Wait for every non-excluded workload to finish rolling out
    Ready {
        /// Restrict to these environments (repeatable)
        #[arg(long = "env", value_name = "ENV")]
        envs: Vec<String>,

        /// Per-workload readiness timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Upsert local dashboard definitions into the monitoring project
    SyncDashboards {
        /// Directory of *.json dashboard definitions
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Monitoring project id
        #[arg(long)]
        project: Option<String>,

        /// Monitoring API base URL
        #[arg(long)]
        endpoint: Option<String>,

        /// OAuth access token (default: `gcloud auth print-access-token`)
        #[arg(long, env = "ROLLGATE_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,
    },

    /// Show the applied-step ledger
    Status,

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Apply { .. } | Commands::Ready { .. } | Commands::SyncDashboards { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Environments => cmd::environments::run(&root, cli.json),
        Commands::Apply {
            envs,
            cluster_id,
            force,
            timeout,
        } => cmd::apply::run(
            &root,
            cmd::apply::ApplyArgs {
                envs,
                cluster_id,
                force,
                timeout,
            },
            cli.json,
        ),
        Commands::Ready { envs, timeout } => cmd::ready::run(&root, &envs, timeout, cli.json),
        Commands::SyncDashboards {
            dir,
            project,
            endpoint,
            access_token,
        } => cmd::dashboards::run(
            &root,
            cmd::dashboards::SyncArgs {
                dir,
                project,
                endpoint,
                access_token,
            },
            cli.json,
        ),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
