mod cmd;
mod output;

use clap::{Parser, Subcommand};
use nexus_sync::SyncConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nexus",
    about = "Operator console for the Nexus agent pipeline — watch pulses, review proposals, manage connections",
    version,
    propagate_version = true
)]
struct Cli {
    /// Backend REST base URL
    #[arg(long, global = true, env = "NEXUS_API")]
    api: Option<String>,

    /// Backend push-channel base URL
    #[arg(long, global = true, env = "NEXUS_WS")]
    ws: Option<String>,

    /// Project to operate on
    #[arg(long, short = 'p', global = true, env = "NEXUS_PROJECT", default_value = "nexus")]
    project: String,

    /// Load sync settings from a YAML file (flags still override)
    #[arg(long, global = true, env = "NEXUS_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live agent pulses and telemetry for the project
    Watch,

    /// List pipeline runs, or show one in detail
    Runs {
        /// Run id to show in detail
        #[arg(long)]
        id: Option<String>,

        /// With --id, print the run's telemetry log instead
        #[arg(long)]
        logs: bool,
    },

    /// Trigger a new pipeline run
    Trigger {
        /// What this run should do
        description: String,

        /// Source platform to ingest from (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Approve a pending run, or one diff inside it
    Approve {
        run_id: String,

        /// Approve only this diff
        #[arg(long)]
        diff: Option<String>,
    },

    /// Reject a pending run, or one diff inside it
    Reject {
        run_id: String,

        /// Reject only this diff
        #[arg(long)]
        diff: Option<String>,
    },

    /// List the project's stored connections
    Connections {
        /// Probe this connection and report the result
        #[arg(long)]
        test: Option<String>,
    },

    /// Backend health, service status, and activity counters
    Status,

    /// Purge all backend data and re-seed defaults
    Reset,
}

fn sync_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(api) = &cli.api {
        config.api_base = api.clone();
    }
    if let Some(ws) = &cli.ws {
        config.ws_base = ws.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Watch => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match sync_config(&cli) {
        Ok(config) => {
            let project = cli.project.as_str();
            match cli.command {
                Commands::Watch => cmd::watch::run(&config, project, cli.json).await,
                Commands::Runs { id, logs } => {
                    cmd::runs::run(&config, project, id.as_deref(), logs, cli.json).await
                }
                Commands::Trigger {
                    description,
                    sources,
                } => cmd::trigger::run(&config, project, &description, &sources, cli.json).await,
                Commands::Approve { run_id, diff } => {
                    cmd::review::run(
                        &config,
                        project,
                        &run_id,
                        diff.as_deref(),
                        nexus_api::ActionKind::Approve,
                        cli.json,
                    )
                    .await
                }
                Commands::Reject { run_id, diff } => {
                    cmd::review::run(
                        &config,
                        project,
                        &run_id,
                        diff.as_deref(),
                        nexus_api::ActionKind::Reject,
                        cli.json,
                    )
                    .await
                }
                Commands::Connections { test } => {
                    cmd::connections::run(&config, project, test.as_deref(), cli.json).await
                }
                Commands::Status => cmd::status::run(&config, project, cli.json).await,
                Commands::Reset => cmd::reset::run(&config, cli.json).await,
            }
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
