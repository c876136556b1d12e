use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod config;
mod coordination;
mod telemetry;

use cli::commands::{MonitorCommand, StatusCommand, SyncCommand, WorkflowCommand};

#[derive(Parser)]
#[command(name = "ringmaster")]
#[command(about = "File-backed coordination engine for ordered agent processes")]
#[command(long_about = "Ringmaster coordinates independent agent executables that must run in \
                        a fixed dependency order, sharing durable project state through a \
                        coordination directory. It enforces quality gates, advisory resource \
                        locks, and bounded retries. Start with 'ringmaster workflow'.")]
struct Cli {
    /// Project root directory
    #[arg(long, default_value = ".", global = true)]
    project_root: PathBuf,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bounded workflow loop until all agents complete or cycles run out
    Workflow {
        /// Task-set selector passed through to each agent
        #[arg(long, default_value = "agents", help = "Tag passed to agents via --tag")]
        tag: String,
        /// Maximum workflow cycles (defaults to the configured value)
        #[arg(long, help = "Limit the number of drain/schedule/run cycles")]
        max_cycles: Option<u32>,
        /// Pass --dry-run through to agents without mutating anything
        #[arg(long, help = "Agents are told not to make changes")]
        dry_run: bool,
        /// Disable quality gate enforcement for this run
        #[arg(long, help = "Quality gates become advisory: logged but never blocking")]
        no_quality_gates: bool,
    },
    /// Report current agent states, quality gates, and session counters
    Status {
        /// Emit the report as JSON instead of the human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Force one state-merge pass without running agents
    Sync,
    /// Repeat sync and event processing forever at a fixed interval
    Monitor {
        /// Seconds between passes (defaults to the configured value)
        #[arg(long, help = "Sync interval in seconds")]
        interval: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.verbose)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Workflow {
            tag,
            max_cycles,
            dry_run,
            no_quality_gates,
        } => runtime.block_on(async {
            WorkflowCommand {
                project_root: cli.project_root,
                config_path: cli.config,
                tag,
                max_cycles,
                dry_run,
                verbose: cli.verbose,
                no_quality_gates,
            }
            .execute()
            .await
        }),
        Commands::Status { json } => runtime.block_on(async {
            StatusCommand {
                project_root: cli.project_root,
                config_path: cli.config,
                json,
            }
            .execute()
            .await
        }),
        Commands::Sync => runtime.block_on(async {
            SyncCommand {
                project_root: cli.project_root,
                config_path: cli.config,
            }
            .execute()
            .await
        }),
        Commands::Monitor { interval } => runtime.block_on(async {
            MonitorCommand {
                project_root: cli.project_root,
                config_path: cli.config,
                interval_secs: interval,
            }
            .execute()
            .await
        }),
    }
}
