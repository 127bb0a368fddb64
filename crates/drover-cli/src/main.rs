//! Drover command-line interface.
//!
//! Every subcommand opens the shared job database, does its work and exits.
//! `worker start` is the only long-running command; it re-executes this
//! binary once per worker process.

mod commands;
mod output;
mod shutdown;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::Context;
use drover_config::ConfigLoader;
use drover_jobs::{JobError, JobState};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Drover - persistent local job queue for shell commands")]
#[command(version)]
pub struct Cli {
    /// Directory holding default.toml, <environment>.toml and local.toml
    #[arg(long, env = "DROVER_CONFIG_DIR", default_value = "config", global = true)]
    pub config_dir: PathBuf,

    /// Job database file (overrides database.path)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"], global = true)]
    pub output: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a job, e.g. '{"id":"job1","command":"echo hi"}'
    Enqueue {
        /// Job as a JSON object with "id" and "command"
        job: String,
    },

    /// Run worker processes
    Worker {
        #[command(subcommand)]
        command: commands::worker::WorkerCommands,
    },

    /// Show job counts per state and active workers
    Status,

    /// List jobs
    List {
        /// Only show jobs in this state
        #[arg(long, value_parser = parse_state)]
        state: Option<JobState>,
    },

    /// Show a single job
    Get {
        /// Job ID
        id: String,
    },

    /// Inspect and requeue dead jobs
    Dlq {
        #[command(subcommand)]
        command: commands::dlq::DlqCommands,
    },

    /// Read and change runtime settings (max_retries, backoff_base)
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

fn parse_state(s: &str) -> Result<JobState, String> {
    s.parse().map_err(|_| {
        let valid: Vec<&str> = JobState::ALL.iter().map(|state| state.as_str()).collect();
        format!("expected one of: {}", valid.join(", "))
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ConfigLoader::new(&cli.config_dir) {
        Ok(loader) => loader.into_inner(),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(path) = &cli.database {
        config.database.path.clone_from(path);
    }

    if let Err(e) = drover_core::init_tracing(&config.logging) {
        eprintln!("Warning: {e}");
    }
    drover_jobs::register_metrics();

    // Worker processes are single-threaded; one runtime flavour serves all commands.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::from(2);
        }
    };

    let ctx = Context {
        config,
        config_dir: cli.config_dir,
        output: OutputFormat::parse(&cli.output),
    };

    let result = runtime.block_on(run(cli.command, &ctx));

    // A blocked stdin reader must not hold the process open.
    runtime.shutdown_background();

    match result {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

async fn run(command: Commands, ctx: &Context) -> Result<ExitCode> {
    match command {
        Commands::Enqueue { job } => commands::enqueue::run(&job, ctx).await?,
        Commands::Worker { command } => return commands::worker::run(command, ctx).await,
        Commands::Status => commands::jobs::status(ctx).await?,
        Commands::List { state } => commands::jobs::list(state, ctx).await?,
        Commands::Get { id } => commands::jobs::get(&id, ctx).await?,
        Commands::Dlq { command } => commands::dlq::run(command, ctx).await?,
        Commands::Config { command } => commands::config::run(command, ctx).await?,
    }
    Ok(ExitCode::SUCCESS)
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err:#}");
    ExitCode::from(exit_status(err))
}

/// Operator mistakes exit 1; store, config and worker failures exit 2.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<JobError>() {
        Some(e) if e.is_operator_error() => 1,
        _ => 2,
    }
}
