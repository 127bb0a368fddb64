use super::Context;
use crate::output::{print_table_header, print_table_row};
use crate::shutdown::install_shutdown_handler;
use anyhow::Result;
use clap::Subcommand;
use drover_config::MAX_WORKER_COUNT;
use drover_jobs::{PoolReport, ProcessLauncher, ShellRunner, Supervisor, WorkerLoop, WorkerLoopConfig};
use std::ffi::OsString;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Start a pool of worker processes and wait for them (Ctrl+C stops gracefully)
    Start {
        /// Number of worker processes (defaults to worker.count)
        #[arg(long, short, value_parser = clap::value_parser!(u32).range(1..=MAX_WORKER_COUNT as i64))]
        count: Option<u32>,
    },

    /// Run a single worker loop in this process
    #[command(hide = true)]
    Run {
        /// Also stop when stdin is closed
        #[arg(long)]
        supervised: bool,
    },
}

pub async fn run(command: WorkerCommands, ctx: &Context) -> Result<ExitCode> {
    match command {
        WorkerCommands::Start { count } => {
            let count = count.map_or(ctx.config.worker.count, |n| n as usize);
            start(count, ctx).await
        }
        WorkerCommands::Run { supervised } => {
            run_loop(supervised, ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn start(count: usize, ctx: &Context) -> Result<ExitCode> {
    // Surface database problems once, before any child is spawned.
    ctx.open_database().await?.close().await;

    let launcher = ProcessLauncher::current_exe(child_args(ctx))?;
    let cancel = install_shutdown_handler(false);

    info!(count, "Starting worker pool");
    let report = Supervisor::new(launcher, count).run(cancel).await?;

    if ctx.output.is_text() {
        print_report(&report);
    } else {
        ctx.output.print_value(&report)?;
    }

    if report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed = report.failed().len(), "Worker processes exited abnormally");
        Ok(ExitCode::from(2))
    }
}

async fn run_loop(supervised: bool, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let cancel = install_shutdown_handler(supervised);

    let mut worker = WorkerLoop::new(
        db.job_store(),
        ShellRunner::new(ctx.config.worker.shell.clone()),
        db.settings(),
        db.workers(),
        WorkerLoopConfig::from(&ctx.config.worker),
    );

    let result = worker.run(cancel).await;
    db.close().await;
    let summary = result?;

    if !ctx.output.is_text() {
        ctx.output.print_value(&summary)?;
    }

    Ok(())
}

/// Global arguments that make children resolve the same configuration and database.
fn child_args(ctx: &Context) -> Vec<OsString> {
    vec![
        "--config-dir".into(),
        ctx.config_dir.clone().into_os_string(),
        "--database".into(),
        ctx.config.database.path.clone().into_os_string(),
    ]
}

fn print_report(report: &PoolReport) {
    print_table_header(&[("PID", 10), ("EXIT", 10)]);
    for worker in &report.workers {
        let pid = worker.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
        let exit = worker
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        print_table_row(&[(&pid, 10), (&exit, 10)]);
    }
}
