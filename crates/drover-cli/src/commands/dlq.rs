use super::jobs::print_job_table;
use super::Context;
use anyhow::Result;
use clap::Subcommand;
use drover_jobs::JobId;

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List dead jobs
    List,

    /// Requeue a dead job with a fresh retry budget
    Retry {
        /// Job ID
        id: String,
    },
}

pub async fn run(command: DlqCommands, ctx: &Context) -> Result<()> {
    match command {
        DlqCommands::List => {
            let jobs = ctx.with_queue(|queue| async move { queue.dlq_list().await }).await?;

            if ctx.output.is_text() {
                print_job_table(&jobs, "Dead letter queue is empty");
            } else {
                ctx.output.print_value(&jobs)?;
            }
        }
        DlqCommands::Retry { id } => {
            let id = JobId::from(id);
            let job = ctx
                .with_queue(|queue| async move { queue.dlq_retry(&id).await })
                .await?;

            if ctx.output.is_text() {
                println!("Requeued job: {}", job.id);
            } else {
                ctx.output.print_value(&job)?;
            }
        }
    }

    Ok(())
}
