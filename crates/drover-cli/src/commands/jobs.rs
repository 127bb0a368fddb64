use super::{format_time, Context};
use crate::output::{print_field, print_table_header, print_table_row};
use anyhow::Result;
use drover_jobs::{Job, JobId, JobState};

pub async fn status(ctx: &Context) -> Result<()> {
    let status = ctx.with_queue(|queue| async move { queue.status().await }).await?;

    if ctx.output.is_text() {
        for (state, count) in status.jobs.iter() {
            print_field(state.as_str(), &count.to_string());
        }
        print_field("workers", &status.active_workers.to_string());
    } else {
        ctx.output.print_value(&status)?;
    }

    Ok(())
}

pub async fn list(state: Option<JobState>, ctx: &Context) -> Result<()> {
    let jobs = ctx.with_queue(|queue| async move { queue.list(state).await }).await?;

    if ctx.output.is_text() {
        print_job_table(&jobs, "No jobs found");
    } else {
        ctx.output.print_value(&jobs)?;
    }

    Ok(())
}

pub async fn get(id: &str, ctx: &Context) -> Result<()> {
    let id = JobId::from(id);
    let job = ctx.with_queue(|queue| async move { queue.get(&id).await }).await?;

    if ctx.output.is_text() {
        print_field("ID", job.id.as_str());
        print_field("Command", &job.command);
        print_field("State", job.state.as_str());
        print_field("Attempts", &job.attempts.to_string());
        print_field("Run after", &format_time(job.run_after));
        print_field("Created", &format_time(job.created_at));
        print_field("Updated", &format_time(job.updated_at));
        if let Some(err) = &job.last_error {
            print_field("Last error", err);
        }
    } else {
        ctx.output.print_value(&job)?;
    }

    Ok(())
}

pub(crate) fn print_job_table(jobs: &[Job], empty: &str) {
    if jobs.is_empty() {
        println!("{empty}");
        return;
    }

    print_table_header(&[
        ("ID", 20),
        ("STATE", 10),
        ("ATTEMPTS", 8),
        ("RUN AFTER", 20),
        ("COMMAND", 40),
    ]);
    for job in jobs {
        print_table_row(&[
            (job.id.as_str(), 20),
            (job.state.as_str(), 10),
            (&job.attempts.to_string(), 8),
            (&format_time(job.run_after), 20),
            (&job.command, 40),
        ]);
    }
}
