use super::Context;
use anyhow::Result;
use drover_jobs::NewJob;
use serde_json::json;

pub async fn run(input: &str, ctx: &Context) -> Result<()> {
    // Rejected input never opens the database.
    let job = NewJob::from_json(input)?;

    let id = ctx.with_queue(|queue| async move { queue.enqueue(job).await }).await?;

    if ctx.output.is_text() {
        println!("Enqueued job: {id}");
    } else {
        ctx.output.print_value(&json!({ "id": id, "state": "pending" }))?;
    }

    Ok(())
}
