//! `trackfetch dead-letters` – tasks that exhausted their retries.

use anyhow::Result;
use trackfetch_core::scheduler::QueueCommands;

pub async fn run_dead_letters(commands: &QueueCommands) -> Result<()> {
    let dead = commands.dead_letters().await?;
    if dead.is_empty() {
        println!("Dead-letter list is empty.");
        return Ok(());
    }
    for task in dead {
        println!(
            "{}  {}  (tries: {}, generation: {})\n    {}",
            task.hash.short(),
            task.request.query(),
            task.retry_count,
            task.generation,
            task.last_error.as_deref().unwrap_or("no reason recorded"),
        );
    }
    Ok(())
}
