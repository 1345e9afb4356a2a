//! `trackfetch status` – show every task in the queue.

use anyhow::Result;
use trackfetch_core::machine::DownloadTask;
use trackfetch_core::scheduler::QueueCommands;

pub async fn run_status(commands: &QueueCommands, json: bool) -> Result<()> {
    let tasks = commands.tasks().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks in queue.");
        return Ok(());
    }
    println!(
        "{:<12} {:<18} {:>4} {:>12} {:>5}  {}",
        "HASH", "STATE", "PRIO", "PROGRESS", "TRIES", "TRACK"
    );
    for task in &tasks {
        println!(
            "{:<12} {:<18} {:>4} {:>12} {:>5}  {}{}",
            task.hash.short(),
            task.state.to_string(),
            task.priority,
            progress(task),
            task.retry_count,
            task.request.query(),
            if task.needs_review { "  [review]" } else { "" },
        );
    }
    Ok(())
}

fn progress(task: &DownloadTask) -> String {
    match task.bytes_total {
        Some(total) if total > 0 => {
            format!("{:.1}%", task.bytes_done as f64 * 100.0 / total as f64)
        }
        _ if task.bytes_done > 0 => format!("{} B", task.bytes_done),
        _ => "-".to_string(),
    }
}
