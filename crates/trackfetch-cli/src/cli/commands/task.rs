//! `trackfetch pause|resume|cancel|hard-retry <hash>` – per-task commands.

use anyhow::{bail, Result};
use trackfetch_core::scheduler::{CommandAck, QueueCommands};
use trackfetch_core::track::TrackHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    Pause,
    Resume,
    Cancel,
    HardRetry,
}

pub async fn run_task_command(commands: &QueueCommands, command: TaskCommand, arg: &str) -> Result<()> {
    let hash = resolve(commands, arg).await?;
    let ack = match command {
        TaskCommand::Pause => commands.pause(&hash).await?,
        TaskCommand::Resume => commands.resume(&hash).await?,
        TaskCommand::Cancel => commands.cancel(&hash).await?,
        TaskCommand::HardRetry => commands.hard_retry(&hash).await?,
    };
    match ack {
        CommandAck::Applied { from, to } => println!("{}: {from} -> {to}", hash.short()),
        CommandAck::Signalled => println!("{}: signalled running worker", hash.short()),
        CommandAck::Unchanged { state } => {
            bail!("{:?} does not apply to {} in state {state}", command, hash.short())
        }
        CommandAck::UnknownTask => bail!("no task {}", hash.short()),
    }
    Ok(())
}

/// Accept a full hash or a unique prefix of one (as printed by `status`).
async fn resolve(commands: &QueueCommands, arg: &str) -> Result<TrackHash> {
    if let Ok(hash) = arg.parse::<TrackHash>() {
        return Ok(hash);
    }
    let prefix = arg.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        bail!("empty track hash");
    }
    let mut matches = commands
        .tasks()
        .await?
        .into_iter()
        .map(|t| t.hash)
        .filter(|h| h.as_str().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(hash), None) => Ok(hash),
        (None, _) => bail!("no task matches {arg:?}"),
        (Some(_), Some(_)) => bail!("{arg:?} is ambiguous; give more of the hash"),
    }
}
