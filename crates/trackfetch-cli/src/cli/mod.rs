//! CLI for trackfetch queue administration.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use trackfetch_core::candidate::MusicalKey;
use trackfetch_core::config;
use trackfetch_core::machine::DEFAULT_PRIORITY;
use trackfetch_core::scheduler::QueueCommands;
use trackfetch_core::task_db::TaskDb;

use commands::{
    run_clear_peer, run_dead_letters, run_enqueue, run_peers, run_rank, run_status, run_task_command,
    TaskCommand,
};

/// Top-level CLI for trackfetch.
#[derive(Debug, Parser)]
#[command(name = "trackfetch")]
#[command(about = "trackfetch: forensic track acquisition queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Musical targets shared by `enqueue` and `rank`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TrackTargets {
    /// Canonical track length in seconds (enables the duration guard).
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u32>,
    /// Target tempo.
    #[arg(long)]
    pub bpm: Option<f32>,
    /// Target key, Camelot (8A) or standard (Am, F#m, C major).
    #[arg(long)]
    pub key: Option<MusicalKey>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a track for acquisition.
    Enqueue {
        artist: String,
        title: String,
        /// Lower is more urgent; 0 is the highest priority.
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: u32,
        #[command(flatten)]
        targets: TrackTargets,
    },

    /// Show every task in the queue.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Pause a queued task.
    Pause {
        /// Track hash or a unique prefix of it.
        hash: String,
    },

    /// Resume a paused task.
    Resume { hash: String },

    /// Cancel a task; it moves to the dead-letter list.
    Cancel { hash: String },

    /// Restart a failed task from scratch at maximum priority.
    HardRetry { hash: String },

    /// List tasks awaiting operator review.
    DeadLetters,

    /// Show peer reliability records.
    Peers {
        /// Only blacklisted peers.
        #[arg(long)]
        blacklisted: bool,
    },

    /// Forget a peer's history, lifting any blacklist.
    ClearPeer { peer: String },

    /// Rank a saved list of search candidates offline and print the breakdowns.
    Rank {
        /// JSON array of candidates.
        path: PathBuf,
        #[command(flatten)]
        targets: TrackTargets,
        /// Print the full ranking outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Enqueue {
                artist,
                title,
                priority,
                targets,
            } => run_enqueue(&queue().await?, artist, title, priority, &targets).await?,
            CliCommand::Status { json } => run_status(&queue().await?, json).await?,
            CliCommand::Pause { hash } => run_task_command(&queue().await?, TaskCommand::Pause, &hash).await?,
            CliCommand::Resume { hash } => {
                run_task_command(&queue().await?, TaskCommand::Resume, &hash).await?
            }
            CliCommand::Cancel { hash } => {
                run_task_command(&queue().await?, TaskCommand::Cancel, &hash).await?
            }
            CliCommand::HardRetry { hash } => {
                run_task_command(&queue().await?, TaskCommand::HardRetry, &hash).await?
            }
            CliCommand::DeadLetters => run_dead_letters(&queue().await?).await?,
            CliCommand::Peers { blacklisted } => run_peers(&cfg, blacklisted)?,
            CliCommand::ClearPeer { peer } => run_clear_peer(&cfg, &peer)?,
            CliCommand::Rank {
                path,
                targets,
                json,
            } => run_rank(&cfg, &path, &targets, json)?,
        }

        Ok(())
    }
}

/// The CLI works on the queue database directly; a running engine picks
/// changes up on its next dispatch pass.
async fn queue() -> Result<QueueCommands> {
    Ok(QueueCommands::offline(TaskDb::open_default().await?))
}

#[cfg(test)]
mod tests;
