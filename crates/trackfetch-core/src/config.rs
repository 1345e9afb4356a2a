use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::ranking::RankingWeights;

/// Upper bound on simultaneous transfers regardless of config.
pub const MAX_CONCURRENT_TRANSFERS: usize = 10;

/// Soft-retry policy for failed acquisition attempts (`[retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of automatic `Failed -> Pending` retries before a task is dead-lettered.
    pub max_soft_retries: u32,
    /// Base delay in seconds before a soft retry becomes eligible for dispatch.
    pub base_delay_secs: f64,
    /// Maximum soft-retry delay in seconds.
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_soft_retries: 3,
            base_delay_secs: 5.0,
            max_delay_secs: 300.0,
        }
    }
}

/// Reconnect backoff applied while the transport reports disconnected (`[reconnect]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 2.0,
            max_delay_secs: 60.0,
        }
    }
}

/// Recovery journal heartbeat and stall detection (`[journal]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Interval between checkpoints while a transfer is running.
    pub heartbeat_secs: f64,
    /// Consecutive heartbeats without byte progress before a transfer is force-aborted.
    pub stall_intervals: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 15.0,
            stall_intervals: 4,
        }
    }
}

/// Peer health tracking (`[peer_health]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerHealthConfig {
    /// Consecutive peer-attributable failures that blacklist a peer.
    pub blacklist_threshold: u32,
    /// How often the in-memory peer table is flushed to disk.
    pub flush_interval_secs: f64,
}

impl Default for PeerHealthConfig {
    fn default() -> Self {
        Self {
            blacklist_threshold: 3,
            flush_interval_secs: 30.0,
        }
    }
}

/// Global configuration loaded from `~/.config/trackfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackfetchConfig {
    /// Worker pool size: simultaneous transfers (1..=10).
    pub max_concurrent_transfers: usize,
    /// Directory completed tracks are renamed into. Defaults to the current directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// How long a single search round collects candidates.
    pub search_timeout_secs: f64,
    /// Ranked candidates tried in one attempt before falling back to a fresh search.
    pub max_candidates_per_attempt: usize,
    /// How often the scheduler re-checks the queue when nothing woke it.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub peer_health: PeerHealthConfig,
    #[serde(default)]
    pub ranking: RankingWeights,
}

fn default_poll_interval_secs() -> f64 {
    1.0
}

impl Default for TrackfetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4,
            download_dir: None,
            search_timeout_secs: 10.0,
            max_candidates_per_attempt: 5,
            poll_interval_secs: default_poll_interval_secs(),
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            journal: JournalConfig::default(),
            peer_health: PeerHealthConfig::default(),
            ranking: RankingWeights::default(),
        }
    }
}

impl TrackfetchConfig {
    /// Worker pool size clamped to `1..=MAX_CONCURRENT_TRANSFERS`.
    pub fn worker_slots(&self) -> usize {
        self.max_concurrent_transfers.clamp(1, MAX_CONCURRENT_TRANSFERS)
    }

    pub fn search_timeout(&self) -> Duration {
        secs(self.search_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        secs(self.journal.heartbeat_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        secs(self.peer_health.flush_interval_secs)
    }
}

/// Negative or NaN values collapse to zero instead of panicking in `Duration`.
pub(crate) fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("trackfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// State directory for the task database, peer table, and logs.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("trackfetch")?;
    Ok(xdg_dirs.get_state_home().join("trackfetch"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TrackfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TrackfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TrackfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = TrackfetchConfig::default();
        assert_eq!(cfg.worker_slots(), 4);
        assert_eq!(cfg.journal.stall_intervals, 4);
        assert_eq!(cfg.heartbeat(), Duration::from_secs(15));
        assert_eq!(cfg.peer_health.blacklist_threshold, 3);
        assert!((cfg.reconnect.base_delay_secs - 2.0).abs() < 1e-9);
        assert!((cfg.reconnect.max_delay_secs - 60.0).abs() < 1e-9);
    }

    #[test]
    fn worker_slots_are_clamped() {
        let mut cfg = TrackfetchConfig::default();
        cfg.max_concurrent_transfers = 0;
        assert_eq!(cfg.worker_slots(), 1);
        cfg.max_concurrent_transfers = 64;
        assert_eq!(cfg.worker_slots(), MAX_CONCURRENT_TRANSFERS);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = TrackfetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: TrackfetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_transfers, cfg.max_concurrent_transfers);
        assert_eq!(parsed.max_candidates_per_attempt, cfg.max_candidates_per_attempt);
        assert_eq!(parsed.retry.max_soft_retries, cfg.retry.max_soft_retries);
        assert_eq!(parsed.ranking, cfg.ranking);
    }

    #[test]
    fn config_toml_minimal_uses_section_defaults() {
        let toml = r#"
            max_concurrent_transfers = 2
            search_timeout_secs = 5.0
            max_candidates_per_attempt = 3
        "#;
        let cfg: TrackfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.worker_slots(), 2);
        assert_eq!(cfg.max_candidates_per_attempt, 3);
        assert!(cfg.download_dir.is_none());
        assert_eq!(cfg.journal.stall_intervals, 4);
        assert_eq!(cfg.ranking, RankingWeights::default());
    }

    #[test]
    fn config_toml_custom_sections() {
        let toml = r#"
            max_concurrent_transfers = 6
            download_dir = "/srv/music/incoming"
            search_timeout_secs = 8.0
            max_candidates_per_attempt = 4

            [retry]
            max_soft_retries = 5
            base_delay_secs = 1.5
            max_delay_secs = 90.0

            [journal]
            heartbeat_secs = 5.0
            stall_intervals = 6

            [peer_health]
            blacklist_threshold = 2
            flush_interval_secs = 10.0
        "#;
        let cfg: TrackfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            cfg.download_dir.as_deref(),
            Some(std::path::Path::new("/srv/music/incoming"))
        );
        assert_eq!(cfg.retry.max_soft_retries, 5);
        assert_eq!(cfg.retry.max_delay_secs, 90.0);
        assert_eq!(cfg.heartbeat(), Duration::from_secs(5));
        assert_eq!(cfg.journal.stall_intervals, 6);
        assert_eq!(cfg.peer_health.blacklist_threshold, 2);
        assert_eq!(cfg.flush_interval(), Duration::from_secs(10));
    }

    #[test]
    fn negative_durations_collapse_to_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(0.25), Duration::from_millis(250));
    }
}
