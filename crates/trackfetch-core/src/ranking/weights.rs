use serde::{Deserialize, Serialize};

/// Tunable weights for the ranking engine (`[ranking]` in config.toml).
///
/// Quality bases are floors per quality class; every other term only orders
/// candidates inside one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub lossless_base: f64,
    pub high_bitrate_base: f64,
    pub mid_bitrate_base: f64,
    /// Low-bitrate base is `bitrate_kbps × low_bitrate_factor`, kept below `mid_bitrate_base`.
    pub low_bitrate_factor: f64,

    pub free_slot_bonus: f64,
    pub queue_penalty_per_entry: f64,
    pub long_queue_threshold: u32,
    pub long_queue_penalty: f64,

    pub bpm_tolerance: f32,
    pub bpm_match_bonus: f64,
    pub key_match_bonus: f64,
    pub harmonic_key_bonus: f64,
    /// Applied when the target and the candidate both declare a BPM/key and they disagree.
    pub musical_mismatch_penalty: f64,

    /// Scaled by the peer's failure rate (0.0..=1.0).
    pub peer_failure_penalty: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            lossless_base: 450.0,
            high_bitrate_base: 300.0,
            mid_bitrate_base: 150.0,
            low_bitrate_factor: 0.5,
            free_slot_bonus: 100.0,
            queue_penalty_per_entry: 1.0,
            long_queue_threshold: 50,
            long_queue_penalty: 40.0,
            bpm_tolerance: 2.0,
            bpm_match_bonus: 30.0,
            key_match_bonus: 30.0,
            harmonic_key_bonus: 15.0,
            musical_mismatch_penalty: 10.0,
            peer_failure_penalty: 60.0,
        }
    }
}

impl RankingWeights {
    /// Smallest distance between two adjacent quality bases.
    pub fn min_quality_gap(&self) -> f64 {
        (self.lossless_base - self.high_bitrate_base)
            .min(self.high_bitrate_base - self.mid_bitrate_base)
    }

    /// Whether every musical-fit bonus is strictly smaller than the gap between
    /// quality classes. Ordering never depends on this (classes are compared
    /// first), but a config that breaks it makes the reported scores misleading.
    pub fn musical_bonuses_below_quality_gap(&self) -> bool {
        let gap = self.min_quality_gap();
        [
            self.bpm_match_bonus,
            self.key_match_bonus,
            self.harmonic_key_bonus,
        ]
        .iter()
        .all(|b| *b < gap)
    }
}
