//! Forensic filter: decide from declared metadata alone whether a candidate is
//! physically plausible.
//!
//! Guard clauses run first and are absolute: any hit makes the candidate
//! `Trash` with a trust score of at most 10, no matter how good the rest of its
//! metadata looks. Only candidates that pass every guard get a quality tier and
//! a trust score derived from how well their size matches their declared
//! bitrate. The filter is pure; it does no I/O and keeps no state.

use serde::Serialize;
use std::fmt;

use crate::candidate::{Codec, SearchCandidate};

/// Below this fraction of `bitrate × duration / 8` the file cannot hold the
/// bitrate it claims (typically a 128 kbps encode relabeled as 320 kbps).
pub const SIZE_RATIO_FLOOR: f64 = 0.70;
/// Lossless audio below this density is physically impossible.
pub const LOSSLESS_MIN_BYTES_PER_MINUTE: f64 = 2_500_000.0;
/// Maximum distance from the canonical duration before the file is considered
/// a different edit or version.
pub const DURATION_TOLERANCE_SECS: u32 = 30;
/// Lossy bitrate floors for the Gold and Silver tiers.
pub const HIGH_BITRATE_KBPS: u32 = 256;
pub const MID_BITRATE_KBPS: u32 = 192;
/// Highest trust score a guard-clause hit may carry.
pub const GUARDED_TRUST_CAP: u8 = 10;

/// Coarse quality/authenticity bucket. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tier {
    Trash,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl Tier {
    /// Provisional tier for a candidate that passed every guard clause.
    pub fn for_quality(codec: Codec, bitrate_kbps: u32) -> Tier {
        match codec {
            Codec::Lossless => Tier::Diamond,
            Codec::Lossy if bitrate_kbps >= HIGH_BITRATE_KBPS => Tier::Gold,
            Codec::Lossy if bitrate_kbps >= MID_BITRATE_KBPS => Tier::Silver,
            Codec::Lossy => Tier::Bronze,
        }
    }
}

/// A guard clause that fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GuardHit {
    DurationMismatch { declared_secs: u32, canonical_secs: u32 },
    SizeBitrateMismatch { actual_bytes: u64, expected_bytes: u64 },
    LosslessTooSmall { bytes_per_minute: u64 },
}

impl fmt::Display for GuardHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardHit::DurationMismatch {
                declared_secs,
                canonical_secs,
            } => write!(f, "duration {declared_secs}s vs canonical {canonical_secs}s"),
            GuardHit::SizeBitrateMismatch {
                actual_bytes,
                expected_bytes,
            } => write!(
                f,
                "size {actual_bytes} B below {:.0}% of expected {expected_bytes} B",
                SIZE_RATIO_FLOOR * 100.0
            ),
            GuardHit::LosslessTooSmall { bytes_per_minute } => {
                write!(f, "lossless at {bytes_per_minute} B/min")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForensicVerdict {
    pub tier: Tier,
    /// 0..=100 confidence that the declared metadata is genuine.
    pub trust_score: u8,
    pub guard_hits: Vec<GuardHit>,
    /// `actual / expected` bytes, when a bitrate and duration were available.
    pub size_ratio: Option<f64>,
}

impl ForensicVerdict {
    pub fn is_trash(&self) -> bool {
        self.tier == Tier::Trash
    }
}

/// Judge one candidate. `canonical_duration_secs` comes from the originating
/// track-list entry when known; it also stands in for a missing declared duration.
pub fn inspect(candidate: &SearchCandidate, canonical_duration_secs: Option<u32>) -> ForensicVerdict {
    let duration = candidate
        .duration_secs
        .or(canonical_duration_secs)
        .filter(|d| *d > 0);

    let mut hits = Vec::new();

    if let (Some(declared), Some(canonical)) = (candidate.duration_secs, canonical_duration_secs) {
        if declared.abs_diff(canonical) > DURATION_TOLERANCE_SECS {
            hits.push(GuardHit::DurationMismatch {
                declared_secs: declared,
                canonical_secs: canonical,
            });
        }
    }

    let expected_bytes = match duration {
        Some(d) if candidate.bitrate_kbps > 0 => {
            let bits = u128::from(candidate.bitrate_kbps) * 1000 * u128::from(d);
            Some(u64::try_from(bits / 8).unwrap_or(u64::MAX))
        }
        _ => None,
    };
    let size_ratio = expected_bytes
        .filter(|e| *e > 0)
        .map(|e| candidate.size_bytes as f64 / e as f64);

    if let (Some(expected), Some(ratio)) = (expected_bytes, size_ratio) {
        if ratio < SIZE_RATIO_FLOOR {
            hits.push(GuardHit::SizeBitrateMismatch {
                actual_bytes: candidate.size_bytes,
                expected_bytes: expected,
            });
        }
    }

    let bytes_per_minute = duration.map(|d| candidate.size_bytes as f64 * 60.0 / f64::from(d));
    if candidate.codec == Codec::Lossless {
        if let Some(bpm) = bytes_per_minute {
            if bpm < LOSSLESS_MIN_BYTES_PER_MINUTE {
                hits.push(GuardHit::LosslessTooSmall {
                    bytes_per_minute: bpm as u64,
                });
            }
        }
    }

    if !hits.is_empty() {
        let trust_score = GUARDED_TRUST_CAP / hits.len() as u8;
        return ForensicVerdict {
            tier: Tier::Trash,
            trust_score,
            guard_hits: hits,
            size_ratio,
        };
    }

    let trust_score = match (size_ratio, candidate.codec, bytes_per_minute) {
        (Some(ratio), _, _) => closeness_trust(ratio),
        // Lossless without a declared bitrate: judge by density against a
        // typical CD-quality FLAC (~5 MB/min).
        (None, Codec::Lossless, Some(bpm)) => {
            ((bpm / (2.0 * LOSSLESS_MIN_BYTES_PER_MINUTE)) * 100.0).clamp(11.0, 100.0) as u8
        }
        _ => 50,
    };

    ForensicVerdict {
        tier: Tier::for_quality(candidate.codec, candidate.bitrate_kbps),
        trust_score,
        guard_hits: Vec::new(),
        size_ratio,
    }
}

/// Trust from how close the size/bitrate ratio is to 1.0; never drops into the
/// guarded range for a candidate that passed every guard.
fn closeness_trust(ratio: f64) -> u8 {
    let closeness = 1.0 - (1.0 - ratio).abs();
    (closeness * 100.0).round().clamp(f64::from(GUARDED_TRUST_CAP) + 1.0, 100.0) as u8
}
