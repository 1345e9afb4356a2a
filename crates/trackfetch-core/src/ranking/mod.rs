//! Tiered ranking engine.
//!
//! Orders the candidates that survived the forensic filter. Scoring is
//! tiered, not additive: candidates are compared by quality class first and
//! only then by the numeric sub-score (availability, musical fit, peer
//! health), so no amount of bonus lets a lower class overtake a higher one.
//!
//! The engine is deterministic: the same candidates, peer signals, and
//! weights always produce the same order. Forensic logs can be replayed
//! through it (see `trackfetch rank`).

mod score;
mod weights;

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::candidate::{CandidateId, Codec, SearchCandidate};
use crate::forensic::{self, ForensicVerdict, GuardHit, Tier, MID_BITRATE_KBPS};
use crate::peer_health::PeerSignals;
use crate::track::TrackRequest;

pub use score::{ScoreBreakdown, ScoreTerm};
pub use weights::RankingWeights;

/// A candidate that survived filtering, with its final tier and score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub candidate: SearchCandidate,
    pub verdict: ForensicVerdict,
    /// Provisional forensic tier, possibly revised upward by the quality floor.
    pub tier: Tier,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExclusionReason {
    Forensic(Vec<GuardHit>),
    BlacklistedPeer,
    PreviouslyRejected,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Exclusion {
    pub candidate: CandidateId,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RankOutcome {
    /// Best first.
    pub ranked: Vec<RankedCandidate>,
    pub excluded: Vec<Exclusion>,
}

#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    weights: RankingWeights,
}

impl RankingEngine {
    pub fn new(weights: RankingWeights) -> Self {
        if !weights.musical_bonuses_below_quality_gap() {
            tracing::warn!("ranking weights: musical-fit bonus not below the quality gap");
        }
        Self { weights }
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Filter and order one search round's candidates for `request`.
    ///
    /// Excluded before scoring: forensic `Trash`, candidates from blacklisted
    /// peers, candidates listed in `rejected`, and repeats of the same peer file.
    pub fn rank(
        &self,
        request: &TrackRequest,
        candidates: Vec<SearchCandidate>,
        peers: &PeerSignals,
        rejected: &HashSet<CandidateId>,
    ) -> RankOutcome {
        let mut outcome = RankOutcome::default();
        let mut seen = HashSet::new();

        for candidate in candidates {
            let id = candidate.id();
            if !seen.insert(id.clone()) {
                outcome.excluded.push(Exclusion {
                    candidate: id,
                    reason: ExclusionReason::Duplicate,
                });
                continue;
            }
            if rejected.contains(&id) {
                outcome.excluded.push(Exclusion {
                    candidate: id,
                    reason: ExclusionReason::PreviouslyRejected,
                });
                continue;
            }
            if peers.is_blacklisted(&candidate.peer) {
                outcome.excluded.push(Exclusion {
                    candidate: id,
                    reason: ExclusionReason::BlacklistedPeer,
                });
                continue;
            }
            let verdict = forensic::inspect(&candidate, request.canonical_duration_secs);
            if verdict.is_trash() {
                outcome.excluded.push(Exclusion {
                    candidate: id,
                    reason: ExclusionReason::Forensic(verdict.guard_hits.clone()),
                });
                continue;
            }
            outcome.ranked.push(self.score(request, candidate, verdict, peers));
        }

        outcome.ranked.sort_by(compare_ranked);
        for (i, r) in outcome.ranked.iter().enumerate() {
            tracing::debug!(
                rank = i + 1,
                peer = %r.candidate.peer,
                file = %r.candidate.filename,
                tier = ?r.tier,
                score = r.score,
                "{}",
                r.breakdown
            );
        }
        outcome
    }

    fn score(
        &self,
        request: &TrackRequest,
        candidate: SearchCandidate,
        verdict: ForensicVerdict,
        peers: &PeerSignals,
    ) -> RankedCandidate {
        let w = &self.weights;
        let mut breakdown = ScoreBreakdown::default();

        let (tier, floor) = self.quality_floor(&candidate, request, verdict.tier);
        breakdown.push("quality_floor", floor);

        if candidate.has_free_slot {
            breakdown.push("free_slot", w.free_slot_bonus);
        }
        breakdown.push(
            "queue",
            -(f64::from(candidate.queue_length) * w.queue_penalty_per_entry),
        );
        if candidate.queue_length > w.long_queue_threshold {
            breakdown.push("long_queue", -w.long_queue_penalty);
        }

        if let (Some(target), Some(bpm)) = (request.target_bpm, candidate.bpm) {
            let term = if (target - bpm).abs() <= w.bpm_tolerance {
                w.bpm_match_bonus
            } else {
                -w.musical_mismatch_penalty
            };
            breakdown.push("bpm", term);
        }
        if let (Some(target), Some(key)) = (request.target_key, candidate.key) {
            let term = if target == key {
                w.key_match_bonus
            } else if target.is_harmonic_neighbor(&key) {
                w.harmonic_key_bonus
            } else {
                -w.musical_mismatch_penalty
            };
            breakdown.push("key", term);
        }

        let failure_rate = peers.failure_rate(&candidate.peer);
        breakdown.push("peer_health", -(failure_rate * w.peer_failure_penalty));

        RankedCandidate {
            score: breakdown.total(),
            candidate,
            verdict,
            tier,
            breakdown,
        }
    }

    /// Base score for the candidate's quality class. A lossy file with no
    /// declared bitrate gets one inferred from size and duration, which may
    /// lift it above its provisional forensic tier.
    fn quality_floor(
        &self,
        candidate: &SearchCandidate,
        request: &TrackRequest,
        provisional: Tier,
    ) -> (Tier, f64) {
        let w = &self.weights;
        if candidate.codec == Codec::Lossless {
            return (Tier::Diamond.max(provisional), w.lossless_base);
        }
        let bitrate = if candidate.bitrate_kbps > 0 {
            candidate.bitrate_kbps
        } else {
            candidate
                .duration_secs
                .or(request.canonical_duration_secs)
                .filter(|d| *d > 0)
                .map(|d| inferred_kbps(candidate.size_bytes, d))
                .unwrap_or(0)
        };
        let tier = Tier::for_quality(Codec::Lossy, bitrate).max(provisional);
        let floor = match tier {
            Tier::Diamond => w.lossless_base,
            Tier::Gold => w.high_bitrate_base,
            Tier::Silver => w.mid_bitrate_base,
            _ => {
                let capped = bitrate.min(MID_BITRATE_KBPS.saturating_sub(1));
                (f64::from(capped) * w.low_bitrate_factor).min(w.mid_bitrate_base - 1.0)
            }
        };
        (tier, floor)
    }
}

/// Average bitrate implied by size and duration. Peer-declared values can
/// be anything, so the arithmetic is widened and the result clamped.
fn inferred_kbps(size_bytes: u64, duration_secs: u32) -> u32 {
    let kbps = u128::from(size_bytes) * 8 / u128::from(duration_secs) / 1000;
    u32::try_from(kbps).unwrap_or(u32::MAX)
}

/// Tier first, then score, then shorter queue, then trust; peer and filename
/// make the order total.
fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.tier
        .cmp(&a.tier)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.candidate.queue_length.cmp(&b.candidate.queue_length))
        .then_with(|| b.verdict.trust_score.cmp(&a.verdict.trust_score))
        .then_with(|| a.candidate.peer.cmp(&b.candidate.peer))
        .then_with(|| a.candidate.filename.cmp(&b.candidate.filename))
}

#[cfg(test)]
mod tests;
