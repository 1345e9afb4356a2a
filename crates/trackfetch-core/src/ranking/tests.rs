use super::*;
use crate::candidate::MusicalKey;
use crate::peer_health::{PeerId, PeerSignal};

const MB: u64 = 1_000_000;

fn candidate(peer: &str, codec: Codec, bitrate_kbps: u32, size_bytes: u64) -> SearchCandidate {
    SearchCandidate {
        peer: PeerId::new(peer),
        filename: format!("{peer}/track"),
        bitrate_kbps,
        size_bytes,
        duration_secs: Some(637),
        has_free_slot: false,
        queue_length: 0,
        bpm: None,
        key: None,
        codec,
    }
}

fn request() -> TrackRequest {
    let mut req = TrackRequest::new("Underworld", "Born Slippy .NUXX");
    req.canonical_duration_secs = Some(637);
    req
}

fn peers_of(outcome: &RankOutcome) -> Vec<&str> {
    outcome.ranked.iter().map(|r| r.candidate.peer.as_str()).collect()
}

#[test]
fn four_candidate_scenario() {
    let mut a = candidate("a", Codec::Lossless, 1411, 112 * MB);
    a.has_free_slot = true;
    let mut b = candidate("b", Codec::Lossy, 320, 25 * MB);
    b.queue_length = 5;
    let c = candidate("c", Codec::Lossless, 1411, 9 * MB);

    let engine = RankingEngine::default();
    let outcome = engine.rank(
        &request(),
        vec![c, b, a],
        &PeerSignals::default(),
        &HashSet::new(),
    );

    assert_eq!(peers_of(&outcome), ["a", "b"]);
    assert_eq!(outcome.ranked[0].tier, Tier::Diamond);
    assert_eq!(outcome.ranked[1].tier, Tier::Gold);
    assert_eq!(outcome.excluded.len(), 1);
    assert_eq!(outcome.excluded[0].candidate.peer.as_str(), "c");
    assert!(matches!(outcome.excluded[0].reason, ExclusionReason::Forensic(_)));
}

#[test]
fn ranking_is_deterministic_regardless_of_input_order() {
    let mut pool = Vec::new();
    for (i, q) in [0u32, 3, 3, 12, 60].iter().enumerate() {
        let mut c = candidate(&format!("p{i}"), Codec::Lossy, 320, 25 * MB);
        c.queue_length = *q;
        c.has_free_slot = i % 2 == 0;
        pool.push(c);
    }
    let engine = RankingEngine::default();
    let peers = PeerSignals::default();
    let first = engine.rank(&request(), pool.clone(), &peers, &HashSet::new());
    for _ in 0..5 {
        pool.rotate_left(1);
        let again = engine.rank(&request(), pool.clone(), &peers, &HashSet::new());
        assert_eq!(peers_of(&again), peers_of(&first));
    }
}

#[test]
fn quality_dominates_musical_fit_and_availability() {
    let mut req = request();
    req.target_bpm = Some(128.0);
    req.target_key = Some("8A".parse::<MusicalKey>().unwrap());

    let mut perfect_mp3 = candidate("mp3", Codec::Lossy, 320, 25 * MB);
    perfect_mp3.bpm = Some(128.0);
    perfect_mp3.key = req.target_key;
    perfect_mp3.has_free_slot = true;

    let mut plain_flac = candidate("flac", Codec::Lossless, 1411, 112 * MB);
    plain_flac.bpm = Some(140.0);
    plain_flac.key = Some("3B".parse().unwrap());
    plain_flac.queue_length = 40;

    let outcome = RankingEngine::default().rank(
        &req,
        vec![perfect_mp3, plain_flac],
        &PeerSignals::default(),
        &HashSet::new(),
    );
    assert_eq!(peers_of(&outcome), ["flac", "mp3"]);
}

#[test]
fn musical_fit_breaks_ties_within_a_tier() {
    let mut req = request();
    req.target_bpm = Some(124.0);
    req.target_key = Some("5A".parse().unwrap());

    let mut exact = candidate("exact", Codec::Lossy, 320, 25 * MB);
    exact.bpm = Some(125.5);
    exact.key = Some("5A".parse().unwrap());
    let mut adjacent = candidate("adjacent", Codec::Lossy, 320, 25 * MB);
    adjacent.bpm = Some(124.0);
    adjacent.key = Some("6A".parse().unwrap());
    let unknown = candidate("unknown", Codec::Lossy, 320, 25 * MB);
    let mut clash = candidate("clash", Codec::Lossy, 320, 25 * MB);
    clash.bpm = Some(174.0);
    clash.key = Some("11B".parse().unwrap());

    let outcome = RankingEngine::default().rank(
        &req,
        vec![clash, unknown, adjacent, exact],
        &PeerSignals::default(),
        &HashSet::new(),
    );
    // Unknown metadata is neutral: below any match, above a known mismatch.
    assert_eq!(peers_of(&outcome), ["exact", "adjacent", "unknown", "clash"]);
}

#[test]
fn availability_orders_within_tier() {
    let mut free = candidate("free", Codec::Lossy, 320, 25 * MB);
    free.has_free_slot = true;
    let mut short_queue = candidate("short", Codec::Lossy, 320, 25 * MB);
    short_queue.queue_length = 2;
    let mut long_queue = candidate("long", Codec::Lossy, 320, 25 * MB);
    long_queue.queue_length = 51;

    let outcome = RankingEngine::default().rank(
        &request(),
        vec![long_queue, short_queue, free],
        &PeerSignals::default(),
        &HashSet::new(),
    );
    assert_eq!(peers_of(&outcome), ["free", "short", "long"]);
    let long = &outcome.ranked[2];
    assert!(long.breakdown.terms().iter().any(|t| t.label == "long_queue"));
    assert_eq!(long.score, 300.0 - 51.0 - 40.0);
}

#[test]
fn blacklisted_peers_are_excluded_before_scoring() {
    let mut peers = PeerSignals::default();
    peers.insert(
        PeerId::new("bad"),
        PeerSignal {
            blacklisted: true,
            failure_rate: 1.0,
        },
    );
    let mut great = candidate("bad", Codec::Lossless, 1411, 112 * MB);
    great.has_free_slot = true;
    let ok = candidate("good", Codec::Lossy, 192, 15_300_000);

    let outcome = RankingEngine::default().rank(&request(), vec![great, ok], &peers, &HashSet::new());
    assert_eq!(peers_of(&outcome), ["good"]);
    assert_eq!(outcome.excluded[0].reason, ExclusionReason::BlacklistedPeer);
}

#[test]
fn peer_failure_rate_penalizes_within_tier() {
    let mut peers = PeerSignals::default();
    peers.insert(
        PeerId::new("flaky"),
        PeerSignal {
            blacklisted: false,
            failure_rate: 0.5,
        },
    );
    let flaky = candidate("flaky", Codec::Lossy, 320, 25 * MB);
    let steady = candidate("steady", Codec::Lossy, 320, 25 * MB);
    let outcome = RankingEngine::default().rank(&request(), vec![flaky, steady], &peers, &HashSet::new());
    assert_eq!(peers_of(&outcome), ["steady", "flaky"]);
    assert_eq!(outcome.ranked[1].score, 300.0 - 30.0);
}

#[test]
fn previously_rejected_and_duplicates_are_skipped() {
    let a = candidate("a", Codec::Lossy, 320, 25 * MB);
    let b = candidate("b", Codec::Lossy, 320, 25 * MB);
    let mut rejected = HashSet::new();
    rejected.insert(a.id());
    let outcome = RankingEngine::default().rank(
        &request(),
        vec![a, b.clone(), b],
        &PeerSignals::default(),
        &rejected,
    );
    assert_eq!(peers_of(&outcome), ["b"]);
    let reasons: Vec<_> = outcome.excluded.iter().map(|e| e.reason.clone()).collect();
    assert_eq!(
        reasons,
        [ExclusionReason::PreviouslyRejected, ExclusionReason::Duplicate]
    );
}

#[test]
fn quality_floor_infers_undeclared_bitrate() {
    // No declared bitrate, but 25 MB over 10:37 is ~314 kbps.
    let undeclared = candidate("vbr", Codec::Lossy, 0, 25 * MB);
    let low = candidate("low", Codec::Lossy, 128, 10_200_000);
    let outcome = RankingEngine::default().rank(
        &request(),
        vec![low, undeclared],
        &PeerSignals::default(),
        &HashSet::new(),
    );
    assert_eq!(peers_of(&outcome), ["vbr", "low"]);
    assert_eq!(outcome.ranked[0].verdict.tier, Tier::Bronze);
    assert_eq!(outcome.ranked[0].tier, Tier::Gold);
    assert_eq!(outcome.ranked[1].score, 64.0);
}

#[test]
fn default_weights_keep_musical_bonus_below_quality_gap() {
    let w = RankingWeights::default();
    assert_eq!(w.min_quality_gap(), 150.0);
    assert!(w.musical_bonuses_below_quality_gap());
}

#[test]
fn inferred_bitrate_clamps_instead_of_overflowing() {
    let engine = RankingEngine::default();
    let mut huge = candidate("huge", Codec::Lossy, 0, u64::MAX);
    huge.duration_secs = Some(1);
    let mut slow = candidate("slow", Codec::Lossy, 0, 1);
    slow.duration_secs = Some(u32::MAX);
    let outcome = engine.rank(
        &TrackRequest::new("Underworld", "Dark & Long"),
        vec![huge, slow],
        &PeerSignals::default(),
        &HashSet::new(),
    );

    assert_eq!(peers_of(&outcome), ["huge", "slow"]);
    assert_eq!(outcome.ranked[0].tier, Tier::Gold);
    assert_eq!(outcome.ranked[1].tier, Tier::Bronze);
    assert_eq!(inferred_kbps(u64::MAX, 1), u32::MAX);
    assert_eq!(inferred_kbps(8_000, 8), 8);
}
