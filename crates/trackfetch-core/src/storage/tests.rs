use std::path::Path;

use super::*;
use crate::candidate::{Codec, SearchCandidate};
use crate::peer_health::PeerId;
use crate::track::TrackRequest;

#[test]
fn temp_path_appends_part() {
    let p = temp_path(Path::new("track.flac"));
    assert_eq!(p.to_string_lossy(), "track.flac.part");
    let p2 = temp_path(Path::new("/music/a b.mp3"));
    assert_eq!(p2.to_string_lossy(), "/music/a b.mp3.part");
}

#[test]
fn final_path_uses_request_and_candidate_extension() {
    let req = TrackRequest::new("AC/DC", "Back in Black");
    let cand = SearchCandidate {
        peer: PeerId::new("p"),
        filename: "music\\acdc\\06 Back In Black.FLAC".to_string(),
        bitrate_kbps: 0,
        size_bytes: 30_000_000,
        duration_secs: Some(255),
        has_free_slot: true,
        queue_length: 0,
        bpm: None,
        key: None,
        codec: Codec::Lossless,
    };
    let path = final_path_for(Path::new("/music"), &req, &cand);
    assert_eq!(path, Path::new("/music/AC_DC - Back in Black.flac"));
}

#[test]
fn sanitize_strips_separators_and_dots() {
    assert_eq!(sanitize_filename("..hidden/\u{0}name.."), "hidden_name");
    assert_eq!(sanitize_filename("   "), "");
    let long = "é".repeat(200);
    let s = sanitize_filename(&long);
    assert!(s.len() <= 240);
    assert!(s.chars().all(|c| c == 'é'));
}

#[tokio::test]
async fn finalize_renames_and_removes_part() {
    let dir = tempfile::tempdir().unwrap();
    let final_path = dir.path().join("out.flac");
    let tmp = temp_path(&final_path);
    std::fs::write(&tmp, b"audio").unwrap();

    finalize(&tmp, &final_path).await.unwrap();
    assert!(!tmp.exists());
    assert_eq!(std::fs::read(&final_path).unwrap(), b"audio");
}

#[tokio::test]
async fn partial_len_truncate_and_discard() {
    let dir = tempfile::tempdir().unwrap();
    let tmp = dir.path().join("x.mp3.part");
    assert_eq!(partial_len(&tmp).await.unwrap(), None);

    std::fs::write(&tmp, vec![7u8; 100]).unwrap();
    assert_eq!(partial_len(&tmp).await.unwrap(), Some(100));
    truncate_partial(&tmp, 40).await.unwrap();
    assert_eq!(partial_len(&tmp).await.unwrap(), Some(40));

    discard_partial(&tmp).await.unwrap();
    assert!(!tmp.exists());
    discard_partial(&tmp).await.unwrap();
}

#[test]
fn write_atomic_replaces_contents_and_creates_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    write_atomic(&path, b"{\"v\":1}").unwrap();
    write_atomic(&path, b"{\"v\":2}").unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"{\"v\":2}");
    assert!(!temp_path(&path).exists());
}
