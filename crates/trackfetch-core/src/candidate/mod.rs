//! Search candidates: one peer's offered file for a searched track.
//!
//! Candidates are ephemeral and worker-local. They are created from a search
//! response, judged by the forensic filter and ranking engine, and dropped once
//! a transfer attempt is made or the search round ends. The only place a
//! candidate is persisted is inside a journal snapshot, so an interrupted
//! transfer can resume without searching again.

mod key;

use serde::{Deserialize, Serialize};

use crate::peer_health::PeerId;

pub use key::{InvalidKey, MusicalKey, Ring};

/// Container/codec class as declared by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Lossless,
    Lossy,
}

impl Codec {
    /// Classify by file extension; unknown extensions count as lossy.
    pub fn from_filename(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "flac" | "wav" | "aiff" | "aif" | "alac" | "ape" | "wv" => Codec::Lossless,
            _ => Codec::Lossy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub peer: PeerId,
    /// Peer-side path of the offered file.
    pub filename: String,
    /// Declared bitrate in kbps; 0 when the peer did not declare one.
    #[serde(default)]
    pub bitrate_kbps: u32,
    pub size_bytes: u64,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub has_free_slot: bool,
    #[serde(default)]
    pub queue_length: u32,
    #[serde(default)]
    pub bpm: Option<f32>,
    #[serde(default)]
    pub key: Option<MusicalKey>,
    pub codec: Codec,
}

/// Identity of a candidate across search rounds: same peer, same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId {
    pub peer: PeerId,
    pub filename: String,
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.peer, self.filename)
    }
}

impl SearchCandidate {
    pub fn id(&self) -> CandidateId {
        CandidateId {
            peer: self.peer.clone(),
            filename: self.filename.clone(),
        }
    }

    /// File extension of the peer-side filename, if any (lowercase, no dot).
    pub fn extension(&self) -> Option<String> {
        let base = self.filename.rsplit(['/', '\\']).next().unwrap_or(&self.filename);
        base.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
    }
}
