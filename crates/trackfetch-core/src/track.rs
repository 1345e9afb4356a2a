//! Track identity and the per-track request carried through the queue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::candidate::MusicalKey;

/// Content-addressable identity of a track: SHA-256 over the normalized
/// artist/title pair, lowercase hex. Independent of any peer's filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackHash(String);

impl TrackHash {
    /// Hash the normalized `artist \x1f title` pair.
    pub fn of(artist: &str, title: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize(artist).as_bytes());
        hasher.update([0x1f]);
        hasher.update(normalize(title).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a hash read back from our own database without re-validating it.
    pub(crate) fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars; enough to disambiguate in logs and filenames.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

/// Lowercase, trim, and collapse internal whitespace.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for TrackHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid track hash {0:?}: expected 64 hex characters")]
pub struct InvalidTrackHash(String);

impl FromStr for TrackHash {
    type Err = InvalidTrackHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidTrackHash(s.to_string()))
        }
    }
}

/// One entry of the user's track list as handed to the acquisition queue.
///
/// Optional fields are "unknown", which ranking treats as neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub artist: String,
    pub title: String,
    /// Canonical duration from the track list, used by the duration guard clause.
    #[serde(default)]
    pub canonical_duration_secs: Option<u32>,
    #[serde(default)]
    pub target_bpm: Option<f32>,
    #[serde(default)]
    pub target_key: Option<MusicalKey>,
}

impl TrackRequest {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            canonical_duration_secs: None,
            target_bpm: None,
            target_key: None,
        }
    }

    pub fn hash(&self) -> TrackHash {
        TrackHash::of(&self.artist, &self.title)
    }

    /// Free-text query sent to the transport's search.
    pub fn query(&self) -> String {
        format!("{} {}", self.artist.trim(), self.title.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_case_and_whitespace() {
        let a = TrackHash::of("Daft Punk", "Around the World");
        let b = TrackHash::of("  daft   punk ", "AROUND THE WORLD");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn hash_separates_artist_and_title() {
        assert_ne!(TrackHash::of("ab", "c"), TrackHash::of("a", "bc"));
    }

    #[test]
    fn parse_roundtrips_display() {
        let h = TrackHash::of("Boards of Canada", "Roygbiv");
        let parsed: TrackHash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert!("xyz".parse::<TrackHash>().is_err());
    }

    #[test]
    fn request_query_and_hash() {
        let req = TrackRequest::new("Orbital ", " Halcyon");
        assert_eq!(req.query(), "Orbital Halcyon");
        assert_eq!(req.hash(), TrackHash::of("orbital", "halcyon"));
    }
}
