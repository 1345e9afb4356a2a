use std::path::{Path, PathBuf};

use crate::candidate::SearchCandidate;
use crate::track::TrackRequest;

/// Destination for a track: `<dir>/<Artist - Title>.<ext>`, extension taken
/// from the chosen candidate.
pub fn final_path_for(dir: &Path, request: &TrackRequest, candidate: &SearchCandidate) -> PathBuf {
    let stem = sanitize_filename(&format!("{} - {}", request.artist, request.title));
    let stem = if stem.is_empty() {
        request.hash().short().to_string()
    } else {
        stem
    };
    match candidate.extension() {
        Some(ext) => dir.join(format!("{stem}.{ext}")),
        None => dir.join(stem),
    }
}

/// Make a name safe as a single Linux path component: no NUL, slashes or
/// control characters, no leading/trailing dots. Leaves room under
/// NAME_MAX for an extension and the `.part` suffix.
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 240;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let replacement = if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            '_'
        } else {
            c
        };
        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
