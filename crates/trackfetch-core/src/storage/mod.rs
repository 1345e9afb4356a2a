//! File lifecycle for acquired tracks.
//!
//! Transfers always write to `<final>.part`. A partial file is only renamed
//! into place after its size has been verified, and the rename is preceded by
//! an fsync of the data, so a crash never leaves a truncated file at the
//! final path. The same temp-then-rename discipline backs `write_atomic`,
//! used for small state snapshots.

mod atomic;
mod naming;
mod partial;

pub use atomic::{finalize, write_atomic};
pub use naming::{final_path_for, sanitize_filename};
pub use partial::{discard_partial, partial_len, truncate_partial};

use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path
/// (`track.flac` → `track.flac.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests;
