use std::io::{self, Write};
use std::path::Path;

use super::temp_path;

/// Make a verified partial file visible at `final_path`: fsync the data,
/// rename over any existing file, then fsync the directory so the rename
/// itself is durable.
pub async fn finalize(temp: &Path, final_path: &Path) -> io::Result<()> {
    let file = tokio::fs::OpenOptions::new().write(true).open(temp).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(temp, final_path).await?;
    sync_parent(final_path).await;
    Ok(())
}

/// Write `bytes` to `path` via a sibling temp file and rename. Readers see
/// either the old contents or the new, never a torn write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)
}

#[cfg(unix)]
async fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    match tokio::fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                tracing::debug!(dir = %parent.display(), error = %e, "directory fsync failed");
            }
        }
        Err(e) => tracing::debug!(dir = %parent.display(), error = %e, "open dir for fsync failed"),
    }
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) {}
