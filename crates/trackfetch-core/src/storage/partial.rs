use std::io;
use std::path::Path;

/// Length of an existing partial file, or `None` if there is none.
pub async fn partial_len(temp: &Path) -> io::Result<Option<u64>> {
    match tokio::fs::metadata(temp).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Cut a partial file back to `len` bytes. Bytes written after the last
/// durable checkpoint are not trusted on resume.
pub async fn truncate_partial(temp: &Path, len: u64) -> io::Result<()> {
    let file = tokio::fs::OpenOptions::new().write(true).open(temp).await?;
    file.set_len(len).await?;
    file.sync_all().await
}

/// Delete a partial file. Missing is fine.
pub async fn discard_partial(temp: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
