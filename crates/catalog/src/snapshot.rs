//! Flat snapshot file helpers.
//!
//! Every catalog persists as a plain-text record file that is rewritten
//! wholesale on mutation. The rewrite goes to a sibling temp file which
//! is fsynced and renamed over the snapshot, so a reader never observes
//! a partially written record set.

use crate::error::CatalogResult;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Read a snapshot's lines. A missing file is an empty catalog.
pub async fn load_lines(path: &Path) -> CatalogResult<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace a snapshot with new contents.
pub async fn rewrite(path: &Path, contents: &str) -> CatalogResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
