//! Removal of content files no manifest entry points to.

use std::path::Path;

use rustc_hash::FxHashSet;

use super::manifest::CONTENT_PREFIX;
use crate::error::CacheError;

/// Delete every `c-*` file in `dir` not listed in `referenced`.
///
/// Returns the number of files removed. A file that vanishes mid-sweep is
/// not an error.
pub async fn sweep_stale(dir: &Path, referenced: &FxHashSet<String>) -> Result<usize, CacheError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CacheError::io(dir, e))?;

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| CacheError::io(dir, e))? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(CONTENT_PREFIX) || referenced.contains(name) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(entry.path(), e)),
        }
    }
    Ok(removed)
}

/// Delete every regular file in `dir`.
pub async fn purge(dir: &Path) -> Result<usize, CacheError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CacheError::io(dir, e))?;

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| CacheError::io(dir, e))? {
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| CacheError::io(entry.path(), e))?
            .is_file();
        if is_file {
            tokio::fs::remove_file(entry.path())
                .await
                .map_err(|e| CacheError::io(entry.path(), e))?;
            removed += 1;
        }
    }
    Ok(removed)
}
