use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use super::{SnapshotEntry, SnapshotId, SnapshotSource};

/// Snapshots stored as files under a local directory.
///
/// A collection is a sub-directory of `root` (empty collection = `root`);
/// ids are full file paths.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        let collection = collection.trim().trim_matches('/');
        if collection.is_empty() {
            self.root.clone()
        } else {
            self.root.join(collection)
        }
    }
}

/// Files directly inside `dir`, in glob's (alphabetical) order.
fn scan_dir(dir: &Path) -> Result<Vec<SnapshotEntry>> {
    if !dir.is_dir() {
        bail!("snapshot directory {} does not exist", dir.display());
    }
    let pattern = format!("{}/*", Pattern::escape(&dir.to_string_lossy()));
    let mut out = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {}", pattern))? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        out.push(SnapshotEntry {
            id: SnapshotId::new(path.to_string_lossy()),
            name,
            modified,
        });
    }
    Ok(out)
}

impl SnapshotSource for FsSource {
    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    async fn list(&self, collection: &str) -> Result<Vec<SnapshotEntry>> {
        let dir = self.collection_dir(collection);
        let entries = tokio::task::spawn_blocking(move || scan_dir(&dir))
            .await
            .context("directory scan task failed")??;
        debug!(count = entries.len(), "listed snapshot files");
        Ok(entries)
    }

    async fn fetch(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        tokio::fs::read(id.as_str())
            .await
            .with_context(|| format!("reading snapshot file {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_files_and_reads_bytes() -> Result<()> {
        let tmp = tempdir()?;
        let weekly = tmp.path().join("semanal");
        fs::create_dir_all(weekly.join("nested"))?;
        fs::write(weekly.join("10-01-2024_AO_GENERAL.txt"), b"a")?;
        fs::write(weekly.join("05-01-2024_AO_GENERAL.txt"), b"bb")?;
        fs::write(weekly.join("notas.md"), b"c")?;

        let source = FsSource::new(tmp.path());
        let entries = source.list("semanal").await?;
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["05-01-2024_AO_GENERAL.txt", "10-01-2024_AO_GENERAL.txt", "notas.md"]
        );
        assert!(entries.iter().all(|e| e.modified.is_some()));

        let bytes = source.fetch(&entries[0].id).await?;
        assert_eq!(bytes, b"bb");
        Ok(())
    }

    #[tokio::test]
    async fn empty_collection_is_root() -> Result<()> {
        let tmp = tempdir()?;
        fs::write(tmp.path().join("01-01-2024_AO_GENERAL.txt"), b"x")?;
        let entries = FsSource::new(tmp.path()).list("").await?;
        assert_eq!(entries.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_and_file_are_errors() {
        let tmp = tempdir().unwrap();
        let source = FsSource::new(tmp.path());
        assert!(source.list("no-such-dir").await.is_err());
        assert!(source
            .fetch(&SnapshotId::new(tmp.path().join("gone.txt").to_string_lossy()))
            .await
            .is_err());
    }
}
