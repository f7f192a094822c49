//! One-file-per-cycle report directory.

use crate::error::{StorageError, StorageResult};
use crate::models::Report;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Writes reports as pretty JSON files under one directory.
///
/// Files are created with create-new semantics: an existing report is never
/// overwritten. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `report` and return the path written.
    ///
    /// The JSON is first written and synced under a staging name, then
    /// hard-linked to its final name, so a report file is either complete
    /// or absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a report with the same name is
    /// already present, and I/O or serialization errors otherwise.
    pub async fn write(&self, report: &Report) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = report.file_name();
        let path = self.dir.join(&name);
        let staging = self.dir.join(format!(".{name}.partial"));
        let mut json = serde_json::to_vec_pretty(report)?;
        json.push(b'\n');

        if let Err(e) = stage(&staging, &json).await {
            discard(&staging).await;
            return Err(e.into());
        }

        // Linking fails instead of replacing an existing report.
        let linked = tokio::fs::hard_link(&staging, &path).await;
        discard(&staging).await;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(path));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            cycle_id = %report.cycle_id,
            outcome = %report.outcome,
            path = %path.display(),
            "Report written"
        );
        Ok(path)
    }

    /// Most recent report in the directory, by file name.
    ///
    /// Returns `None` if the directory is missing or holds no reports.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidReport` if the newest file cannot be
    /// parsed.
    pub async fn latest(&self) -> StorageResult<Option<(PathBuf, Report)>> {
        let Some(path) = self.list().await?.pop() else {
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await?;
        let report = serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidReport {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded latest report");
        Ok(Some((path, report)))
    }

    /// Report files in the directory, oldest first.
    pub async fn list(&self) -> StorageResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_report = path.extension().is_some_and(|ext| ext == "json")
                && entry.file_type().await?.is_file();
            if is_report {
                paths.push(path);
            }
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

async fn stage(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn discard(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Staging file not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parkgate_core::{CycleId, CycleOutcome};
    use uuid::Uuid;

    fn report(cycle: u64) -> Report {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        Report::new(Uuid::nil(), 1, CycleId::new(cycle), started, CycleOutcome::NoMatch)
    }

    #[tokio::test]
    async fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("nested/reports"));

        let path = writer.write(&report(1)).await.unwrap();

        assert!(path.starts_with(writer.dir()));
        let written: Report = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, report(1));
    }

    #[tokio::test]
    async fn test_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        let path = writer.write(&report(1)).await.unwrap();
        let original = std::fs::read(&path).unwrap();

        let mut changed = report(1);
        changed.outcome = CycleOutcome::Matched;
        let result = writer.write(&changed).await;

        assert!(matches!(result, Err(StorageError::AlreadyExists(p)) if p == path));
        assert_eq!(std::fs::read(&path).unwrap(), original);

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "staging file left behind");
    }

    #[tokio::test]
    async fn test_interrupted_write_is_not_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        let complete = writer.write(&report(1)).await.unwrap();

        let name = report(2).file_name();
        std::fs::write(dir.path().join(format!(".{name}.partial")), b"{\"report_ver").unwrap();

        assert_eq!(writer.list().await.unwrap(), vec![complete.clone()]);
        let (latest, _) = writer.latest().await.unwrap().unwrap();
        assert_eq!(latest, complete);

        // The stale staging file does not block the real write.
        let path = writer.write(&report(2)).await.unwrap();
        assert_eq!(writer.latest().await.unwrap().unwrap().0, path);
    }

    #[tokio::test]
    async fn test_latest_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("absent"));
        assert!(writer.latest().await.unwrap().is_none());
    }
}
