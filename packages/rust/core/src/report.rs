//! Run reports.
//!
//! `index` and `generate` each leave a JSON record in the workspace storage
//! directory describing what they did.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use repowiki_shared::{RepoWikiError, Result, RunId};

use crate::writer::{WrittenFile, write_atomic};

pub const INDEX_REPORT_FILE: &str = "index-report.json";
pub const GENERATE_REPORT_FILE: &str = "generate-report.json";

/// A file or page that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: String,
    pub reason: String,
}

impl From<(String, String)> for FailureRecord {
    fn from((path, reason): (String, String)) -> Self {
        Self { path, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repo_name: String,
    pub workspace: String,
    pub candidates: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub used_fallback: bool,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extended: bool,
    pub generated: usize,
    pub failed: usize,
    pub pages: Vec<WrittenFile>,
    pub failures: Vec<FailureRecord>,
}

/// Write `report` as pretty JSON to `dir/file_name`, atomically.
pub fn write_report<T: Serialize>(dir: &Path, file_name: &str, report: &T) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| RepoWikiError::validation(format!("JSON serialization failed: {e}")))?;
    let path = dir.join(file_name);
    write_atomic(&path, json.as_bytes())?;
    debug!(path = %path.display(), "wrote run report");
    Ok(path)
}

/// Read a report written by [`write_report`]. `Ok(None)` when absent.
pub fn read_report<T: DeserializeOwned>(dir: &Path, file_name: &str) -> Result<Option<T>> {
    let path = dir.join(file_name);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoWikiError::io(&path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RepoWikiError::validation(format!("invalid {file_name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rw-report-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn index_report_is_readable_back() {
        let tmp = temp_dir();
        let now = Utc::now();
        let report = IndexRunReport {
            run_id: RunId::new(),
            started_at: now,
            finished_at: now,
            repo_name: "demo".into(),
            workspace: "main".into(),
            candidates: 3,
            indexed: 1,
            skipped: 1,
            errors: 1,
            used_fallback: true,
            failures: vec![("a.py".to_string(), "denied".to_string()).into()],
        };

        let path = write_report(&tmp, INDEX_REPORT_FILE, &report).unwrap();
        assert!(path.ends_with(INDEX_REPORT_FILE));

        let back: IndexRunReport = read_report(&tmp, INDEX_REPORT_FILE).unwrap().unwrap();
        assert_eq!(back, report);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_report_is_none_and_garbage_is_error() {
        let tmp = temp_dir();
        let none: Option<IndexRunReport> = read_report(&tmp, INDEX_REPORT_FILE).unwrap();
        assert!(none.is_none());

        std::fs::write(tmp.join(GENERATE_REPORT_FILE), "{not json").unwrap();
        let err = read_report::<GenerateRunReport>(&tmp, GENERATE_REPORT_FILE).unwrap_err();
        assert!(matches!(err, RepoWikiError::Validation { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
