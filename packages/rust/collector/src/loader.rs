//! Concurrent content loading.
//!
//! Every candidate is read on its own task; results are slotted back by
//! index so the report keeps the collector's path order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use repowiki_shared::LoadedDocument;

use crate::collect::RepoFile;

/// Upper bound on files held open at once.
pub const DEFAULT_MAX_OPEN_FILES: usize = 64;

/// Options for [`load_documents`].
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Trimmed content shorter than this (in characters) is skipped.
    pub min_content_len: usize,
    pub max_open_files: usize,
    /// Report progress every N completed loads.
    pub report_interval: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            min_content_len: 50,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            report_interval: 10,
        }
    }
}

/// Progress callback for the loading stage.
pub trait LoadProgress: Send + Sync {
    fn files_loaded(&self, done: usize, total: usize);
}

/// Outcome of loading one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadedDocument),
    /// Content too short after decoding; not an error.
    Skipped,
    /// Read failure with its reason.
    Failed(String),
}

/// Per-path classification of a load batch.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Documents in candidate order.
    pub documents: Vec<LoadedDocument>,
    /// Relative paths skipped for being too short.
    pub skipped: Vec<String>,
    /// `(relative path, reason)` for every read failure.
    pub errors: Vec<(String, String)>,
}

impl LoadReport {
    /// Number of candidates this report accounts for.
    pub fn candidates(&self) -> usize {
        self.documents.len() + self.skipped.len() + self.errors.len()
    }
}

/// Decode raw bytes permissively and apply the size floor.
pub fn classify(relative_path: &str, bytes: &[u8], min_content_len: usize) -> LoadOutcome {
    let content = String::from_utf8_lossy(bytes);
    if content.trim().chars().count() < min_content_len {
        return LoadOutcome::Skipped;
    }
    LoadOutcome::Loaded(LoadedDocument::new(relative_path, &content, bytes.len()))
}

/// Load all `files` concurrently.
///
/// Never fails as a whole: read errors and panicked tasks are recorded
/// against the offending path.
#[instrument(skip_all, fields(files = files.len()))]
pub async fn load_documents(
    files: &[RepoFile],
    opts: &LoaderOptions,
    progress: &dyn LoadProgress,
) -> LoadReport {
    let total = files.len();
    let semaphore = Arc::new(Semaphore::new(opts.max_open_files.max(1)));
    let mut join_set = JoinSet::new();

    for (idx, file) in files.iter().enumerate() {
        let sem = Arc::clone(&semaphore);
        let path: PathBuf = file.path.clone();
        let relative_path = file.relative_path.clone();
        let min = opts.min_content_len;

        join_set.spawn(async move {
            let outcome = match sem.acquire_owned().await {
                Ok(_permit) => match tokio::fs::read(&path).await {
                    Ok(bytes) => classify(&relative_path, &bytes, min),
                    Err(e) => LoadOutcome::Failed(e.to_string()),
                },
                Err(_) => LoadOutcome::Failed("loader shut down".into()),
            };
            (idx, outcome)
        });
    }

    let mut slots: Vec<Option<LoadOutcome>> = vec![None; total];
    let mut done = 0usize;
    let interval = opts.report_interval.max(1);

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, outcome)) => slots[idx] = Some(outcome),
            Err(e) => warn!(error = %e, "load task failed to complete"),
        }
        done += 1;
        if done % interval == 0 || done == total {
            progress.files_loaded(done, total);
        }
    }

    let mut report = LoadReport::default();
    for (file, slot) in files.iter().zip(slots) {
        match slot.unwrap_or_else(|| LoadOutcome::Failed("load task did not complete".into())) {
            LoadOutcome::Loaded(doc) => report.documents.push(doc),
            LoadOutcome::Skipped => {
                debug!(path = %file.relative_path, "content below minimum, skipped");
                report.skipped.push(file.relative_path.clone());
            }
            LoadOutcome::Failed(reason) => {
                warn!(path = %file.relative_path, error = %reason, "failed to read file");
                report.errors.push((file.relative_path.clone(), reason));
            }
        }
    }

    info!(
        loaded = report.documents.len(),
        skipped = report.skipped.len(),
        errors = report.errors.len(),
        "content loading complete"
    );

    report
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::collect::{CollectRules, collect_files};

    struct CountingProgress(AtomicUsize);

    impl LoadProgress for CountingProgress {
        fn files_loaded(&self, _done: usize, _total: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rw-loader-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn repo_file(root: &Path, rel: &str) -> RepoFile {
        let path = root.join(rel);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        RepoFile {
            path,
            relative_path: rel.to_string(),
            size,
        }
    }

    #[test]
    fn classify_skips_whitespace_padding() {
        let padded = format!("{}{}", " ".repeat(200), "short");
        assert_eq!(classify("a.md", padded.as_bytes(), 50), LoadOutcome::Skipped);
    }

    #[test]
    fn classify_decodes_invalid_utf8() {
        let mut bytes = b"valid text ".repeat(10);
        bytes.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        match classify("bin.txt", &bytes, 50) {
            LoadOutcome::Loaded(doc) => {
                assert!(doc.body.starts_with("# File: bin.txt\n\n"));
                assert_eq!(doc.byte_length, bytes.len());
            }
            other => panic!("expected Loaded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_then_load_yields_single_document() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("tiny.md"), "x".repeat(10)).unwrap();
        let guide = "# Guide\n".to_string() + &"word ".repeat(100);
        std::fs::write(tmp.join("guide.md"), guide).unwrap();

        let rules = CollectRules::new(["md"], &[], 50).unwrap();
        let files = collect_files(&tmp, &rules).unwrap();
        let opts = LoaderOptions::default();
        let progress = CountingProgress(AtomicUsize::new(0));
        let report = load_documents(&files, &opts, &progress).await;

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].relative_path, "guide.md");
        assert!(report.skipped.is_empty());
        assert!(report.errors.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn results_keep_candidate_order_and_account_for_all() {
        let tmp = temp_dir();
        let names = ["a.md", "b.md", "c.md", "d.md", "e.md"];
        for (i, name) in names.iter().enumerate() {
            let body = if i == 2 { "tiny".to_string() } else { format!("{name} ").repeat(30) };
            std::fs::write(tmp.join(name), body).unwrap();
        }

        let mut files: Vec<RepoFile> = names.iter().map(|n| repo_file(&tmp, n)).collect();
        files.push(RepoFile {
            path: tmp.join("vanished.md"),
            relative_path: "vanished.md".into(),
            size: 100,
        });

        let opts = LoaderOptions {
            max_open_files: 2,
            report_interval: 2,
            ..Default::default()
        };
        let progress = CountingProgress(AtomicUsize::new(0));
        let report = load_documents(&files, &opts, &progress).await;

        let loaded: Vec<&str> = report
            .documents
            .iter()
            .map(|d| d.relative_path.as_str())
            .collect();
        assert_eq!(loaded, vec!["a.md", "b.md", "d.md", "e.md"]);
        assert_eq!(report.skipped, vec!["c.md".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "vanished.md");
        assert_eq!(report.candidates(), files.len());
        // 6 files, interval 2: reports at 2, 4, 6.
        assert_eq!(progress.0.load(Ordering::SeqCst), 3);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
