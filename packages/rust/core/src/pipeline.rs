//! End-to-end pipelines: `index` (repository to knowledge engine) and
//! `generate` (knowledge engine to wiki).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument, warn};

use repowiki_collector::{
    CollectRules, DEFAULT_MAX_OPEN_FILES, LoadProgress, LoaderOptions, collect_files,
    load_documents,
};
use repowiki_engine::KnowledgeEngine;
use repowiki_shared::{IngestOptions, RepoWikiError, Result, RunId, Settings};

use crate::generator::{self, GeneratedPage, PageProgress};
use crate::ingest::{self, IngestProgress, IngestReport};
use crate::registry::wiki_structure;
use crate::report::{
    FailureRecord, GENERATE_REPORT_FILE, GenerateRunReport, INDEX_REPORT_FILE, IndexRunReport,
    read_report, write_report,
};
use crate::writer::{self, WrittenFile};

/// Default delay between engine status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as items within a phase complete.
    fn advance(&self, current: usize, total: usize, detail: &str);
    /// Called once when the pipeline is done, successful or not.
    fn finish(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn advance(&self, _current: usize, _total: usize, _detail: &str) {}
    fn finish(&self) {}
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Options for [`run_index`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Wait for the engine's background processing to go idle.
    pub wait_for_idle: bool,
    pub poll_interval: Duration,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            wait_for_idle: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of [`run_index`].
#[derive(Debug)]
pub struct IndexSummary {
    pub run_id: RunId,
    /// Files selected by the collector.
    pub candidates: usize,
    pub ingest: IngestReport,
    pub report_path: PathBuf,
    pub elapsed: Duration,
}

impl IndexSummary {
    /// Fails with [`RepoWikiError::NothingToIndex`] when the engine accepted
    /// no document, so nothing downstream runs against an empty graph.
    pub fn ensure_indexed(&self) -> Result<()> {
        if self.ingest.indexed > 0 {
            return Ok(());
        }
        Err(RepoWikiError::NothingToIndex {
            skipped: self.ingest.skipped,
            errors: self.ingest.errors,
        })
    }
}

/// Collect, load and ingest the repository.
///
/// 1. Collect candidate files
/// 2. Load their content concurrently
/// 3. Submit to the engine (batch, then per-document fallback)
/// 4. Wait for the engine to finish processing
/// 5. Write the run report
///
/// Fails with [`RepoWikiError::NothingToIndex`] when no candidate produced a
/// document.
#[instrument(
    skip_all,
    fields(repo = %settings.repo_path.display(), workspace = %settings.workspace)
)]
pub async fn run_index(
    settings: &Settings,
    engine: &dyn KnowledgeEngine,
    options: &IndexOptions,
    progress: &dyn ProgressReporter,
) -> Result<IndexSummary> {
    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = RunId::new();
    let adapter = PipelineProgress { inner: progress };

    info!(%run_id, "starting index pipeline");

    // --- Phase 1: Collect ---
    progress.phase("Collecting files");
    let rules = CollectRules::from_settings(settings)?;
    let files = collect_files(&settings.repo_path, &rules)?;
    info!(candidates = files.len(), "files collected");

    // --- Phase 2: Load ---
    progress.phase("Loading file contents");
    let loader = LoaderOptions {
        min_content_len: usize::try_from(settings.min_file_size).unwrap_or(usize::MAX),
        max_open_files: DEFAULT_MAX_OPEN_FILES,
        report_interval: settings.batch_report_interval,
    };
    let load = load_documents(&files, &loader, &adapter).await;

    if load.documents.is_empty() {
        progress.finish();
        return Err(RepoWikiError::NothingToIndex {
            skipped: load.skipped.len(),
            errors: load.errors.len(),
        });
    }

    // --- Phase 3: Submit ---
    progress.phase(&format!("Indexing {} documents", load.documents.len()));
    let ingest_options = IngestOptions::from(settings);
    let report = ingest::submit(
        engine,
        load,
        &ingest_options,
        settings.batch_report_interval,
        &adapter,
    )
    .await;

    // --- Phase 4: Wait for engine ---
    if options.wait_for_idle && report.indexed > 0 {
        progress.phase("Waiting for the knowledge engine");
        wait_until_idle(engine, options.poll_interval, progress).await;
    }

    // --- Phase 5: Report ---
    let run_report = IndexRunReport {
        run_id: run_id.clone(),
        started_at,
        finished_at: Utc::now(),
        repo_name: settings.repo_name.clone(),
        workspace: settings.workspace.clone(),
        candidates: files.len(),
        indexed: report.indexed,
        skipped: report.skipped,
        errors: report.errors,
        used_fallback: report.used_fallback,
        failures: report.failures.iter().cloned().map(FailureRecord::from).collect(),
    };
    let report_path = write_report(&settings.storage_dir, INDEX_REPORT_FILE, &run_report)?;

    progress.finish();

    let summary = IndexSummary {
        run_id,
        candidates: files.len(),
        ingest: report,
        report_path,
        elapsed: start.elapsed(),
    };

    info!(
        indexed = summary.ingest.indexed,
        skipped = summary.ingest.skipped,
        errors = summary.ingest.errors,
        elapsed_ms = summary.elapsed.as_millis(),
        "index pipeline complete"
    );

    Ok(summary)
}

/// Poll the engine until it reports no background work. A status error
/// ends the wait with a warning rather than failing the run.
async fn wait_until_idle(
    engine: &dyn KnowledgeEngine,
    poll_interval: Duration,
    progress: &dyn ProgressReporter,
) {
    let mut polls = 0usize;
    loop {
        match engine.pipeline_status().await {
            Ok(status) if !status.busy => {
                info!(polls, "knowledge engine idle");
                return;
            }
            Ok(status) => {
                polls += 1;
                let detail = status.latest_message.unwrap_or_else(|| "processing".into());
                progress.phase(&format!("Knowledge engine busy: {detail}"));
            }
            Err(e) => {
                warn!(error = %e, "could not read engine status, not waiting");
                return;
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// Result of [`run_generate`].
#[derive(Debug)]
pub struct GenerateSummary {
    pub run_id: RunId,
    pub generated: usize,
    pub failed: usize,
    /// Every file written, root index last when it could be written.
    pub written: Vec<WrittenFile>,
    pub failures: Vec<FailureRecord>,
    pub output_dir: PathBuf,
    pub report_path: PathBuf,
    pub elapsed: Duration,
}

/// Generate the wiki from the engine's current knowledge.
#[instrument(skip_all, fields(output = %settings.output_dir.display(), extended = extended))]
pub async fn run_generate(
    settings: &Settings,
    engine: &dyn KnowledgeEngine,
    extended: bool,
    progress: &dyn ProgressReporter,
) -> Result<GenerateSummary> {
    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = RunId::new();

    info!(%run_id, "starting generate pipeline");

    match read_report::<IndexRunReport>(&settings.storage_dir, INDEX_REPORT_FILE) {
        Ok(Some(last)) => info!(
            indexed = last.indexed,
            at = %last.finished_at,
            "generating from indexed workspace"
        ),
        Ok(None) => warn!(
            workspace = %settings.workspace,
            "no index report found for this workspace; has `index` been run?"
        ),
        Err(e) => warn!(error = %e, "could not read previous index report"),
    }

    // --- Phase 1: Plan ---
    let structure = wiki_structure(extended);
    let plans = generator::plan(&structure);
    let total: usize = plans.iter().map(|p| p.job_count()).sum();

    // --- Phase 2: Query ---
    progress.phase(&format!("Generating {total} pages"));
    let adapter = PageCounter::new(progress, total);
    let results = generator::generate_all(engine, &plans, &adapter).await;

    // --- Phase 3: Write ---
    progress.phase("Writing wiki");
    let mut written = Vec::new();
    let mut failures = Vec::new();
    for result in &results {
        for page in result.all() {
            if let generator::PageOutcome::Failed { reason } = &page.outcome {
                failures.push(FailureRecord {
                    path: page.relative_path(),
                    reason: reason.clone(),
                });
            }
        }
        let category = writer::write_category(&settings.output_dir, result);
        written.extend(category.written);
        failures.extend(category.failures);
    }
    let generated = written.len();
    match writer::write_root_index(
        &settings.output_dir,
        &settings.repo_name,
        &structure,
        &written,
    ) {
        Ok(root) => written.push(root),
        Err(e) => {
            warn!(error = %e, "could not write root index");
            failures.push(FailureRecord {
                path: "README.md".into(),
                reason: e.to_string(),
            });
        }
    }
    let failed = failures.len();

    // --- Phase 4: Report ---
    let run_report = GenerateRunReport {
        run_id: run_id.clone(),
        started_at,
        finished_at: Utc::now(),
        extended,
        generated,
        failed,
        pages: written.clone(),
        failures: failures.clone(),
    };
    let report_path = write_report(&settings.storage_dir, GENERATE_REPORT_FILE, &run_report)?;

    progress.finish();

    let summary = GenerateSummary {
        run_id,
        generated,
        failed,
        written,
        failures,
        output_dir: settings.output_dir.clone(),
        report_path,
        elapsed: start.elapsed(),
    };

    info!(
        generated = summary.generated,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis(),
        "generate pipeline complete"
    );

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Progress adapters
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the stage-level progress interfaces.
struct PipelineProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl LoadProgress for PipelineProgress<'_> {
    fn files_loaded(&self, done: usize, total: usize) {
        self.inner.advance(done, total, "files loaded");
    }
}

impl IngestProgress for PipelineProgress<'_> {
    fn documents_submitted(&self, done: usize, total: usize) {
        self.inner.advance(done, total, "documents submitted");
    }
}

/// Counts resolved pages, since they finish in no particular order.
struct PageCounter<'a> {
    inner: &'a dyn ProgressReporter,
    done: std::sync::atomic::AtomicUsize,
    total: usize,
}

impl<'a> PageCounter<'a> {
    fn new(inner: &'a dyn ProgressReporter, total: usize) -> Self {
        Self {
            inner,
            done: std::sync::atomic::AtomicUsize::new(0),
            total,
        }
    }
}

impl PageProgress for PageCounter<'_> {
    fn page_done(&self, page: &GeneratedPage) {
        let done = self.done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        let mark = if page.content().is_some() { "done" } else { "failed" };
        self.inner
            .advance(done, self.total, &format!("{} ({mark})", page.title));
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use repowiki_engine::fakes::MemoryEngine;
    use repowiki_shared::Config;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rw-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("repo")).unwrap();
        dir
    }

    fn settings(root: &Path) -> Settings {
        Config {
            repo_path: root.join("repo"),
            working_dir: root.join("storage"),
            output_dir: root.join("wiki"),
            repo_name: Some("demo".into()),
            batch_report_interval: 2,
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    fn no_wait() -> IndexOptions {
        IndexOptions {
            wait_for_idle: false,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join("repo").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn index_ingests_collected_documents_and_writes_report() {
        let tmp = temp_dir();
        write(&tmp, "src/app.py", &"def main():\n    return 42\n".repeat(5));
        write(&tmp, "README.md", &"# Demo project\n\nSome words here. ".repeat(5));
        write(&tmp, "tiny.txt", "hi");
        write(&tmp, "node_modules/dep/index.py", &"x = 1\n".repeat(40));

        let s = settings(&tmp);
        let engine = MemoryEngine::new();
        let summary = run_index(&s, &engine, &no_wait(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.ingest.indexed, 2);
        let docs = engine.documents();
        assert!(docs["src/app.py"].starts_with("# File: src/app.py\n\n"));
        assert!(!docs.contains_key("node_modules/dep/index.py"));

        let report: IndexRunReport = read_report(&s.storage_dir, INDEX_REPORT_FILE)
            .unwrap()
            .unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.repo_name, "demo");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn index_with_nothing_loadable_fails() {
        let tmp = temp_dir();
        write(&tmp, "a.md", &format!("{}x", " ".repeat(80)));

        let s = settings(&tmp);
        let engine = MemoryEngine::new();
        let err = run_index(&s, &engine, &no_wait(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RepoWikiError::NothingToIndex {
                skipped: 1,
                errors: 0
            }
        ));
        assert!(engine.ingest_calls().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn index_rejected_by_engine_reports_nothing_indexed() {
        let tmp = temp_dir();
        write(&tmp, "a.md", &"alpha content ".repeat(10));
        write(&tmp, "b.md", &"beta content ".repeat(10));

        let s = settings(&tmp);
        let engine = MemoryEngine::new()
            .fail_batch_ingest()
            .fail_document("a.md")
            .fail_document("b.md");
        let summary = run_index(&s, &engine, &no_wait(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.ingest.indexed, 0);
        assert_eq!(summary.ingest.errors, 2);
        let err = summary.ensure_indexed().unwrap_err();
        assert!(matches!(
            err,
            RepoWikiError::NothingToIndex {
                skipped: 0,
                errors: 2
            }
        ));

        // The failed run is still on record.
        let report: IndexRunReport = read_report(&s.storage_dir, INDEX_REPORT_FILE)
            .unwrap()
            .unwrap();
        assert_eq!(report.errors, 2);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn index_waits_for_busy_engine() {
        let tmp = temp_dir();
        write(&tmp, "notes.md", &"plenty of content ".repeat(10));

        let s = settings(&tmp);
        let engine = MemoryEngine::new().busy_for(3);
        let options = IndexOptions {
            wait_for_idle: true,
            poll_interval: Duration::from_millis(1),
        };
        run_index(&s, &engine, &options, &SilentProgress)
            .await
            .unwrap();

        // Drained: the next poll reports idle.
        assert!(!engine.pipeline_status().await.unwrap().busy);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn generate_writes_pages_indexes_and_root() {
        let tmp = temp_dir();
        let s = settings(&tmp);
        let engine = MemoryEngine::new().fail_query_containing("Design Decisions");

        let summary = run_generate(&s, &engine, false, &SilentProgress)
            .await
            .unwrap();

        // Index + 2 of 3 pages.
        assert_eq!(summary.generated, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].path, "01-overview/design-decisions.md");
        assert!(s.output_dir.join("01-overview/README.md").exists());
        assert!(s.output_dir.join("01-overview/architecture.md").exists());
        assert!(!s.output_dir.join("01-overview/design-decisions.md").exists());

        let root = std::fs::read_to_string(s.output_dir.join("README.md")).unwrap();
        assert!(root.starts_with("# demo Wiki"));
        assert_eq!(summary.written.last().unwrap().path, "README.md");

        let report: GenerateRunReport = read_report(&s.storage_dir, GENERATE_REPORT_FILE)
            .unwrap()
            .unwrap();
        assert_eq!(report.pages.len(), summary.written.len());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn generate_records_unwritable_page_and_finishes() {
        let tmp = temp_dir();
        let s = settings(&tmp);
        std::fs::create_dir_all(s.output_dir.join("01-overview/architecture.md")).unwrap();
        let engine = MemoryEngine::new();

        let summary = run_generate(&s, &engine, false, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.generated, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].path, "01-overview/architecture.md");
        assert!(s.output_dir.join("01-overview/design-decisions.md").is_file());

        let root = std::fs::read_to_string(s.output_dir.join("README.md")).unwrap();
        assert!(root.contains("- Architecture\n"));

        let report: GenerateRunReport = read_report(&s.storage_dir, GENERATE_REPORT_FILE)
            .unwrap()
            .unwrap();
        assert_eq!(report.failed, 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn extended_generate_writes_nested_folders() {
        let tmp = temp_dir();
        let s = settings(&tmp);
        let engine = MemoryEngine::new();

        let summary = run_generate(&s, &engine, true, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.failed, 0);
        assert!(s.output_dir.join("06-modules/README.md").exists());
        assert!(s.output_dir.join("06-modules/core/entry-points.md").exists());
        assert!(!s.output_dir.join("06-modules/core/README.md").exists());

        let page =
            std::fs::read_to_string(s.output_dir.join("06-modules/core/entry-points.md")).unwrap();
        assert!(page.starts_with("# Entry Points\n\n"));
        assert!(page.contains("Home > Modules > Core > Entry Points"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
