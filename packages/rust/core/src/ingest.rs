//! Ingestion submitter.
//!
//! One batched call first; if the engine rejects the batch, every document
//! is resubmitted on its own, in order, exactly once.

use tracing::{info, instrument, warn};

use repowiki_collector::LoadReport;
use repowiki_engine::KnowledgeEngine;
use repowiki_shared::IngestOptions;

/// Progress callback for the per-document fallback.
pub trait IngestProgress: Send + Sync {
    fn documents_submitted(&self, done: usize, total: usize);
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// `(relative path, reason)` for every read or ingest failure.
    pub failures: Vec<(String, String)>,
    /// Whether the batched call failed and documents went one by one.
    pub used_fallback: bool,
}

impl IngestReport {
    /// Candidate files this report accounts for.
    pub fn total(&self) -> usize {
        self.indexed + self.skipped + self.errors
    }
}

/// Submit every loaded document to `engine`.
///
/// Skips and read errors from `load` are carried into the report, so the
/// returned counts always sum to the number of candidates that were loaded.
#[instrument(skip_all, fields(documents = load.documents.len()))]
pub async fn submit(
    engine: &dyn KnowledgeEngine,
    load: LoadReport,
    options: &IngestOptions,
    report_interval: usize,
    progress: &dyn IngestProgress,
) -> IngestReport {
    let LoadReport {
        documents,
        skipped,
        errors,
    } = load;

    let mut report = IngestReport {
        skipped: skipped.len(),
        errors: errors.len(),
        failures: errors,
        ..Default::default()
    };

    if documents.is_empty() {
        return report;
    }

    let total = documents.len();
    match engine.ingest(&documents, options).await {
        Ok(()) => {
            report.indexed = total;
            progress.documents_submitted(total, total);
            info!(indexed = total, "batch ingestion complete");
            return report;
        }
        Err(e) => {
            warn!(error = %e, "batch ingestion failed, falling back to per-document submission");
            report.used_fallback = true;
        }
    }

    let interval = report_interval.max(1);
    for (i, doc) in documents.iter().enumerate() {
        match engine.ingest(std::slice::from_ref(doc), options).await {
            Ok(()) => report.indexed += 1,
            Err(e) => {
                warn!(path = %doc.relative_path, error = %e, "document ingestion failed");
                report.errors += 1;
                report
                    .failures
                    .push((doc.relative_path.clone(), e.to_string()));
            }
        }

        let done = i + 1;
        if done % interval == 0 || done == total {
            progress.documents_submitted(done, total);
        }
    }

    info!(
        indexed = report.indexed,
        errors = report.errors,
        "sequential ingestion complete"
    );
    report
}
