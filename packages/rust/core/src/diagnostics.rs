//! Setup diagnostics for the `test` command.
//!
//! Checks the repository, storage permissions, the knowledge engine and the
//! model credentials. Engine and filesystem problems are errors; credential
//! and model problems are warnings, since `index` can still run without them
//! when the engine holds its own.

use std::fmt::Write as _;

use tracing::{debug, instrument};

use repowiki_collector::{CollectRules, collect_files};
use repowiki_engine::{KnowledgeEngine, ModelBindings};
use repowiki_shared::{Result, Settings};

/// Outcome class of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Passed,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub severity: Severity,
    pub detail: String,
}

impl Check {
    fn passed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::Passed,
            detail: detail.into(),
        }
    }

    fn warning(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::Warning,
            detail: detail.into(),
        }
    }

    fn error(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::Error,
            detail: detail.into(),
        }
    }
}

/// All checks from one diagnostic run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    pub fn errors(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Plain-text report: one line per check, then the error and warning
    /// sections and a verdict.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let tag = match check.severity {
                Severity::Passed => "  ok  ",
                Severity::Warning => " warn ",
                Severity::Error => " FAIL ",
            };
            let _ = writeln!(out, "[{tag}] {}: {}", check.name, check.detail);
        }

        let _ = writeln!(out, "\n{}", "=".repeat(60));
        if self.has_errors() {
            let _ = writeln!(out, "ERRORS FOUND:");
            for c in self.errors() {
                let _ = writeln!(out, "  - {}: {}", c.name, c.detail);
            }
        }
        if self.warnings().next().is_some() {
            let _ = writeln!(out, "WARNINGS:");
            for c in self.warnings() {
                let _ = writeln!(out, "  - {}: {}", c.name, c.detail);
            }
        }

        let verdict = match (self.has_errors(), self.warnings().next().is_some()) {
            (true, _) => "SETUP INCOMPLETE - fix errors before proceeding",
            (false, true) => "READY (with warnings)",
            (false, false) => "ALL CHECKS PASSED - ready to generate the wiki",
        };
        let _ = writeln!(out, "{verdict}");
        out
    }
}

/// Run every check. Never fails; problems become report entries.
#[instrument(skip_all, fields(repo = %settings.repo_path.display()))]
pub async fn run_diagnostics(
    settings: &Settings,
    engine: &dyn KnowledgeEngine,
    models: Option<&ModelBindings>,
) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    report.checks.push(check_repository(settings));
    report.checks.push(check_write_permission(settings));

    report.checks.push(match engine.health().await {
        Ok(health) => Check::passed(
            "knowledge engine",
            format!("{} at {}", health.status, settings.engine_url),
        ),
        Err(e) => Check::error("knowledge engine", e.to_string()),
    });

    report.checks.push(if settings.api_key.trim().is_empty() {
        Check::warning("API key", "API_KEY is not set (required for generation)")
    } else {
        Check::passed("API key", "set")
    });

    if let Some(models) = models {
        report.checks.push(
            match models.completion.complete("Reply with OK.", None).await {
                Ok(_) => Check::passed("completion model", models.completion.model_id()),
                Err(e) => Check::warning("completion model", e.to_string()),
            },
        );
        report.checks.push(check_embedding(models).await);
    }

    debug!(checks = report.checks.len(), "diagnostics complete");
    report
}

/// The embedding model must answer with vectors of its declared dimension.
async fn check_embedding(models: &ModelBindings) -> Check {
    let embedding = &models.embedding;
    match embedding.embed(&["ping".to_string()]).await {
        Ok(vectors) => {
            let actual = vectors.first().map(Vec::len).unwrap_or_default();
            if actual == embedding.dimension() {
                Check::passed(
                    "embedding model",
                    format!(
                        "{} ({actual} dimensions, {} max tokens)",
                        embedding.model_id(),
                        embedding.max_tokens()
                    ),
                )
            } else {
                Check::warning(
                    "embedding model",
                    format!(
                        "{} returned {actual} dimensions, expected {}",
                        embedding.model_id(),
                        embedding.dimension()
                    ),
                )
            }
        }
        Err(e) => Check::warning("embedding model", e.to_string()),
    }
}

fn check_repository(settings: &Settings) -> Check {
    let result = repository_counts(settings);
    match result {
        Ok((py, md, collectable)) => Check::passed(
            "repository",
            format!(
                "{} (python files: {py}, markdown files: {md}, collectable: {collectable})",
                settings.repo_path.display()
            ),
        ),
        Err(e) => Check::error("repository", e.to_string()),
    }
}

/// Python files, Markdown files, and everything the collector would pick up.
fn repository_counts(settings: &Settings) -> Result<(usize, usize, usize)> {
    let count = |rules: CollectRules| {
        collect_files(&settings.repo_path, &rules).map(|files| files.len())
    };
    let py = count(CollectRules::new(["py"], &settings.exclude_patterns, 0)?)?;
    let md = count(CollectRules::new(["md"], &settings.exclude_patterns, 0)?)?;
    let collectable = count(CollectRules::from_settings(settings)?)?;
    Ok((py, md, collectable))
}

fn check_write_permission(settings: &Settings) -> Check {
    let marker = settings.working_dir.join("test.txt");
    let result = std::fs::write(&marker, "test").and_then(|()| std::fs::remove_file(&marker));
    match result {
        Ok(()) => Check::passed("write permission", settings.working_dir.display().to_string()),
        Err(e) => Check::error(
            "write permission",
            format!("{}: {e}", settings.working_dir.display()),
        ),
    }
}
