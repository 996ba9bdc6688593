//! Repository walk: selects the files worth ingesting.
//!
//! Output is sorted by relative path so identical trees always produce the
//! same sequence.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use repowiki_shared::{RepoWikiError, Result, Settings};

/// Directory (or file) names never descended into.
pub const EXCLUDED_NAMES: &[&str] = &[
    ".git",
    "__pycache__",
    ".pytest_cache",
    "node_modules",
    ".venv",
    "venv",
    "env",
    ".env",
    "build",
    "dist",
    "*.egg-info",
    ".eggs",
    ".tox",
    ".mypy_cache",
    "htmlcov",
    "target",
];

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Include/exclude rules applied during the walk.
#[derive(Debug, Clone)]
pub struct CollectRules {
    /// Lowercase extensions without the leading dot.
    extensions: BTreeSet<String>,
    /// Per-segment name patterns (from [`EXCLUDED_NAMES`]).
    excluded_names: GlobSet,
    /// User globs matched against the full relative path.
    exclude_patterns: GlobSet,
    /// Minimum on-disk size in bytes.
    min_file_size: u64,
}

impl CollectRules {
    /// Build the rules. An exclude pattern that is not a valid glob is a
    /// config error.
    pub fn new<I, S>(
        extensions: I,
        exclude_patterns: &[String],
        min_file_size: u64,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            extensions,
            excluded_names: build_globset(EXCLUDED_NAMES)?,
            exclude_patterns: build_globset(exclude_patterns)?,
            min_file_size,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.code_extensions,
            &settings.exclude_patterns,
            settings.min_file_size,
        )
    }

    /// Hidden entries and denylisted names are pruned.
    fn name_excluded(&self, name: &str) -> bool {
        name.starts_with('.') || self.excluded_names.is_match(name)
    }

    fn path_excluded(&self, relative: &str) -> bool {
        self.exclude_patterns.is_match(relative)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }
}

/// `*` stays within one path segment; `**` crosses separators.
fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_glob(pattern.as_ref())?);
    }
    builder
        .build()
        .map_err(|e| RepoWikiError::config(format!("invalid exclude patterns: {e}")))
}

fn compile_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| RepoWikiError::config(format!("invalid exclude pattern {pattern:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// A candidate file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    /// Path as reached from the walk root.
    pub path: PathBuf,
    /// Root-relative path with `/` separators.
    pub relative_path: String,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Walk `root` and return every file that passes `rules`, sorted and deduplicated.
///
/// Unreadable directories are logged and skipped; only a missing root is an error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn collect_files(root: &Path, rules: &CollectRules) -> Result<Vec<RepoFile>> {
    if !root.is_dir() {
        return Err(RepoWikiError::validation(format!(
            "repository root is not a directory: {}",
            root.display()
        )));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !rules.name_excluded(&e.file_name().to_string_lossy()));

    let mut files = Vec::new();
    let mut walk_errors = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                walk_errors += 1;
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() || !rules.extension_allowed(entry.path()) {
            continue;
        }

        let Some(relative_path) = relative_path(root, entry.path()) else {
            continue;
        };
        if rules.path_excluded(&relative_path) {
            debug!(path = %relative_path, "excluded by pattern");
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                walk_errors += 1;
                warn!(path = %relative_path, error = %e, "cannot stat file");
                continue;
            }
        };
        if size < rules.min_file_size {
            debug!(path = %relative_path, size, "below minimum size");
            continue;
        }

        files.push(RepoFile {
            path: entry.into_path(),
            relative_path,
            size,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    files.dedup_by(|a, b| a.relative_path == b.relative_path);

    info!(files = files.len(), walk_errors, "collected candidate files");
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rw-collect-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(root: &Path, rel: &str, len: usize) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x".repeat(len)).unwrap();
    }

    fn rules(min: u64) -> CollectRules {
        CollectRules::new(["py", "md", "txt"], &[], min).unwrap()
    }

    fn rels(files: &[RepoFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[test]
    fn small_files_are_dropped() {
        let tmp = temp_dir();
        write(&tmp, "tiny.md", 10);
        write(&tmp, "guide.md", 500);

        let files = collect_files(&tmp, &rules(50)).unwrap();
        assert_eq!(rels(&files), vec!["guide.md"]);
        assert_eq!(files[0].size, 500);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn excluded_and_hidden_segments_are_pruned() {
        let tmp = temp_dir();
        write(&tmp, "src/app.py", 100);
        write(&tmp, "node_modules/pkg/readme.md", 100);
        write(&tmp, ".github/workflows/notes.md", 100);
        write(&tmp, "pkg.egg-info/PKG-INFO.txt", 100);
        write(&tmp, "docs/.draft.md", 100);
        write(&tmp, "venv/lib/site.py", 100);
        write(&tmp, "src/__pycache__/app.py", 100);
        write(&tmp, "src/image.png", 100);

        let files = collect_files(&tmp, &rules(1)).unwrap();
        assert_eq!(rels(&files), vec!["src/app.py"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn output_is_sorted_and_deterministic() {
        let tmp = temp_dir();
        for rel in ["zeta.md", "alpha/b.py", "alpha/a.py", "Beta.txt", "mid/notes.md"] {
            write(&tmp, rel, 80);
        }

        let first = collect_files(&tmp, &rules(50)).unwrap();
        let second = collect_files(&tmp, &rules(50)).unwrap();
        assert_eq!(first, second);

        let names = rels(&first);
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 5);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn user_patterns_and_extension_case() {
        let tmp = temp_dir();
        write(&tmp, "README.MD", 80);
        write(&tmp, "tests/fixtures/big.txt", 80);
        write(&tmp, "tests/test_app.py", 80);

        let rules =
            CollectRules::new([".md", "TXT", "py"], &["tests/fixtures/**".into()], 10).unwrap();
        let files = collect_files(&tmp, &rules).unwrap();
        assert_eq!(rels(&files), vec!["README.MD", "tests/test_app.py"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = collect_files(Path::new("/no/such/repo/root"), &rules(1)).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn double_star_prefix_matches_at_the_root() {
        let tmp = temp_dir();
        write(&tmp, "fixtures/a.txt", 80);
        write(&tmp, "src/fixtures/b.txt", 80);
        write(&tmp, "src/main.py", 80);

        let rules = CollectRules::new(["txt", "py"], &["**/fixtures/**".into()], 10).unwrap();
        let files = collect_files(&tmp, &rules).unwrap();
        assert_eq!(rels(&files), vec!["src/main.py"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn invalid_exclude_pattern_is_a_config_error() {
        let err = CollectRules::new(["md"], &["docs/[unclosed".into()], 1).unwrap_err();
        assert!(matches!(err, RepoWikiError::Config { .. }));
        assert!(err.to_string().contains("docs/[unclosed"));
    }

    #[test]
    fn glob_patterns() {
        let names = build_globset(EXCLUDED_NAMES).unwrap();
        assert!(names.is_match("mypkg.egg-info"));
        assert!(!names.is_match("egg-info.md"));

        let docs = build_globset(&["docs/**"]).unwrap();
        assert!(docs.is_match("docs/a/b.md"));
        assert!(!docs.is_match("src/docs.md"));

        let top = build_globset(&["*.md"]).unwrap();
        assert!(top.is_match("README.md"));
        assert!(!top.is_match("docs/guide.md"));
    }
}
