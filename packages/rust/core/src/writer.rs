//! Wiki writer.
//!
//! Persists generated pages under the output root and synthesizes the root
//! table of contents. Every file is written atomically (temp file, then
//! rename) so a crashed run never leaves a half-written page.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use repowiki_shared::{RepoWikiError, Result};

use crate::generator::CategoryResult;
use crate::registry::WikiStructure;
use crate::report::FailureRecord;

/// Pages listed per category in the root index.
pub const ROOT_INDEX_PAGES: usize = 5;

/// Nested folders listed per category in the root index.
pub const ROOT_INDEX_FOLDERS: usize = 3;

/// Record of one file written under the output root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFile {
    /// Path relative to the output root, `/`-separated.
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Write `# {title}` followed by `content` to `output_dir/relative_path`,
/// creating parent directories. Overwrites any existing file.
pub fn write_page(
    output_dir: &Path,
    relative_path: &str,
    title: &str,
    content: &str,
) -> Result<WrittenFile> {
    let body = format!("# {title}\n\n{content}");
    write_atomic(&output_dir.join(relative_path), body.as_bytes())?;

    debug!(path = %relative_path, %title, "wrote page");
    Ok(WrittenFile {
        path: relative_path.to_string(),
        bytes: body.len() as u64,
        sha256: sha256_hex(body.as_bytes()),
    })
}

/// Outcome of writing one category: the files that landed, and the pages
/// whose write failed.
#[derive(Debug, Default)]
pub struct CategoryWrite {
    pub written: Vec<WrittenFile>,
    pub failures: Vec<FailureRecord>,
}

/// Write every successful page of one category. Failed pages are skipped;
/// the category `README.md` is written only when its index succeeded.
///
/// A page that cannot be written is recorded and its siblings still go out.
#[instrument(skip_all, fields(category = %result.id))]
pub fn write_category(output_dir: &Path, result: &CategoryResult) -> CategoryWrite {
    let mut out = CategoryWrite::default();

    let index = result
        .index
        .as_ref()
        .and_then(|p| p.content())
        .map(|content| (format!("{}/README.md", result.id), result.title.as_str(), content));
    let pages = result.pages.iter().filter_map(|page| {
        page.content()
            .map(|content| (page.relative_path(), page.title.as_str(), content))
    });

    for (path, title, content) in index.into_iter().chain(pages) {
        match write_page(output_dir, &path, title, content) {
            Ok(file) => out.written.push(file),
            Err(e) => {
                warn!(%path, error = %e, "could not write page");
                out.failures.push(FailureRecord {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    out
}

/// Render the root `README.md` for `structure`.
///
/// Each category is a heading followed by its first [`ROOT_INDEX_PAGES`]
/// pages and first [`ROOT_INDEX_FOLDERS`] folders. Links only point at files
/// in `written`: a category or folder without an index links to its first
/// written page, and anything with nothing written is listed unlinked.
pub fn render_root_index(
    repo_name: &str,
    structure: &WikiStructure,
    written: &[WrittenFile],
) -> String {
    let mut out = format!(
        "# {repo_name} Wiki\n\n\
         This wiki was generated from the repository's knowledge graph.\n\n\
         ## Table of Contents\n\n"
    );

    for category in &structure.categories {
        let id = &category.id;
        let heading = link(&category.title, landing_page(written, id));
        out.push_str(&format!("### {heading}\n\n"));

        let mut listed = false;
        for page in category.pages().take(ROOT_INDEX_PAGES) {
            let path = format!("{id}/{}.md", page.name);
            let target = written.iter().any(|w| w.path == path).then_some(path.as_str());
            out.push_str(&format!("- {}\n", link(&page.title, target)));
            listed = true;
        }
        for folder in category.folders().take(ROOT_INDEX_FOLDERS) {
            let dir = format!("{id}/{}", folder.id);
            out.push_str(&format!("- {}\n", link(&folder.title, landing_page(written, &dir))));
            listed = true;
        }
        if listed {
            out.push('\n');
        }
    }

    out
}

/// The index of `dir` when it was written, otherwise the first page written
/// under it.
fn landing_page<'a>(written: &'a [WrittenFile], dir: &str) -> Option<&'a str> {
    let index = format!("{dir}/README.md");
    let prefix = format!("{dir}/");
    written
        .iter()
        .find(|w| w.path == index)
        .or_else(|| written.iter().find(|w| w.path.starts_with(&prefix)))
        .map(|w| w.path.as_str())
}

fn link(title: &str, target: Option<&str>) -> String {
    match target {
        Some(target) => format!("[{title}]({target})"),
        None => title.to_string(),
    }
}

/// Write the root `README.md`, linking to the files in `written`.
pub fn write_root_index(
    output_dir: &Path,
    repo_name: &str,
    structure: &WikiStructure,
    written: &[WrittenFile],
) -> Result<WrittenFile> {
    let body = render_root_index(repo_name, structure, written);
    write_atomic(&output_dir.join("README.md"), body.as_bytes())?;

    info!(categories = structure.categories.len(), "wrote root index");
    Ok(WrittenFile {
        path: "README.md".into(),
        bytes: body.len() as u64,
        sha256: sha256_hex(body.as_bytes()),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write `data` to a hidden sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RepoWikiError::validation(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| RepoWikiError::io(parent, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RepoWikiError::validation(format!("no file name in {}", path.display())))?;
    let temp = parent.join(format!(".{name}.tmp"));

    std::fs::write(&temp, data).map_err(|e| RepoWikiError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| RepoWikiError::io(path, e))?;
    Ok(())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
