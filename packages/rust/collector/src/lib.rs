//! Repository file collection and content loading.
//!
//! [`collect_files`] walks the repository and picks candidates;
//! [`load_documents`] reads them concurrently into [`LoadedDocument`]s.
//!
//! [`LoadedDocument`]: repowiki_shared::LoadedDocument

pub mod collect;
pub mod loader;

pub use collect::{CollectRules, EXCLUDED_NAMES, RepoFile, collect_files};
pub use loader::{
    DEFAULT_MAX_OPEN_FILES, LoadOutcome, LoadProgress, LoadReport, LoaderOptions, classify,
    load_documents,
};
