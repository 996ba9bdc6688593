//! Shared types, error model, and configuration for repowiki.
//!
//! This crate is the foundation depended on by all other repowiki crates.
//! It provides:
//! - [`RepoWikiError`]: the unified error type
//! - Domain types ([`LoadedDocument`], [`QueryMode`], [`QueryRequest`], [`RunId`])
//! - Configuration ([`Config`], [`Settings`], layered resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    Config, ConfigOverrides, EMBEDDING_DIM, EMBEDDING_MAX_TOKENS, Settings, config_file_path,
    detect_repo_name, load_config_from, repo_name_from_remote,
};
pub use error::{RepoWikiError, Result};
pub use types::{IngestOptions, LoadedDocument, QueryMode, QueryRequest, RunId};
