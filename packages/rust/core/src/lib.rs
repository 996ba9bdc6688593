//! Pipeline orchestration for repowiki.
//!
//! `index` runs collection, loading and [`ingest`]ion into the knowledge
//! engine. `generate` walks the page [`registry`], fans queries out through
//! the [`generator`] and persists results with the [`writer`].

pub mod diagnostics;
pub mod generator;
pub mod ingest;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod report;
pub mod writer;
