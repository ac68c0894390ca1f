//! MathHub: the collection of archives under one root directory.
//!
//! This module provides:
//! - Discovery of archives (git repositories) below the hub root
//! - Per-archive manifests, document sets and file-reference resolution
//! - Per-document caching of analysis results, invalidated by mtime
//! - Parallel bulk loading of all missing analysis results

pub mod archive;
pub mod document;
pub mod manifest;
pub mod mathhub;
pub mod progress;

use std::path::Path;

pub use archive::{Archive, FileRefCache, SourceTree};
pub use document::Document;
pub use manifest::Manifest;
pub use mathhub::{validate_hub_root, BulkLoadOptions, DependencyReport, MathHub, META_INF_ARCHIVE};
pub use progress::{BulkLoadProgress, ProgressSnapshot};

/// Name of the directory marking an archive root.
pub const REPOSITORY_MARKER: &str = ".git";

/// Joins the components of `path` with `/`, independent of the platform.
pub(crate) fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
