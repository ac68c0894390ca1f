use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stex::{self, DocInfo};

use super::archive::{Archive, FileRefCache};
use super::mathhub::MathHub;

/// A tex file of an archive together with its cached analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    path: PathBuf,
    rel_path: String,
    doc_info: Option<DocInfo>,
}

impl Document {
    pub fn new(path: PathBuf, rel_path: String) -> Self {
        Self {
            path,
            rel_path,
            doc_info: None,
        }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the archive root, e.g. `source/mod/file.en.tex`.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub fn cached_doc_info(&self) -> Option<&DocInfo> {
        self.doc_info.as_ref()
    }

    pub fn modified(&self) -> Result<SystemTime> {
        Ok(std::fs::metadata(&self.path)?.modified()?)
    }

    /// Drops the cached analysis if the file changed after it was made.
    /// Returns whether something was dropped.
    pub fn invalidate_if_stale(&mut self) -> Result<bool> {
        let Some(info) = &self.doc_info else {
            return Ok(false);
        };
        if self.modified()? > info.last_modified {
            tracing::debug!("Invalidating outdated information for {}", self.path.display());
            self.doc_info = None;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn set_doc_info(&mut self, info: DocInfo) {
        self.doc_info = Some(info);
    }

    /// Analyses the file without touching the cache.
    pub fn compute_doc_info(
        &self,
        archive: &Archive,
        hub: &MathHub,
        refs: &mut FileRefCache,
    ) -> Result<DocInfo> {
        stex::analyze_document(self, archive, hub, refs)
    }
}
