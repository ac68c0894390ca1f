use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{IndexerError, Result};
use crate::stex::DocInfo;

use super::archive::{Archive, FileRefCache};
use super::document::Document;
use super::progress::BulkLoadProgress;
use super::{to_posix, REPOSITORY_MARKER};

/// Tuning knobs for [`MathHub::bulk_load_with`].
#[derive(Debug, Clone)]
pub struct BulkLoadOptions {
    /// Number of worker threads.
    pub workers: usize,
    /// Documents handed to a worker at once.
    pub batch_size: usize,
    /// Minimum time between two progress log lines.
    pub progress_interval: Duration,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            workers: 12,
            batch_size: 30,
            progress_interval: Duration::from_secs(2),
        }
    }
}

/// Archive every sTeX archive implicitly depends on.
pub const META_INF_ARCHIVE: &str = "sTeX/meta-inf";

/// Declared versus actually used archive dependencies of one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub archive: String,
    pub manifest_path: PathBuf,
    /// The manifest's `dependencies` entry as written.
    pub declared: Vec<String>,
    /// Declared entries still in use (or starting with `MMT`), followed by
    /// the missing ones.
    pub proposed: Vec<String>,
}

impl DependencyReport {
    pub fn is_up_to_date(&self) -> bool {
        self.declared == self.proposed
    }
}

/// Checks that `root` is an existing directory.
pub fn validate_hub_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(IndexerError::HubNotFound(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    Ok(root.canonicalize()?)
}

/// Registry of all archives below the hub root.
#[derive(Debug, Serialize, Deserialize)]
pub struct MathHub {
    root: PathBuf,
    archives: BTreeMap<String, Archive>,
    #[serde(skip)]
    file_refs: FileRefCache,
}

impl MathHub {
    /// Creates a registry for `root` and discovers its archives.
    pub fn new(root: &Path) -> Result<Self> {
        let mut hub = Self {
            root: validate_hub_root(root)?,
            archives: BTreeMap::new(),
            file_refs: FileRefCache::new(),
        };
        hub.refresh()?;
        Ok(hub)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive(&self, name: &str) -> Option<&Archive> {
        self.archives.get(name)
    }

    pub fn archive_mut(&mut self, name: &str) -> Option<&mut Archive> {
        self.archives.get_mut(name)
    }

    pub fn archives(&self) -> impl Iterator<Item = &Archive> {
        self.archives.values()
    }

    pub fn stex_archives(&self) -> impl Iterator<Item = &Archive> {
        self.archives.values().filter(|a| a.is_stex_archive())
    }

    /// Re-scans the hub: adds new archives, drops vanished ones and
    /// refreshes the survivors.
    pub fn refresh(&mut self) -> Result<()> {
        let found = discover_archive_roots(&self.root);
        let found_set: HashSet<PathBuf> = found.iter().cloned().collect();

        self.archives.retain(|_, archive| found_set.contains(archive.root()));
        for archive in self.archives.values_mut() {
            archive.refresh()?;
        }

        let known: HashSet<PathBuf> = self
            .archives
            .values()
            .map(|a| a.root().to_path_buf())
            .collect();
        for root in found {
            if known.contains(&root) {
                continue;
            }
            let archive = Archive::new(root, self.root.clone());
            let name = archive.archive_name().to_string();
            if let Some(existing) = self.archives.get(&name) {
                tracing::warn!(
                    "Archive {} at {} is already provided by {}",
                    name,
                    archive.root().display(),
                    existing.root().display()
                );
                continue;
            }
            self.archives.insert(name, archive);
        }

        tracing::info!("Found {} MathHub archives", self.archives.len());
        Ok(())
    }

    /// The archive whose repository contains `path`.
    pub fn archive_for_path(&self, path: &Path) -> Result<&Archive> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let absolute = absolute.canonicalize().unwrap_or(absolute);

        let root = absolute
            .ancestors()
            .find(|p| p.join(REPOSITORY_MARKER).is_dir())
            .ok_or_else(|| {
                IndexerError::ArchiveNotFound(format!(
                    "no parent of {} has a {} directory",
                    absolute.display(),
                    REPOSITORY_MARKER
                ))
            })?;

        self.archives
            .values()
            .find(|a| a.root() == root)
            .ok_or_else(|| IndexerError::ArchiveNotFound(root.display().to_string()))
    }

    /// Archive name and archive-relative path of the file at `path`.
    pub fn locate(&self, path: &Path) -> Result<(String, String)> {
        let archive = self.archive_for_path(path)?;
        let absolute = path
            .canonicalize()
            .map_err(|_| IndexerError::DocumentNotFound(path.display().to_string()))?;
        let rel_path = absolute
            .strip_prefix(archive.root())
            .map(to_posix)
            .map_err(|_| IndexerError::DocumentNotFound(path.display().to_string()))?;
        Ok((archive.archive_name().to_string(), rel_path))
    }

    /// Cached analysis of a document, computed first if missing.
    pub fn doc_info(&mut self, archive: &str, rel_path: &str) -> Result<&DocInfo> {
        let missing = self.document_mut(archive, rel_path)?.cached_doc_info().is_none();
        if missing {
            return self.analyze(archive, rel_path);
        }
        self.cached(archive, rel_path)
    }

    /// Analyses a document, replacing any cached result.
    pub fn analyze(&mut self, archive_name: &str, rel_path: &str) -> Result<&DocInfo> {
        self.document_mut(archive_name, rel_path)?;

        let mut refs = std::mem::take(&mut self.file_refs);
        let result = self.compute_doc_info(archive_name, rel_path, &mut refs);
        self.file_refs = refs;
        let info = result?;

        self.document_mut(archive_name, rel_path)?.set_doc_info(info);
        self.cached(archive_name, rel_path)
    }

    /// Analyses every document of every sTeX archive that has no cached
    /// result. Returns whether there was anything to do.
    pub fn bulk_load(&mut self) -> Result<bool> {
        self.bulk_load_with(&BulkLoadOptions::default())
    }

    pub fn bulk_load_with(&mut self, options: &BulkLoadOptions) -> Result<bool> {
        let mut pending: Vec<(String, String)> = Vec::new();
        for (name, archive) in self.archives.iter_mut() {
            if !archive.is_stex_archive() {
                continue;
            }
            pending.extend(
                archive
                    .documents()
                    .filter(|d| d.cached_doc_info().is_none())
                    .map(|d| (name.clone(), d.rel_path().to_string())),
            );
        }

        if pending.is_empty() {
            return Ok(false);
        }

        tracing::info!("Updating the information for {} files", pending.len());
        let results = self.compute_parallel(&pending, options)?;

        for ((archive, rel_path), info) in pending.iter().zip(results) {
            if let Ok(document) = self.document_mut(archive, rel_path) {
                document.set_doc_info(info);
            }
        }
        tracing::info!("Finished updating the information");
        Ok(true)
    }

    /// Runs the analyses on a worker pool.
    ///
    /// Workers get batches of `(archive, document)` pairs and send back
    /// `(index, result)`; results arrive in any order. Each worker keeps its
    /// own [`FileRefCache`]. The first failure aborts the whole run.
    fn compute_parallel(
        &self,
        pending: &[(String, String)],
        options: &BulkLoadOptions,
    ) -> Result<Vec<DocInfo>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .build()
            .map_err(|e| IndexerError::Worker(e.to_string()))?;
        let batch_size = options.batch_size.max(1);
        let (tx, rx) = mpsc::channel::<(usize, Result<DocInfo>)>();

        let mut slots: Vec<Option<DocInfo>> = (0..pending.len()).map(|_| None).collect();
        let mut progress = BulkLoadProgress::new(pending.len(), options.progress_interval);
        let mut failure = None;

        std::thread::scope(|scope| {
            let producer = scope.spawn(move || {
                pool.install(|| {
                    pending.par_chunks(batch_size).enumerate().try_for_each_init(
                        || (tx.clone(), FileRefCache::new()),
                        |(tx, refs), (batch, documents)| {
                            for (offset, (archive, rel_path)) in documents.iter().enumerate() {
                                let result = self.compute_doc_info(archive, rel_path, refs);
                                let failed = result.is_err();
                                tx.send((batch * batch_size + offset, result)).map_err(|_| ())?;
                                if failed {
                                    return Err(());
                                }
                            }
                            Ok(())
                        },
                    )
                })
            });

            for (idx, result) in rx.iter() {
                match result {
                    Ok(info) => {
                        slots[idx] = Some(info);
                        progress.inc();
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(rx);

            if producer.join().is_err() && failure.is_none() {
                failure = Some(IndexerError::Worker("worker thread panicked".to_string()));
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        let snapshot = progress.snapshot();
        tracing::info!(
            "Processed {}/{} files in {} ms",
            snapshot.files_processed,
            snapshot.files_total,
            snapshot.elapsed_ms
        );

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| {
                    IndexerError::Worker(format!("no result for {}", pending[idx].1))
                })
            })
            .collect()
    }

    fn compute_doc_info(
        &self,
        archive_name: &str,
        rel_path: &str,
        refs: &mut FileRefCache,
    ) -> Result<DocInfo> {
        let archive = self
            .archive(archive_name)
            .ok_or_else(|| IndexerError::ArchiveNotFound(archive_name.to_string()))?;
        let document = archive
            .document(rel_path)
            .ok_or_else(|| IndexerError::DocumentNotFound(rel_path.to_string()))?;
        tracing::debug!("Analysing {}", document.path().display());
        document.compute_doc_info(archive, self, refs)
    }

    fn document_mut(&mut self, archive: &str, rel_path: &str) -> Result<&mut Document> {
        self.archives
            .get_mut(archive)
            .ok_or_else(|| IndexerError::ArchiveNotFound(archive.to_string()))?
            .document_mut(rel_path)
            .ok_or_else(|| IndexerError::DocumentNotFound(rel_path.to_string()))
    }

    fn cached(&self, archive: &str, rel_path: &str) -> Result<&DocInfo> {
        self.archive(archive)
            .and_then(|a| a.document(rel_path))
            .and_then(|d| d.cached_doc_info())
            .ok_or_else(|| IndexerError::DocumentNotFound(rel_path.to_string()))
    }

    /// Compares the manifest dependencies of `archive_name` with the
    /// archives its documents refer to. Analyses documents as needed.
    pub fn dependency_report(&mut self, archive_name: &str) -> Result<DependencyReport> {
        let archive = self
            .archives
            .get_mut(archive_name)
            .ok_or_else(|| IndexerError::ArchiveNotFound(archive_name.to_string()))?;
        let manifest = archive.manifest()?;
        let manifest_path = manifest.path().to_path_buf();
        let declared = manifest.dependencies();
        let rel_paths: Vec<String> = archive.documents().map(|d| d.rel_path().to_string()).collect();

        let mut needed = BTreeSet::from([META_INF_ARCHIVE.to_string()]);
        for rel_path in &rel_paths {
            let info = self.doc_info(archive_name, rel_path)?;
            needed.extend(info.flattened_dependencies().map(|d| d.archive.clone()));
        }

        let mut proposed: Vec<String> = declared
            .iter()
            .filter(|d| d.starts_with("MMT") || needed.contains(d.as_str()))
            .cloned()
            .collect();
        for dependency in needed {
            if dependency != archive_name && !proposed.contains(&dependency) {
                proposed.push(dependency);
            }
        }

        Ok(DependencyReport {
            archive: archive_name.to_string(),
            manifest_path,
            declared,
            proposed,
        })
    }

    /// Replaces the manifest's `dependencies` entry with `report.proposed`.
    pub fn write_dependencies(&mut self, report: &DependencyReport) -> Result<()> {
        let archive = self
            .archives
            .get_mut(&report.archive)
            .ok_or_else(|| IndexerError::ArchiveNotFound(report.archive.clone()))?;
        let mut manifest = archive.manifest()?.clone();
        manifest.set("dependencies", &report.proposed.join(","));
        manifest.write()?;
        tracing::info!("Updated dependencies in {}", manifest.path().display());
        archive.refresh()
    }

    /// Number of documents per archive name, enumerating documents if needed.
    pub fn document_counts(&mut self) -> HashMap<String, usize> {
        self.archives
            .iter_mut()
            .map(|(name, archive)| (name.clone(), archive.document_count()))
            .collect()
    }
}

/// Directories below `root` that contain a repository marker.
fn discover_archive_roots(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != REPOSITORY_MARKER)
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_dir() && e.path().join(REPOSITORY_MARKER).is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect()
}
