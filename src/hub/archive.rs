use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{IndexerError, Result};

use super::document::Document;
use super::manifest::{Manifest, MANIFEST_PATH};
use super::to_posix;

/// The two directories of an archive that hold tex files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTree {
    Source,
    Lib,
}

impl SourceTree {
    pub const ALL: [SourceTree; 2] = [SourceTree::Source, SourceTree::Lib];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTree::Source => "source",
            SourceTree::Lib => "lib",
        }
    }
}

/// One MathHub archive (a git repository below the hub root).
#[derive(Debug, Serialize, Deserialize)]
pub struct Archive {
    root: PathBuf,
    hub_root: PathBuf,
    /// Relative path (e.g. `source/mod/file.en.tex`) -> document.
    documents: Option<BTreeMap<String, Document>>,
    #[serde(skip)]
    manifest: OnceLock<Option<Manifest>>,
    #[serde(skip)]
    name: OnceLock<String>,
    #[serde(skip)]
    is_stex: OnceLock<bool>,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>, hub_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hub_root: hub_root.into(),
            documents: None,
            manifest: OnceLock::new(),
            name: OnceLock::new(),
            is_stex: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the archive relative to the hub root, e.g. `smglom/sets`.
    pub fn relative_path(&self) -> String {
        to_posix(self.root.strip_prefix(&self.hub_root).unwrap_or(&self.root))
    }

    pub fn manifest(&self) -> Result<&Manifest> {
        self.try_manifest()
            .ok_or_else(|| IndexerError::ManifestNotFound(self.root.join(MANIFEST_PATH)))
    }

    pub fn try_manifest(&self) -> Option<&Manifest> {
        self.manifest
            .get_or_init(|| {
                let path = self.root.join(MANIFEST_PATH);
                match Manifest::load(&path) {
                    Ok(manifest) => Some(manifest),
                    Err(IndexerError::ManifestNotFound(_)) => None,
                    Err(e) => {
                        tracing::warn!("Cannot read manifest {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn is_stex_archive(&self) -> bool {
        *self
            .is_stex
            .get_or_init(|| self.try_manifest().is_some_and(Manifest::is_stex))
    }

    /// The manifest's `id`, falling back to the path relative to the hub root.
    pub fn archive_name(&self) -> &str {
        self.name.get_or_init(|| {
            let name_guess = self.relative_path();
            match self.try_manifest() {
                None => name_guess,
                Some(manifest) => match manifest.id() {
                    Some(id) => id.to_string(),
                    None => {
                        tracing::warn!(
                            "No id in manifest of {} (using {})",
                            self.root.display(),
                            name_guess
                        );
                        name_guess
                    }
                },
            }
        })
    }

    /// Updates the archive after the file system may have changed.
    ///
    /// Drops the cached manifest. If documents were already enumerated, adds
    /// new files, forgets deleted ones and invalidates outdated results.
    pub fn refresh(&mut self) -> Result<()> {
        self.manifest = OnceLock::new();
        let Some(documents) = self.documents.as_mut() else {
            return Ok(());
        };

        let mut still_needed = HashSet::new();
        for path in tex_files(&self.root) {
            let rel_path = to_posix(path.strip_prefix(&self.root).unwrap_or(&path));
            match documents.get_mut(&rel_path) {
                Some(document) => {
                    document.invalidate_if_stale()?;
                }
                None => {
                    documents.insert(rel_path.clone(), Document::new(path, rel_path.clone()));
                }
            }
            still_needed.insert(rel_path);
        }
        documents.retain(|rel_path, _| still_needed.contains(rel_path));
        Ok(())
    }

    /// Enumerates the tex files of `source/` and `lib/` on first use.
    pub fn load_documents(&mut self) {
        if self.documents.is_some() {
            return;
        }
        let documents = tex_files(&self.root)
            .into_iter()
            .map(|path| {
                let rel_path = to_posix(path.strip_prefix(&self.root).unwrap_or(&path));
                (rel_path.clone(), Document::new(path, rel_path))
            })
            .collect();
        self.documents = Some(documents);
    }

    pub fn documents(&mut self) -> impl Iterator<Item = &Document> {
        self.load_documents();
        self.documents.iter().flat_map(|docs| docs.values())
    }

    /// Document by relative path. Only sees documents that were already enumerated.
    pub fn document(&self, rel_path: &str) -> Option<&Document> {
        self.documents.as_ref()?.get(rel_path)
    }

    pub fn document_mut(&mut self, rel_path: &str) -> Option<&mut Document> {
        self.load_documents();
        self.documents.as_mut()?.get_mut(rel_path)
    }

    pub fn document_count(&mut self) -> usize {
        self.load_documents();
        self.documents.as_ref().map_or(0, BTreeMap::len)
    }

    /// Resolves a possibly incomplete file reference below `tree`.
    ///
    /// Tries the path itself, then with `.tex` appended, then any
    /// `name.<lang>.tex` next to it (the document's own language first).
    /// Returns the path relative to `tree`, or `None` if nothing exists.
    pub fn normalize_file_reference(&self, path: &str, tree: SourceTree, lang: &str) -> Option<String> {
        let path = path.trim_start_matches('/');
        let base = self.root.join(tree.as_str());

        if base.join(path).is_file() {
            return Some(path.to_string());
        }
        let with_ext = format!("{path}.tex");
        if base.join(&with_ext).is_file() {
            return Some(with_ext);
        }

        let (dir, stem) = path.rsplit_once('/').unwrap_or(("", path));
        if stem.is_empty() {
            return None;
        }
        if lang != "*" {
            let own_lang = join_rel(dir, &format!("{stem}.{lang}.tex"));
            if base.join(&own_lang).is_file() {
                return Some(own_lang);
            }
        }

        let search_dir = base.join(dir);
        let pattern = format!(
            "{}/{}.*.tex",
            glob::Pattern::escape(&search_dir.to_string_lossy()),
            glob::Pattern::escape(stem)
        );
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .ok()?
            .filter_map(std::result::Result::ok)
            .filter(|p| p.is_file())
            .collect();
        matches.sort();
        let first = matches.into_iter().next()?;
        first.strip_prefix(&base).ok().map(to_posix)
    }
}

fn join_rel(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// All `.tex` files below `root/source` and `root/lib`.
fn tex_files(root: &Path) -> Vec<PathBuf> {
    SourceTree::ALL
        .iter()
        .flat_map(|tree| {
            WalkDir::new(root.join(tree.as_str()))
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "tex"))
                .map(walkdir::DirEntry::into_path)
        })
        .collect()
}

/// Memo for [`Archive::normalize_file_reference`].
///
/// Entries are never invalidated: files created after a lookup stay
/// invisible to that lookup for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct FileRefCache {
    entries: HashMap<FileRefKey, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileRefKey {
    archive_root: PathBuf,
    path: String,
    tree: SourceTree,
    lang: String,
}

impl FileRefCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(
        &mut self,
        archive: &Archive,
        path: &str,
        tree: SourceTree,
        lang: &str,
    ) -> Option<String> {
        let key = FileRefKey {
            archive_root: archive.root().to_path_buf(),
            path: path.to_string(),
            tree,
            lang: lang.to_string(),
        };
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let resolved = archive.normalize_file_reference(path, tree, lang);
        self.entries.insert(key, resolved.clone());
        resolved
    }
}
