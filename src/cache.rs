//! JSON snapshot of a [`MathHub`] with all analyses made so far.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hub::MathHub;

/// Default file name of the snapshot inside the hub root.
pub const DEFAULT_CACHE_FILE: &str = ".stex-index.json";

const CACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: &'a str,
    hub: &'a MathHub,
}

#[derive(Deserialize)]
struct CacheFile {
    version: String,
    hub: MathHub,
}

pub struct HubCache {
    path: PathBuf,
}

impl HubCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache at the default location inside `hub_root`.
    pub fn for_hub(hub_root: &Path) -> Self {
        Self::new(hub_root.join(DEFAULT_CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot and brings it up to date with the file system.
    ///
    /// Returns `None` if there is no snapshot, it was written by another
    /// version, it cannot be decoded or it belongs to a different hub root.
    pub fn load(&self, hub_root: &Path) -> Result<Option<MathHub>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };
        if file.version != CACHE_VERSION {
            tracing::info!(
                "Ignoring cache {} written by version {}",
                self.path.display(),
                file.version
            );
            return Ok(None);
        }

        let mut hub = file.hub;
        let expected = hub_root.canonicalize().unwrap_or_else(|_| hub_root.to_path_buf());
        if hub.root() != expected {
            tracing::info!(
                "Ignoring cache {} for hub {}",
                self.path.display(),
                hub.root().display()
            );
            return Ok(None);
        }

        tracing::info!("Loaded cache {}", self.path.display());
        hub.refresh()?;
        Ok(Some(hub))
    }

    pub fn store(&self, hub: &MathHub) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = CacheFileRef {
            version: CACHE_VERSION,
            hub,
        };
        fs::write(&self.path, serde_json::to_string(&file)?)?;
        tracing::debug!("Stored cache {}", self.path.display());
        Ok(())
    }

    /// Deletes the snapshot. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// The hub at `hub_root`, restored from `cache` when possible.
pub fn open_hub(hub_root: &Path, cache: Option<&HubCache>) -> Result<MathHub> {
    if let Some(cache) = cache {
        if let Some(hub) = cache.load(hub_root)? {
            return Ok(hub);
        }
    }
    MathHub::new(hub_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn create_hub_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("smglom/sets");
        fs::create_dir_all(archive.join(".git")).unwrap();
        create_file(&archive, "META-INF/MANIFEST.MF", "id: smglom/sets\nformat: stex\n");
        create_file(
            &archive,
            "source/set.en.tex",
            "\\begin{smodule}{set}\\symdef{in}\\end{smodule}",
        );
        temp_dir
    }

    #[test]
    fn test_missing_cache_loads_nothing() {
        let temp_dir = create_hub_dir();
        let cache = HubCache::for_hub(temp_dir.path());
        assert!(cache.load(temp_dir.path()).unwrap().is_none());
        assert!(!cache.clear().unwrap());
    }

    #[test]
    fn test_store_and_load_keeps_analyses() {
        let temp_dir = create_hub_dir();
        let cache = HubCache::for_hub(temp_dir.path());

        let mut hub = MathHub::new(temp_dir.path()).unwrap();
        assert!(hub.bulk_load().unwrap());
        cache.store(&hub).unwrap();

        let mut restored = cache.load(temp_dir.path()).unwrap().unwrap();
        assert!(!restored.bulk_load().unwrap());
        let info = restored.doc_info("smglom/sets", "source/set.en.tex").unwrap();
        assert!(info.get_module("set").unwrap().symbol("in").is_some());
    }

    #[test]
    fn test_version_mismatch_discards_cache() {
        let temp_dir = create_hub_dir();
        let cache = HubCache::for_hub(temp_dir.path());
        let hub = MathHub::new(temp_dir.path()).unwrap();
        cache.store(&hub).unwrap();

        let content = fs::read_to_string(cache.path()).unwrap();
        let content = content.replace(
            &format!("\"version\":\"{CACHE_VERSION}\""),
            "\"version\":\"0.0.0-old\"",
        );
        fs::write(cache.path(), content).unwrap();

        assert!(cache.load(temp_dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_ignored_and_cleared() {
        let temp_dir = create_hub_dir();
        let cache = HubCache::for_hub(temp_dir.path());
        fs::write(cache.path(), "not json").unwrap();

        assert!(cache.load(temp_dir.path()).unwrap().is_none());
        let hub = open_hub(temp_dir.path(), Some(&cache)).unwrap();
        assert!(hub.archive("smglom/sets").is_some());
        assert!(cache.clear().unwrap());
        assert!(!cache.path().exists());
    }
}
