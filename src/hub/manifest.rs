//! Archive manifest (`META-INF/MANIFEST.MF`) reader.
//!
//! The format is a list of `key: value` lines; lines without a colon are
//! ignored and later keys override earlier ones. Writing keeps every line
//! as it was except the ones for keys that were set.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{IndexerError, Result};

/// Location of the manifest relative to an archive root.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Value of the `format` key identifying sTeX archives.
pub const STEX_FORMAT: &str = "stex";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    path: PathBuf,
    entries: HashMap<String, String>,
    lines: Vec<String>,
}

impl Manifest {
    /// Reads the manifest at `path`.
    ///
    /// Fails with [`IndexerError::ManifestNotFound`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IndexerError::ManifestNotFound(path.to_path_buf()),
            _ => IndexerError::Io(e),
        })?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(split_entry)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            path: path.to_path_buf(),
            entries,
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Sets `key` to `value`. The line that currently defines the key is
    /// rewritten in place; a new key is appended.
    pub fn set(&mut self, key: &str, value: &str) {
        let line = format!("{key}: {value}");
        let defining = self
            .lines
            .iter()
            .rposition(|l| split_entry(l).is_some_and(|(k, _)| k == key));
        match defining {
            Some(index) => self.lines[index] = line,
            None => self.lines.push(line),
        }
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Writes the manifest back to its path.
    pub fn write(&self) -> Result<()> {
        let mut content = self.lines.join("\n");
        content.push('\n');
        std::fs::write(&self.path, content)?;
        tracing::debug!("Wrote manifest {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The archive's declared id.
    pub fn id(&self) -> Option<&str> {
        self.get("id").filter(|id| !id.is_empty())
    }

    pub fn is_stex(&self) -> bool {
        self.get("format") == Some(STEX_FORMAT)
    }

    /// Entries of the comma-separated `dependencies` key.
    pub fn dependencies(&self) -> Vec<String> {
        self.get("dependencies")
            .map(|deps| {
                deps.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    (!key.is_empty()).then(|| (key, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_keys() {
        let manifest = Manifest::parse(
            Path::new("MANIFEST.MF"),
            "id: smglom/sets\nformat: stex\n\nnot a key value line\nurl: https://example.org/x\n",
        );
        assert_eq!(manifest.id(), Some("smglom/sets"));
        assert!(manifest.is_stex());
        assert_eq!(manifest.get("url"), Some("https://example.org/x"));
        assert!(!manifest.contains_key("not a key value line"));
    }

    #[test]
    fn test_later_key_overrides() {
        let manifest = Manifest::parse(Path::new("m"), "format: mmt\nformat: stex\n");
        assert!(manifest.is_stex());
    }

    #[test]
    fn test_dependencies() {
        let manifest = Manifest::parse(
            Path::new("m"),
            "dependencies: smglom/sets, MMT/urtheories,,sTeX/meta-inf ",
        );
        assert_eq!(
            manifest.dependencies(),
            vec!["smglom/sets", "MMT/urtheories", "sTeX/meta-inf"]
        );
        assert!(Manifest::parse(Path::new("m"), "").dependencies().is_empty());
    }

    #[test]
    fn test_empty_id_is_missing() {
        let manifest = Manifest::parse(Path::new("m"), "id:\nformat: stex");
        assert_eq!(manifest.id(), None);
    }

    #[test]
    fn test_set_rewrites_defining_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("MANIFEST.MF");
        std::fs::write(
            &path,
            "id: smglom/sets\n# comment\ndependencies: old/a\nformat: stex\ndependencies: old/b\n",
        )
        .unwrap();

        let mut manifest = Manifest::load(&path).unwrap();
        manifest.set("dependencies", "smglom/logic,sTeX/meta-inf");
        manifest.set("narration-base", "https://example.org");
        manifest.write().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "id: smglom/sets\n# comment\ndependencies: old/a\nformat: stex\n\
             dependencies: smglom/logic,sTeX/meta-inf\nnarration-base: https://example.org\n"
        );
        let reloaded = Manifest::load(&path).unwrap();
        assert_eq!(reloaded.dependencies(), vec!["smglom/logic", "sTeX/meta-inf"]);
        assert_eq!(reloaded, manifest);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = Manifest::load(&temp_dir.path().join(MANIFEST_PATH)).unwrap_err();
        assert!(matches!(err, IndexerError::ManifestNotFound(_)));
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("MANIFEST.MF");
        std::fs::write(&path, "id: a/b\n").unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.id(), Some("a/b"));
        assert_eq!(manifest.path(), path.as_path());
    }
}
