use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use stex_index::error::{IndexerError, Result};
use stex_index::{open_hub, validate_hub_root, HubCache, MathHub};

#[derive(Parser)]
#[command(name = "stex-index")]
#[command(about = "Indexer for sTeX archives in a MathHub directory")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Analyse every document of every sTeX archive
    stex-index --hub ~/MathHub index

    # Show what a single file declares and imports
    stex-index show ~/MathHub/smglom/sets/source/set.en.tex

    # Compare manifest dependencies with actual usage
    stex-index check-deps --filter 'smglom/*'

    # Rewrite outdated manifests, confirming each one
    stex-index check-deps --mode ask

    # List archives
    stex-index archives
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Root directory of the MathHub
    #[arg(long, env = "MATHHUB", global = true)]
    pub hub: Option<PathBuf>,

    /// Path to the cache file (defaults to .stex-index.json in the hub root)
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Neither read nor write the cache
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse all documents without cached results
    Index,

    /// Print the analysis of one document as JSON
    Show {
        /// Path to a tex file inside an archive
        file: PathBuf,
    },

    /// Compare manifest dependencies with the archives actually used
    CheckDeps {
        /// Only check archives whose name matches (glob: * and ? supported)
        #[arg(long)]
        filter: Option<String>,

        /// What to do with outdated manifests
        #[arg(long, value_enum, default_value = "test")]
        mode: CheckMode,
    },

    /// List archives
    Archives,

    /// Delete the cache file
    ClearCache,
}

/// How `check-deps` treats manifests with outdated dependencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CheckMode {
    /// Only report
    Test,
    /// Ask before rewriting each manifest
    Ask,
    /// Rewrite every outdated manifest
    Write,
}

impl Cli {
    pub fn hub_root(&self) -> Result<PathBuf> {
        let root = self.hub.as_ref().ok_or_else(|| {
            IndexerError::HubNotFound("set MATHHUB or pass --hub".to_string())
        })?;
        validate_hub_root(root)
    }

    /// The cache to use, `None` if disabled.
    pub fn hub_cache(&self, hub_root: &Path) -> Option<HubCache> {
        if self.no_cache {
            return None;
        }
        Some(match &self.cache {
            Some(path) => HubCache::new(path),
            None => HubCache::for_hub(hub_root),
        })
    }
}

fn store(hub: &MathHub, cache: Option<&HubCache>) -> Result<()> {
    match cache {
        Some(cache) => cache.store(hub),
        None => Ok(()),
    }
}

pub fn index(hub_root: &Path, cache: Option<&HubCache>) -> Result<()> {
    let mut hub = open_hub(hub_root, cache)?;
    let updated = hub.bulk_load()?;
    store(&hub, cache)?;

    let counts = hub.document_counts();
    let archives = hub.stex_archives().count();
    let documents: usize = hub
        .stex_archives()
        .filter_map(|a| counts.get(a.archive_name()))
        .sum();
    if updated {
        println!("Indexed {} documents in {} sTeX archives", documents, archives);
    } else {
        println!("Index is up to date ({} documents in {} sTeX archives)", documents, archives);
    }
    Ok(())
}

pub fn show(hub_root: &Path, cache: Option<&HubCache>, file: &Path) -> Result<()> {
    let mut hub = open_hub(hub_root, cache)?;
    let (archive, rel_path) = hub.locate(file)?;
    let info = hub.doc_info(&archive, &rel_path)?;
    println!("{}", serde_json::to_string_pretty(info)?);
    store(&hub, cache)
}

pub fn check_deps(
    hub_root: &Path,
    cache: Option<&HubCache>,
    filter: Option<&str>,
    mode: CheckMode,
) -> Result<()> {
    let pattern = filter
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| IndexerError::Parse(format!("invalid filter: {e}")))?;

    let mut hub = open_hub(hub_root, cache)?;
    hub.bulk_load()?;

    let names: Vec<String> = hub
        .stex_archives()
        .map(|a| a.archive_name().to_string())
        .filter(|name| pattern.as_ref().map_or(true, |p| p.matches(name)))
        .collect();

    let mut outdated = 0;
    for name in &names {
        let report = hub.dependency_report(name)?;
        if report.is_up_to_date() {
            continue;
        }
        outdated += 1;
        println!("{}:", report.manifest_path.display());
        println!("  Old dependencies: {}", report.declared.join(","));
        println!("  New dependencies: {}", report.proposed.join(","));

        let write = match mode {
            CheckMode::Test => false,
            CheckMode::Write => true,
            CheckMode::Ask => confirm("Should I do it? [y/n] ")?,
        };
        if write {
            hub.write_dependencies(&report)?;
            println!("  Updated");
        } else if mode == CheckMode::Ask {
            println!("  Skipping...");
        }
    }
    println!("{} of {} archives have outdated dependencies", outdated, names.len());

    store(&hub, cache)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes" | "Yes"))
}

pub fn list_archives(hub_root: &Path, cache: Option<&HubCache>) -> Result<()> {
    let mut hub = open_hub(hub_root, cache)?;
    let counts = hub.document_counts();

    for archive in hub.archives() {
        let name = archive.archive_name();
        let count = counts.get(name).copied().unwrap_or(0);
        let kind = if archive.is_stex_archive() { "stex" } else { "-" };
        println!("{:<40} {:>6} documents  {}", name, count, kind);
    }
    println!("\n{} archives", counts.len());

    store(&hub, cache)
}

pub fn clear_cache(cache: Option<&HubCache>) -> Result<()> {
    let Some(cache) = cache else {
        println!("Cache is disabled");
        return Ok(());
    };
    if cache.clear()? {
        println!("Removed {}", cache.path().display());
    } else {
        println!("No cache at {}", cache.path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_mode(args: &[&str]) -> CheckMode {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::CheckDeps { mode, .. } => mode,
            _ => panic!("expected check-deps"),
        }
    }

    #[test]
    fn test_check_deps_mode() {
        assert_eq!(check_mode(&["stex-index", "check-deps"]), CheckMode::Test);
        assert_eq!(
            check_mode(&["stex-index", "check-deps", "--mode", "write"]),
            CheckMode::Write
        );
        assert_eq!(
            check_mode(&["stex-index", "--hub", "/tmp", "check-deps", "--mode", "ask"]),
            CheckMode::Ask
        );
        assert!(Cli::try_parse_from(["stex-index", "check-deps", "--mode", "force"]).is_err());
    }
}
