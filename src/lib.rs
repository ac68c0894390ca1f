pub mod cache;
pub mod error;
pub mod hub;
pub mod latex;
pub mod stex;

pub use cache::{open_hub, HubCache, DEFAULT_CACHE_FILE};
pub use error::{IndexerError, Result};
pub use hub::{
    validate_hub_root, Archive, BulkLoadOptions, DependencyReport, Document, FileRefCache,
    Manifest, MathHub, SourceTree,
};
pub use latex::{LatexParser, ParsedDocument, Span};
pub use stex::{analyze_document, Dependency, DocInfo, ModuleInfo, Symbol, Verbalization};
