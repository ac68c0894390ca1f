//! sTeX semantics on top of the generic LaTeX tree: the data model, the
//! macro tables and the extraction walk.

pub mod extractor;
pub mod model;
pub mod rules;

pub use extractor::{analyze_document, Extractor};
pub use model::{Dependency, DocInfo, ModuleInfo, Symbol, Verbalization};
pub use rules::{dependency_rule, DependencyRule, DependencySite, SymbolMacro};
