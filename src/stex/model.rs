//! Data model of the extracted sTeX graph.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::latex::Span;

/// One edge from a module (or document) to a required archive/file/module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Target archive. Always set, possibly a best-effort guess.
    pub archive: String,
    /// Path relative to the target archive's `source` or `lib` directory.
    /// `None` if the file could not be determined.
    pub file: Option<String>,
    pub module_name: Option<String>,
    /// Target lives in `lib/`.
    pub is_lib: bool,
    /// Symbols are imported without being re-exported.
    pub is_use: bool,
    /// Target is not a tex document (graphics, code listings, ...).
    pub target_no_tex: bool,
    /// Scope of the source document in which the dependency is in effect.
    pub valid_range: Span,
    /// The macro invocation that introduced the dependency.
    pub intro_range: Span,
}

/// A verbalization of a symbol at a specific location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verbalization {
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub verbalizations: Vec<Verbalization>,
    /// Span of the first `\symdecl`/`\symdef` declaring this symbol.
    pub declaration: Option<Span>,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbalizations: Vec::new(),
            declaration: None,
        }
    }

    pub fn add_verbalization(&mut self, text: impl Into<String>, span: Span) {
        self.verbalizations.push(Verbalization {
            text: text.into(),
            span,
        });
    }

    /// Records the declaration span unless one is already known.
    pub fn declare(&mut self, span: Span) {
        if self.declaration.is_none() {
            self.declaration = Some(span);
        }
    }
}

/// A (possibly nested) module of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Fully qualified within the document: `parent/child` for submodules.
    pub name: String,
    pub dependencies: Vec<Dependency>,
    pub symbols: Vec<Symbol>,
    pub modules: Vec<ModuleInfo>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            symbols: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Own dependencies followed by those of the direct submodules.
    ///
    /// Deeper submodules are not included.
    pub fn flattened_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .chain(self.modules.iter().flat_map(|m| m.dependencies.iter()))
    }

    /// Depth-first, pre-order, starting with `self`.
    pub fn iter_modules(&self) -> Box<dyn Iterator<Item = &ModuleInfo> + '_> {
        Box::new(std::iter::once(self).chain(self.modules.iter().flat_map(|m| m.iter_modules())))
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Finds the symbol called `name`, creating it if needed.
    pub fn symbol_mut(&mut self, name: &str) -> &mut Symbol {
        let idx = match self.symbols.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.symbols.push(Symbol::new(name));
                self.symbols.len() - 1
            }
        };
        &mut self.symbols[idx]
    }
}

/// Analysis result for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocInfo {
    /// Modification time of the file when the analysis started.
    pub last_modified: SystemTime,
    /// Dependencies introduced outside of any module.
    pub dependencies: Vec<Dependency>,
    pub modules: Vec<ModuleInfo>,
}

impl DocInfo {
    pub fn new(last_modified: SystemTime) -> Self {
        Self {
            last_modified,
            dependencies: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Document-level dependencies followed by those of the top-level modules.
    ///
    /// Like [`ModuleInfo::flattened_dependencies`], only one level deep.
    pub fn flattened_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .chain(self.modules.iter().flat_map(|m| m.dependencies.iter()))
    }

    pub fn iter_modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter().flat_map(|m| m.iter_modules())
    }

    /// First module (depth-first) with the given fully qualified name.
    pub fn get_module(&self, name: &str) -> Option<&ModuleInfo> {
        self.iter_modules().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(archive: &str) -> Dependency {
        Dependency {
            archive: archive.to_string(),
            file: None,
            module_name: None,
            is_lib: false,
            is_use: false,
            target_no_tex: false,
            valid_range: Span::new(0, 1),
            intro_range: Span::new(0, 1),
        }
    }

    fn nested() -> DocInfo {
        let mut c = ModuleInfo::new("A/B/C");
        c.dependencies.push(dep("deep"));
        let mut b = ModuleInfo::new("A/B");
        b.dependencies.push(dep("middle"));
        b.modules.push(c);
        let mut a = ModuleInfo::new("A");
        a.dependencies.push(dep("top"));
        a.modules.push(b);

        let mut doc = DocInfo::new(SystemTime::UNIX_EPOCH);
        doc.dependencies.push(dep("root"));
        doc.modules.push(a);
        doc.modules.push(ModuleInfo::new("D"));
        doc
    }

    #[test]
    fn test_iter_modules_depth_first() {
        let doc = nested();
        let names: Vec<&str> = doc.iter_modules().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A/B", "A/B/C", "D"]);
    }

    #[test]
    fn test_get_module() {
        let doc = nested();
        assert_eq!(doc.get_module("A/B/C").unwrap().name, "A/B/C");
        assert!(doc.get_module("C").is_none());
    }

    #[test]
    fn test_doc_flattened_dependencies_is_one_level() {
        let doc = nested();
        let archives: Vec<&str> = doc
            .flattened_dependencies()
            .map(|d| d.archive.as_str())
            .collect();
        assert_eq!(archives, vec!["root", "top"]);
    }

    #[test]
    fn test_module_flattened_dependencies_is_one_level() {
        let doc = nested();
        let a = doc.get_module("A").unwrap();
        let archives: Vec<&str> = a.flattened_dependencies().map(|d| d.archive.as_str()).collect();
        assert_eq!(archives, vec!["top", "middle"]);
    }

    #[test]
    fn test_symbol_mut_merges_by_name() {
        let mut module = ModuleInfo::new("m");
        module.symbol_mut("x").add_verbalization("x", Span::new(0, 3));
        module.symbol_mut("x").declare(Span::new(5, 9));
        module.symbol_mut("x").declare(Span::new(10, 12));
        module.symbol_mut("y");

        assert_eq!(module.symbols.len(), 2);
        let x = module.symbol("x").unwrap();
        assert_eq!(x.verbalizations.len(), 1);
        assert_eq!(x.declaration, Some(Span::new(5, 9)));
    }
}
