//! Scope-aware walk over a parsed document producing a [`DocInfo`].

use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;
use crate::hub::{Archive, Document, FileRefCache, MathHub, SourceTree};
use crate::latex::{LatexParser, MacroArgs, Node, NodeKind, ParsedDocument, Span};

use super::model::{Dependency, DocInfo, ModuleInfo};
use super::rules::{dependency_rule, DependencySite, SymbolMacro};

/// Environments that open a module.
const MODULE_ENVIRONMENTS: &[&str] = &["smodule", "module"];

/// Walks one document and collects modules, symbols and dependencies.
pub struct Extractor<'a> {
    hub: &'a MathHub,
    refs: &'a mut FileRefCache,
    site: DependencySite,
    /// Absolute path of the document, used to find signature siblings.
    path: &'a Path,
}

impl<'a> Extractor<'a> {
    pub fn new(
        hub: &'a MathHub,
        refs: &'a mut FileRefCache,
        site: DependencySite,
        path: &'a Path,
    ) -> Self {
        Self {
            hub,
            refs,
            site,
            path,
        }
    }

    pub fn extract(mut self, doc: &ParsedDocument, last_modified: SystemTime) -> DocInfo {
        let mut info = DocInfo::new(last_modified);
        self.walk(&doc.nodes, doc.span(), None, &mut info);
        info
    }

    fn walk(
        &mut self,
        nodes: &[Node],
        valid_range: Span,
        mut module: Option<&mut ModuleInfo>,
        info: &mut DocInfo,
    ) {
        for node in nodes {
            match &node.kind {
                NodeKind::Comment | NodeKind::Chars | NodeKind::Math | NodeKind::Specials => {}
                NodeKind::Group { children } => {
                    self.walk(children, node.span, module.as_deref_mut(), info);
                }
                NodeKind::Environment {
                    name,
                    args,
                    children,
                } => {
                    let local_name = args.first_main().map(str::trim).filter(|n| !n.is_empty());
                    match local_name {
                        Some(local_name) if MODULE_ENVIRONMENTS.contains(&name.as_str()) => {
                            let parent_name = module.as_deref().map(|m| m.name.as_str());
                            let mut new_module =
                                self.open_module(local_name, parent_name, args, node.span);
                            self.walk(children, node.span, Some(&mut new_module), info);
                            match module.as_deref_mut() {
                                Some(parent) => parent.modules.push(new_module),
                                None => info.modules.push(new_module),
                            }
                        }
                        _ => self.walk(children, node.span, module.as_deref_mut(), info),
                    }
                }
                NodeKind::Macro { name, args } => {
                    self.handle_macro(name, args, node.span, valid_range, module.as_deref_mut(), info);
                }
            }
        }
    }

    fn open_module(
        &self,
        local_name: &str,
        parent_name: Option<&str>,
        args: &MacroArgs,
        span: Span,
    ) -> ModuleInfo {
        let name = match parent_name {
            Some(parent) => format!("{parent}/{local_name}"),
            None => local_name.to_string(),
        };
        let mut module = ModuleInfo::new(name);

        // `set.de.tex` with `sig=en` depends on its signature `set.en.tex`
        if let Some(sig) = args.param("sig").filter(|s| !s.is_empty()) {
            module.dependencies.push(Dependency {
                archive: self.site.archive.clone(),
                file: self.signature_file(sig),
                module_name: Some(module.name.clone()),
                is_lib: self.site.tree == SourceTree::Lib,
                is_use: false,
                target_no_tex: false,
                valid_range: span,
                intro_range: span,
            });
        }
        module
    }

    /// The sibling file with the language tag replaced by `sig`, relative to
    /// the document's `source`/`lib` directory, if it exists. The dependency's
    /// `is_lib` flag tells which of the two trees it is in.
    fn signature_file(&self, sig: &str) -> Option<String> {
        let file_name = self.path.file_name()?.to_str()?;
        let mut parts: Vec<&str> = file_name.split('.').collect();
        if parts.len() <= 2 {
            return None;
        }
        let idx = parts.len() - 2;
        parts[idx] = sig;
        let sibling_name = parts.join(".");
        if !self.path.with_file_name(&sibling_name).is_file() {
            return None;
        }
        Some(if self.site.subdir.is_empty() {
            sibling_name
        } else {
            format!("{}/{}", self.site.subdir, sibling_name)
        })
    }

    fn handle_macro(
        &mut self,
        name: &str,
        args: &MacroArgs,
        span: Span,
        valid_range: Span,
        module: Option<&mut ModuleInfo>,
        info: &mut DocInfo,
    ) {
        if let Some(rule) = dependency_rule(name) {
            let Some(dependency) =
                rule.produce(args, span, valid_range, &self.site, self.hub, self.refs)
            else {
                return;
            };
            match module {
                Some(module) => module.dependencies.push(dependency),
                None => info.dependencies.push(dependency),
            }
            return;
        }

        let Some(symbol_macro) = SymbolMacro::from_name(name) else {
            return;
        };
        // symbols only exist inside modules
        let Some(module) = module else {
            return;
        };
        let Some((symbol_name, verbalization)) = symbol_macro.extract(args) else {
            return;
        };
        let symbol = module.symbol_mut(&symbol_name);
        symbol.add_verbalization(verbalization, span);
        if symbol_macro.declares() {
            symbol.declare(span);
        }
    }
}

/// Parses `document` and extracts its modules, symbols and dependencies.
/// The modification time is taken before the file is read.
pub fn analyze_document(
    document: &Document,
    archive: &Archive,
    hub: &MathHub,
    refs: &mut FileRefCache,
) -> Result<DocInfo> {
    let last_modified = document.modified()?;
    let parsed = LatexParser::new().parse_file(document.path())?;

    let (subdir, file_name) = split_rel_path(document.rel_path());
    let tree = match document.rel_path().split('/').next() {
        Some("lib") => SourceTree::Lib,
        _ => SourceTree::Source,
    };
    let site = DependencySite {
        archive: archive.archive_name().to_string(),
        lang: language_of(file_name).to_string(),
        tree,
        subdir,
    };

    let info = Extractor::new(hub, refs, site, document.path()).extract(&parsed, last_modified);
    tracing::debug!(
        "{}: {} modules, {} top level dependencies",
        document.rel_path(),
        info.modules.len(),
        info.dependencies.len()
    );
    Ok(info)
}

/// Language tag of a file name: `set.en.tex` -> `en`, `set.tex` -> `*`.
pub fn language_of(file_name: &str) -> &str {
    let parts: Vec<&str> = file_name.split('.').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2]
    } else {
        "*"
    }
}

/// Splits `source/a/b/file.tex` into the directory below the top level
/// directory (`a/b`) and the file name.
pub fn split_rel_path(rel_path: &str) -> (String, &str) {
    let mut segments: Vec<&str> = rel_path.split('/').collect();
    let file_name = segments.pop().unwrap_or("");
    let subdir = segments.iter().skip(1).copied().collect::<Vec<_>>().join("/");
    (subdir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn create_hub() -> (TempDir, MathHub) {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("smglom/sets");
        fs::create_dir_all(archive.join(".git")).unwrap();
        create_file(&archive, "META-INF/MANIFEST.MF", "id: smglom/sets\nformat: stex\n");
        create_file(&archive, "source/set.en.tex", "");
        let hub = MathHub::new(temp_dir.path()).unwrap();
        (temp_dir, hub)
    }

    fn extract(hub: &MathHub, path: PathBuf, source: &str) -> DocInfo {
        extract_in(hub, SourceTree::Source, path, source)
    }

    fn extract_in(hub: &MathHub, tree: SourceTree, path: PathBuf, source: &str) -> DocInfo {
        let mut refs = FileRefCache::new();
        let site = DependencySite {
            archive: "smglom/sets".to_string(),
            tree,
            subdir: String::new(),
            lang: "en".to_string(),
        };
        let parsed = LatexParser::new().parse_source(source).unwrap();
        Extractor::new(hub, &mut refs, site, &path).extract(&parsed, UNIX_EPOCH)
    }

    #[test]
    fn test_nested_module_names() {
        let (_temp_dir, hub) = create_hub();
        let source = "\\begin{smodule}{A}\\begin{smodule}{B}\\begin{smodule}{C}\n\
                      \\end{smodule}\\end{smodule}\\end{smodule}";
        let info = extract(&hub, PathBuf::from("x.en.tex"), source);

        let names: Vec<&str> = info.iter_modules().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A/B", "A/B/C"]);
        assert_eq!(info.modules.len(), 1);
        assert_eq!(info.modules[0].modules[0].modules[0].name, "A/B/C");
    }

    #[test]
    fn test_module_without_name_is_plain_environment() {
        let (_temp_dir, hub) = create_hub();
        let info = extract(
            &hub,
            PathBuf::from("x.en.tex"),
            "\\begin{module}\\symdef{plus}\\end{module}",
        );
        assert!(info.modules.is_empty());
    }

    #[test]
    fn test_symbols_are_merged_by_name() {
        let (_temp_dir, hub) = create_hub();
        let source = "\\begin{smodule}{M}\n\\symdef{vec}\n\\definiendum{vec}{vectors}\n\\definame{vec}\n\\end{smodule}";
        let info = extract(&hub, PathBuf::from("x.en.tex"), source);

        let module = info.get_module("M").unwrap();
        assert_eq!(module.symbols.len(), 1);
        let symbol = module.symbol("vec").unwrap();
        let texts: Vec<&str> = symbol.verbalizations.iter().map(|v| v.text.as_str()).collect();
        assert_eq!(texts, vec!["vec", "vectors", "vec"]);
        let declaration = symbol.declaration.unwrap();
        assert_eq!(declaration.slice(source), "\\symdef{vec}");
    }

    #[test]
    fn test_symbols_outside_modules_are_dropped() {
        let (_temp_dir, hub) = create_hub();
        let info = extract(&hub, PathBuf::from("x.en.tex"), "\\symdef{vec}\\definame{vec}");
        assert!(info.modules.is_empty());
        assert!(info.dependencies.is_empty());
    }

    #[test]
    fn test_dependencies_attach_to_current_scope() {
        let (_temp_dir, hub) = create_hub();
        let source = "\\importmodule{set}\n\\begin{smodule}{M}{\\usemodule{other}}\\end{smodule}";
        let info = extract(&hub, PathBuf::from("x.en.tex"), source);

        assert_eq!(info.dependencies.len(), 1);
        let top = &info.dependencies[0];
        assert_eq!(top.archive, "smglom/sets");
        assert_eq!(top.file.as_deref(), Some("set.en.tex"));
        assert_eq!(top.module_name.as_deref(), Some("set"));
        assert_eq!(top.valid_range, Span::new(0, source.len()));

        let module = info.get_module("M").unwrap();
        assert_eq!(module.dependencies.len(), 1);
        let inner = &module.dependencies[0];
        assert!(inner.is_use);
        assert_eq!(inner.file, None);
        assert_eq!(inner.valid_range.slice(source), "{\\usemodule{other}}");
    }

    #[test]
    fn test_signature_dependency() {
        let (temp_dir, hub) = create_hub();
        let source_dir = temp_dir.path().join("smglom/sets/source");
        let source = "\\begin{smodule}[sig=en]{set}\\end{smodule}";

        let info = extract(&hub, source_dir.join("set.de.tex"), source);
        let module = info.get_module("set").unwrap();
        assert_eq!(module.dependencies.len(), 1);
        let dependency = &module.dependencies[0];
        assert_eq!(dependency.file.as_deref(), Some("set.en.tex"));
        assert_eq!(dependency.module_name.as_deref(), Some("set"));
        assert!(!dependency.is_use && !dependency.is_lib);
        assert_eq!(dependency.valid_range, Span::new(0, source.len()));
        assert_eq!(dependency.intro_range, dependency.valid_range);

        let info = extract(&hub, source_dir.join("set.de.tex"), &source.replace("sig=en", "sig=fr"));
        let dependency = &info.get_module("set").unwrap().dependencies[0];
        assert_eq!(dependency.file, None);
        assert_eq!(dependency.module_name.as_deref(), Some("set"));
    }

    #[test]
    fn test_signature_dependency_in_lib() {
        let (temp_dir, hub) = create_hub();
        let lib_dir = temp_dir.path().join("smglom/sets/lib");
        create_file(&lib_dir, "set.en.tex", "");
        let source = "\\begin{smodule}[sig=en]{set}\\end{smodule}";

        let info = extract_in(&hub, SourceTree::Lib, lib_dir.join("set.de.tex"), source);
        let dependency = &info.get_module("set").unwrap().dependencies[0];
        assert!(dependency.is_lib);
        assert_eq!(dependency.file.as_deref(), Some("set.en.tex"));
    }

    #[test]
    fn test_language_of() {
        assert_eq!(language_of("vectors.en.tex"), "en");
        assert_eq!(language_of("a.b.de.tex"), "de");
        assert_eq!(language_of("vectors.tex"), "*");
        assert_eq!(language_of("vectors"), "*");
    }

    #[test]
    fn test_split_rel_path() {
        assert_eq!(split_rel_path("source/a/b/file.tex"), ("a/b".to_string(), "file.tex"));
        assert_eq!(split_rel_path("lib/file.tex"), (String::new(), "file.tex"));
    }
}
