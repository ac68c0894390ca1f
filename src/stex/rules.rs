//! Macro tables: which macros introduce dependencies and which ones declare
//! or reference symbols.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::hub::{FileRefCache, MathHub, SourceTree};
use crate::latex::{MacroArgs, Span};

use super::model::Dependency;

/// Static description of a dependency-producing macro.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyRule {
    /// The argument names a module (`path?module`), not just a file.
    pub references_module: bool,
    /// `\macro[ARCHIVE]{file}`
    pub opt_param_is_archive: bool,
    /// `\macro[...,archive=ARCHIVE,...]{file}`
    pub archive_in_params: bool,
    pub is_lib: bool,
    pub is_use: bool,
    pub target_no_tex: bool,
}

const MODULE_IMPORT: DependencyRule = DependencyRule {
    references_module: true,
    opt_param_is_archive: true,
    archive_in_params: false,
    is_lib: false,
    is_use: false,
    target_no_tex: false,
};

const FILE_INPUT: DependencyRule = DependencyRule {
    references_module: false,
    opt_param_is_archive: true,
    archive_in_params: false,
    is_lib: false,
    is_use: false,
    target_no_tex: false,
};

const RESOURCE: DependencyRule = DependencyRule {
    references_module: false,
    opt_param_is_archive: false,
    archive_in_params: true,
    is_lib: false,
    is_use: false,
    target_no_tex: true,
};

pub static DEPENDENCY_RULES: Lazy<HashMap<&'static str, DependencyRule>> = Lazy::new(|| {
    HashMap::from([
        ("usemodule", DependencyRule { is_use: true, ..MODULE_IMPORT }),
        ("requiremodule", DependencyRule { is_use: true, ..MODULE_IMPORT }),
        ("importmodule", MODULE_IMPORT),
        ("inputref", FILE_INPUT),
        ("mhinput", FILE_INPUT),
        ("mhgraphics", RESOURCE),
        ("cmhgraphics", RESOURCE),
        ("mhtikzinput", RESOURCE),
        ("cmhtikzinput", RESOURCE),
        ("lstinputmhlisting", RESOURCE),
        (
            "includeproblem",
            DependencyRule {
                target_no_tex: false,
                ..RESOURCE
            },
        ),
        ("libinput", DependencyRule { is_lib: true, ..FILE_INPUT }),
        ("addmhbibresource", DependencyRule { is_lib: true, ..RESOURCE }),
    ])
});

pub fn dependency_rule(macro_name: &str) -> Option<&'static DependencyRule> {
    DEPENDENCY_RULES.get(macro_name)
}

/// Where a dependency was found and how relative references are interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySite {
    /// Archive of the document containing the macro.
    pub archive: String,
    /// Tree of the archive the document lives in.
    pub tree: SourceTree,
    /// Directory of the document below `source/` or `lib/` (`""` at the top).
    pub subdir: String,
    /// Language tag of the document, `*` if it has none.
    pub lang: String,
}

impl DependencyRule {
    /// Turns one invocation into a [`Dependency`].
    ///
    /// Returns `None` only if the macro has no main argument. Archives that
    /// are not installed locally and files that cannot be found still yield
    /// a dependency, with `file` (and possibly `module_name`) left unset.
    pub fn produce(
        &self,
        args: &MacroArgs,
        intro_range: Span,
        valid_range: Span,
        site: &DependencySite,
        hub: &MathHub,
        refs: &mut FileRefCache,
    ) -> Option<Dependency> {
        let target_archive = if self.opt_param_is_archive {
            args.optional_text().map(str::trim).filter(|a| !a.is_empty())
        } else if self.archive_in_params {
            args.param("archive").filter(|a| !a.is_empty())
        } else {
            None
        };

        let main_arg = args.first_main()?.trim();
        let tree = if self.is_lib {
            SourceTree::Lib
        } else {
            SourceTree::Source
        };
        let requested = target_archive.unwrap_or(&site.archive);

        let dependency = |archive: &str, file: Option<String>, module_name: Option<String>| Dependency {
            archive: archive.to_string(),
            file,
            module_name,
            is_lib: self.is_lib,
            is_use: self.is_use,
            target_no_tex: self.target_no_tex,
            valid_range,
            intro_range,
        };

        let Some(archive) = hub.archive(requested) else {
            return Some(dependency(requested, None, None));
        };
        let archive_name = archive.archive_name();

        if self.references_module {
            let (path, module_name) = match main_arg.split_once('?') {
                Some((path, module)) => (path, module),
                None => (main_arg, main_arg.rsplit('/').next().unwrap_or(main_arg)),
            };
            let with_module = format!("{path}/{module_name}");

            let mut candidates = Vec::new();
            if target_archive.is_none() {
                candidates.push(join_subdir(&site.subdir, path));
                candidates.push(join_subdir(&site.subdir, &with_module));
            }
            candidates.push(path.to_string());
            candidates.push(with_module);

            let file = candidates
                .iter()
                .find_map(|c| refs.normalize(archive, c, tree, &site.lang));
            return Some(dependency(archive_name, file, Some(module_name.to_string())));
        }

        if self.target_no_tex {
            return Some(dependency(archive_name, None, None));
        }

        let mut candidates = Vec::new();
        if target_archive.is_none() {
            candidates.push(join_subdir(&site.subdir, main_arg));
        }
        candidates.push(main_arg.to_string());

        let file = candidates
            .iter()
            .find_map(|c| refs.normalize(archive, c, tree, &site.lang));
        Some(dependency(archive_name, file, None))
    }
}

fn join_subdir(subdir: &str, path: &str) -> String {
    if subdir.is_empty() {
        path.to_string()
    } else {
        format!("{subdir}/{path}")
    }
}

/// Macros that declare or reference a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolMacro {
    Definiendum,
    Symdef,
    Symdecl,
    Definame,
    CapitalDefiname,
}

impl SymbolMacro {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "definiendum" => Some(Self::Definiendum),
            "symdef" => Some(Self::Symdef),
            "symdecl" => Some(Self::Symdecl),
            "definame" => Some(Self::Definame),
            "Definame" => Some(Self::CapitalDefiname),
            _ => None,
        }
    }

    /// `\symdef` and `\symdecl` declare; the others only reference.
    pub fn declares(self) -> bool {
        matches!(self, Self::Symdef | Self::Symdecl)
    }

    /// Symbol name and verbalization, or `None` if arguments are missing.
    pub fn extract(self, args: &MacroArgs) -> Option<(String, String)> {
        match self {
            Self::Definiendum => {
                let symbol = args.main_from_end(1)?;
                let verbalization = args.main_from_end(0)?;
                Some((symbol.to_string(), verbalization.to_string()))
            }
            Self::Symdef => {
                let symbol = args.param("name").or_else(|| args.first_main())?;
                Some((symbol.to_string(), symbol.to_string()))
            }
            Self::Symdecl | Self::Definame => {
                let symbol = args.last_main()?;
                Some((symbol.to_string(), symbol.to_string()))
            }
            Self::CapitalDefiname => {
                let symbol = args.last_main()?;
                Some((symbol.to_string(), capitalize(symbol)))
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latex::{LatexParser, NodeKind};

    fn args_of(source: &str) -> MacroArgs {
        let doc = LatexParser::new().parse_source(source).unwrap();
        match doc.nodes.into_iter().next().map(|n| n.kind) {
            Some(NodeKind::Macro { args, .. }) => args,
            other => panic!("expected macro, got {other:?}"),
        }
    }

    #[test]
    fn test_rule_table_flags() {
        let usemodule = dependency_rule("usemodule").unwrap();
        assert!(usemodule.references_module && usemodule.is_use);
        assert!(!dependency_rule("importmodule").unwrap().is_use);

        let graphics = dependency_rule("mhgraphics").unwrap();
        assert!(graphics.archive_in_params && graphics.target_no_tex);

        let problem = dependency_rule("includeproblem").unwrap();
        assert!(problem.archive_in_params && !problem.target_no_tex);

        assert!(dependency_rule("libinput").unwrap().is_lib);
        let bib = dependency_rule("addmhbibresource").unwrap();
        assert!(bib.is_lib && bib.target_no_tex);

        assert!(dependency_rule("libusepackage").is_none());
        assert!(dependency_rule("emph").is_none());
    }

    #[test]
    fn test_symbol_macro_lookup() {
        assert_eq!(SymbolMacro::from_name("Definame"), Some(SymbolMacro::CapitalDefiname));
        assert_eq!(SymbolMacro::from_name("symdef"), Some(SymbolMacro::Symdef));
        assert_eq!(SymbolMacro::from_name("importmodule"), None);
        assert!(SymbolMacro::Symdecl.declares());
        assert!(!SymbolMacro::Definiendum.declares());
    }

    #[test]
    fn test_extract_definiendum() {
        let args = args_of("\\definiendum[x]{vector}{vectors}");
        assert_eq!(
            SymbolMacro::Definiendum.extract(&args),
            Some(("vector".to_string(), "vectors".to_string()))
        );
    }

    #[test]
    fn test_extract_symdef_prefers_name_param() {
        let args = args_of("\\symdef{plus}[name=addition,args=2]");
        assert_eq!(
            SymbolMacro::Symdef.extract(&args),
            Some(("addition".to_string(), "addition".to_string()))
        );
        let args = args_of("\\symdef{plus}[args=2]");
        assert_eq!(
            SymbolMacro::Symdef.extract(&args),
            Some(("plus".to_string(), "plus".to_string()))
        );
    }

    #[test]
    fn test_extract_capital_definame() {
        let args = args_of("\\Definame{äpfel}");
        assert_eq!(
            SymbolMacro::CapitalDefiname.extract(&args),
            Some(("äpfel".to_string(), "Äpfel".to_string()))
        );
    }

    #[test]
    fn test_extract_missing_arguments() {
        let args = args_of("\\definiendum{only}");
        assert_eq!(SymbolMacro::Definiendum.extract(&args), None);
        let args = args_of("\\symdecl");
        assert_eq!(SymbolMacro::Symdecl.extract(&args), None);
    }

    #[test]
    fn test_join_subdir() {
        assert_eq!(join_subdir("", "a/b"), "a/b");
        assert_eq!(join_subdir("mod", "a/b"), "mod/a/b");
    }
}
