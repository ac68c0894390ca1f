//! Argument specifications for the macros and environments the parser knows.
//!
//! An argspec is a string of `*` (optional star), `[` (optional bracketed
//! argument) and `{` (mandatory group argument). Macros not listed here are
//! parsed without arguments.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub static MACRO_SPECS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // module imports
        ("importmodule", "[{"),
        ("requiremodule", "[{"),
        ("usemodule", "[{"),
        // document inclusion
        ("inputref", "*[{"),
        ("mhinput", "*[{"),
        // non-tex targets
        ("mhgraphics", "[{"),
        ("cmhgraphics", "[{"),
        ("mhtikzinput", "[{"),
        ("cmhtikzinput", "[{"),
        ("lstinputmhlisting", "[{"),
        ("addmhbibresource", "[{"),
        ("includeproblem", "[{"),
        // lib/ directory
        ("libinput", "[{"),
        ("libusepackage", "[{"),
        ("libusetikzlibrary", "[{"),
        // symbols
        ("definiendum", "[{{"),
        ("definame", "[{"),
        ("Definame", "[{"),
        ("symdecl", "*[{"),
        ("symdef", "{["),
    ])
});

pub static ENVIRONMENT_SPECS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("smodule", "[{"), ("module", "[{")]));

pub fn macro_spec(name: &str) -> &'static str {
    MACRO_SPECS.get(name).copied().unwrap_or("")
}

pub fn environment_spec(name: &str) -> &'static str {
    ENVIRONMENT_SPECS.get(name).copied().unwrap_or("")
}
