//! Parsed LaTeX tree consumed by the sTeX extractor.

use serde::{Deserialize, Serialize};

/// Half-open byte range into the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Text covered by this span, or `""` if it does not fit `source`.
    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// A single macro or environment argument with its braces/brackets stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub text: String,
    /// Span including the delimiters.
    pub span: Span,
}

/// `key=value` list as found in `[...]` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyVals {
    entries: Vec<(String, String)>,
}

impl KeyVals {
    /// Splits on top-level commas. Entries without `=` get an empty value.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for part in split_top_level(text, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some((k, v)) => (k.trim(), strip_braces(v.trim())),
                None => (part, ""),
            };
            entries.push((key.to_string(), value.to_string()));
        }
        Self { entries }
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&text[last..i]);
                last = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[last..]);
    parts
}

fn strip_braces(value: &str) -> &str {
    value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .map(str::trim)
        .unwrap_or(value)
}

/// Arguments read for a macro or environment according to its argspec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroArgs {
    pub star: bool,
    /// The bracketed `[...]` argument.
    pub optional: Option<Argument>,
    /// Keyword view of `optional`.
    pub params: Option<KeyVals>,
    /// Mandatory `{...}` arguments in order.
    pub main: Vec<Argument>,
}

impl MacroArgs {
    pub fn first_main(&self) -> Option<&str> {
        self.main.first().map(|a| a.text.as_str())
    }

    pub fn last_main(&self) -> Option<&str> {
        self.main.last().map(|a| a.text.as_str())
    }

    /// `n`-th main argument counted from the end (`0` is the last one).
    pub fn main_from_end(&self, n: usize) -> Option<&str> {
        let idx = self.main.len().checked_sub(n + 1)?;
        self.main.get(idx).map(|a| a.text.as_str())
    }

    pub fn optional_text(&self) -> Option<&str> {
        self.optional.as_ref().map(|a| a.text.as_str())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Comment,
    Chars,
    Math,
    Specials,
    Group {
        children: Vec<Node>,
    },
    Environment {
        name: String,
        args: MacroArgs,
        children: Vec<Node>,
    },
    Macro {
        name: String,
        args: MacroArgs,
    },
}

impl Node {
    pub fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Group { children } | NodeKind::Environment { children, .. } => children,
            _ => &[],
        }
    }

    pub fn macro_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Macro { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A parsed document: the source text plus its top-level nodes.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub source: String,
    pub nodes: Vec<Node>,
}

impl ParsedDocument {
    /// Span of the whole document.
    pub fn span(&self) -> Span {
        Span::new(0, self.source.len())
    }

    pub fn text(&self, span: Span) -> &str {
        span.slice(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyvals_archive_and_width() {
        let kv = KeyVals::parse("archive=MiKoMH/ComSem,width=10cm");
        assert_eq!(kv.entries.len(), 2);
        assert_eq!(kv.get("archive"), Some("MiKoMH/ComSem"));
        assert_eq!(kv.get("width"), Some("10cm"));
    }

    #[test]
    fn test_keyvals_braced_value_keeps_commas() {
        let kv = KeyVals::parse("title={Sets, and more}, sig = en ,id");
        assert_eq!(kv.get("title"), Some("Sets, and more"));
        assert_eq!(kv.get("sig"), Some("en"));
        assert_eq!(kv.get("id"), Some(""));
        assert_eq!(kv.get("missing"), None);
    }

    #[test]
    fn test_keyvals_empty() {
        assert!(KeyVals::parse("").entries.is_empty());
        assert!(KeyVals::parse(" , ").entries.is_empty());
    }

    #[test]
    fn test_main_from_end() {
        let arg = |t: &str| Argument {
            text: t.to_string(),
            span: Span::new(0, 0),
        };
        let args = MacroArgs {
            main: vec![arg("a"), arg("b"), arg("c")],
            ..Default::default()
        };
        assert_eq!(args.main_from_end(0), Some("c"));
        assert_eq!(args.main_from_end(1), Some("b"));
        assert_eq!(args.main_from_end(3), None);
        assert_eq!(args.first_main(), Some("a"));
    }

    #[test]
    fn test_span_slice() {
        let span = Span::new(2, 5);
        assert_eq!(span.slice("abcdefg"), "cde");
        assert_eq!(Span::new(5, 50).slice("abc"), "");
    }
}
