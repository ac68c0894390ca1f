use std::collections::VecDeque;
use std::path::Path;

use tree_sitter::{Language, Node as SyntaxNode};

use crate::error::{IndexerError, Result};

use super::node::{Argument, KeyVals, MacroArgs, Node, NodeKind, ParsedDocument, Span};
use super::specs::{environment_spec, macro_spec};

/// LaTeX parser producing the node tree the extractor walks.
///
/// The syntax tree comes from the tree-sitter LaTeX grammar. The grammar
/// knows nothing about sTeX argument shapes, so commands are lowered to a
/// flat token stream and their arguments are picked up afterwards from the
/// argspec tables. Malformed input never fails: unclosed groups and
/// environments run to the end of their container and stray closing braces
/// become plain characters.
#[derive(Clone)]
pub struct LatexParser {
    language: Language,
}

impl Default for LatexParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LatexParser {
    pub fn new() -> Self {
        Self {
            language: codebook_tree_sitter_latex::LANGUAGE.into(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedDocument> {
        let source = std::fs::read_to_string(path)?;
        self.parse_source(&source)
    }

    pub fn parse_source(&self, source: &str) -> Result<ParsedDocument> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| IndexerError::Parse(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| IndexerError::Parse("Failed to parse source".to_string()))?;

        let lowering = Lowering { source };
        let mut tokens = Vec::new();
        lowering.lower_children(tree.root_node(), &[], &mut tokens);
        let nodes = Assembler::new(source, tokens).nodes(false).0;

        Ok(ParsedDocument {
            source: source.to_string(),
            nodes,
        })
    }
}

/// Flat view of the syntax tree. Commands and bracket tokens stay separate
/// so the assembler can attach arguments by argspec.
#[derive(Debug)]
enum Token {
    Node(Node),
    Command { name: String, star: bool, span: Span },
    /// `\begin{name}` whose `\end` is missing.
    Begin { name: String, start: usize, name_end: usize },
    OpenBracket(Span),
    CloseBracket(Span),
    OpenBrace(Span),
    CloseBrace(Span),
}

struct Lowering<'s> {
    source: &'s str,
}

impl<'s> Lowering<'s> {
    fn text(&self, node: SyntaxNode<'_>) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn leaf(kind: NodeKind, node: SyntaxNode<'_>) -> Token {
        Token::Node(Node::new(kind, node.start_byte(), node.end_byte()))
    }

    /// Lowers every child of `node` except those in `skip`.
    fn lower_children(&self, node: SyntaxNode<'_>, skip: &[usize], out: &mut Vec<Token>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if !skip.contains(&child.id()) {
                self.lower(child, out);
            }
        }
    }

    fn lower(&self, node: SyntaxNode<'_>, out: &mut Vec<Token>) {
        if node.is_missing() {
            return;
        }
        let span = Span::new(node.start_byte(), node.end_byte());
        match node.kind() {
            "line_comment" | "block_comment" | "comment_environment" => {
                out.push(Self::leaf(NodeKind::Comment, node));
            }
            "inline_formula" | "displayed_equation" | "math_environment" => {
                out.push(Self::leaf(NodeKind::Math, node));
            }
            "generic_environment" => out.push(Token::Node(self.environment(node))),
            "begin" => {
                let (name, name_end) = self.environment_name(node);
                out.push(Token::Begin {
                    name,
                    start: span.start,
                    name_end,
                });
                if let Some(options) = node.child_by_field_name("options") {
                    self.lower(options, out);
                }
            }
            "end" => {
                let name = node.child_by_field_name("name");
                let command_end = name.map_or(span.end, |n| n.start_byte());
                out.push(Token::Command {
                    name: "end".to_string(),
                    star: false,
                    span: Span::new(span.start, command_end),
                });
                if let Some(name) = name {
                    self.lower(name, out);
                }
            }
            "text" => {
                let mut words = Vec::new();
                self.lower_children(node, &[], &mut words);
                merge_chars(words, out);
            }
            kind if kind.starts_with("curly_group") => {
                let mut inner = Vec::new();
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.is_named() || !matches!(child.kind(), "{" | "}") {
                        self.lower(child, &mut inner);
                    }
                }
                let children = Assembler::new(self.source, inner).nodes(false).0;
                out.push(Token::Node(Node {
                    kind: NodeKind::Group { children },
                    span,
                }));
            }
            "[" if !node.is_named() => out.push(Token::OpenBracket(span)),
            "]" if !node.is_named() => out.push(Token::CloseBracket(span)),
            "{" if !node.is_named() => out.push(Token::OpenBrace(span)),
            "}" if !node.is_named() => out.push(Token::CloseBrace(span)),
            "delimiter" => out.push(Self::leaf(NodeKind::Specials, node)),
            "^" | "_" if !node.is_named() => out.push(Self::leaf(NodeKind::Specials, node)),
            // verbatim, listings, minted and friends
            kind if kind.ends_with("_environment") => out.push(Self::leaf(NodeKind::Chars, node)),
            _ if node.child_count() == 0 => out.push(Self::leaf(NodeKind::Chars, node)),
            _ => match node.child_by_field_name("command") {
                Some(command) => {
                    let (name, star) = command_name(self.text(command));
                    out.push(Token::Command {
                        name,
                        star,
                        span: Span::new(command.start_byte(), command.end_byte()),
                    });
                    self.lower_children(node, &[command.id()], out);
                }
                None => self.lower_children(node, &[], out),
            },
        }
    }

    fn environment(&self, node: SyntaxNode<'_>) -> Node {
        let begin = node.child_by_field_name("begin");
        let end = node.child_by_field_name("end");
        let (name, name_end) = match begin {
            Some(begin) => self.environment_name(begin),
            None => (String::new(), node.start_byte()),
        };

        let mut tokens = Vec::new();
        if let Some(options) = begin.and_then(|b| b.child_by_field_name("options")) {
            self.lower(options, &mut tokens);
        }
        let skip: Vec<usize> = begin.into_iter().chain(end).map(|n| n.id()).collect();
        self.lower_children(node, &skip, &mut tokens);

        let mut assembler = Assembler::new(self.source, tokens);
        let (args, _) = assembler.read_args(environment_spec(&name), name_end);
        let children = assembler.nodes(false).0;
        Node::new(
            NodeKind::Environment {
                name,
                args,
                children,
            },
            node.start_byte(),
            node.end_byte(),
        )
    }

    /// Name of a `begin` node and the offset after its `{name}` group.
    fn environment_name(&self, begin: SyntaxNode<'_>) -> (String, usize) {
        let Some(group) = begin.child_by_field_name("name") else {
            return (String::new(), begin.end_byte());
        };
        let name = match group.child_by_field_name("text") {
            Some(text) => self.text(text),
            None => self.text(group).trim_start_matches('{').trim_end_matches('}'),
        };
        (name.trim().to_string(), group.end_byte())
    }
}

/// Strips the backslash and turns a trailing `*` into the star flag.
fn command_name(text: &str) -> (String, bool) {
    let name = text.strip_prefix('\\').unwrap_or(text);
    match name.strip_suffix('*') {
        Some(base) if !base.is_empty() => (base.to_string(), true),
        _ => (name.to_string(), false),
    }
}

/// Joins consecutive words of one text run into a single `Chars` node.
fn merge_chars(words: Vec<Token>, out: &mut Vec<Token>) {
    let mut pending: Option<Span> = None;
    for token in words {
        match token {
            Token::Node(Node {
                kind: NodeKind::Chars,
                span,
            }) => {
                pending = Some(match pending {
                    Some(run) => Span::new(run.start, span.end),
                    None => span,
                });
            }
            other => {
                if let Some(run) = pending.take() {
                    out.push(Token::Node(Node::new(NodeKind::Chars, run.start, run.end)));
                }
                out.push(other);
            }
        }
    }
    if let Some(run) = pending {
        out.push(Token::Node(Node::new(NodeKind::Chars, run.start, run.end)));
    }
}

/// Builds nodes from a token stream, reading macro and environment
/// arguments according to their argspec.
struct Assembler<'s> {
    source: &'s str,
    tokens: VecDeque<Token>,
}

impl<'s> Assembler<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens: tokens.into(),
        }
    }

    /// Consumes tokens into nodes. Inside a brace group this stops at the
    /// closing brace and returns the offset after it.
    fn nodes(&mut self, in_brace: bool) -> (Vec<Node>, Option<usize>) {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.pop_front() {
            match token {
                Token::Node(node) => nodes.push(node),
                Token::OpenBracket(span) | Token::CloseBracket(span) => {
                    nodes.push(Node::new(NodeKind::Chars, span.start, span.end));
                }
                Token::CloseBrace(span) => {
                    if in_brace {
                        return (nodes, Some(span.end));
                    }
                    nodes.push(Node::new(NodeKind::Chars, span.start, span.end));
                }
                Token::OpenBrace(span) => {
                    let (children, closed) = self.nodes(true);
                    let end = closed
                        .or_else(|| children.last().map(|c| c.span.end))
                        .unwrap_or(span.end);
                    nodes.push(Node::new(NodeKind::Group { children }, span.start, end));
                }
                Token::Command { name, star, span } => {
                    let (mut args, end) = self.read_args(macro_spec(&name), span.end);
                    args.star = star;
                    nodes.push(Node::new(NodeKind::Macro { name, args }, span.start, end));
                }
                Token::Begin {
                    name,
                    start,
                    name_end,
                } => {
                    let (args, args_end) = self.read_args(environment_spec(&name), name_end);
                    let (children, closed) = self.nodes(in_brace);
                    let end = children.last().map_or(args_end, |c| c.span.end);
                    nodes.push(Node::new(
                        NodeKind::Environment {
                            name,
                            args,
                            children,
                        },
                        start,
                        end,
                    ));
                    return (nodes, closed);
                }
            }
        }
        (nodes, None)
    }

    /// Reads the arguments named by `spec` from the front of the stream.
    /// `pos` is where the command ends; the returned offset is the end of
    /// the last argument read.
    fn read_args(&mut self, spec: &str, mut pos: usize) -> (MacroArgs, usize) {
        let mut args = MacroArgs::default();
        for c in spec.chars() {
            match c {
                '[' => {
                    let Some(Token::OpenBracket(open)) = self.tokens.front() else {
                        continue;
                    };
                    let open = *open;
                    if self.paragraph_break(pos, open.start) {
                        continue;
                    }
                    let Some(close) = self.matching_bracket() else {
                        continue;
                    };
                    self.tokens.drain(..=close.0);
                    let text = Span::new(open.end, close.1.start).slice(self.source).to_string();
                    args.params = Some(KeyVals::parse(&text));
                    args.optional = Some(Argument {
                        text,
                        span: Span::new(open.start, close.1.end),
                    });
                    pos = close.1.end;
                }
                '{' => {
                    let span = match self.tokens.front() {
                        Some(Token::Node(Node {
                            kind: NodeKind::Group { .. },
                            span,
                        })) if !self.paragraph_break(pos, span.start) => *span,
                        _ => break,
                    };
                    self.tokens.pop_front();
                    args.main.push(Argument {
                        text: group_text(self.source, span).to_string(),
                        span,
                    });
                    pos = span.end;
                }
                // the star is part of the command name
                _ => {}
            }
        }
        (args, pos)
    }

    /// Index and span of the `]` closing the `[` at the front.
    fn matching_bracket(&self) -> Option<(usize, Span)> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::OpenBracket(_) => depth += 1,
                Token::CloseBracket(span) => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((i, *span));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn paragraph_break(&self, from: usize, to: usize) -> bool {
        self.source
            .get(from..to)
            .is_some_and(|gap| gap.matches('\n').count() > 1)
    }
}

/// Group text without its braces; an unclosed group has no closing brace.
fn group_text(source: &str, span: Span) -> &str {
    let text = span.slice(source);
    let text = text.strip_prefix('{').unwrap_or(text);
    text.strip_suffix('}').unwrap_or(text)
}
