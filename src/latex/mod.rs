//! LaTeX parsing.
//!
//! Produces a tree of seven node kinds (comment, chars, math, specials,
//! group, environment, macro) with byte spans and structured arguments.

pub mod node;
pub mod parser;
pub mod specs;

pub use node::{Argument, KeyVals, MacroArgs, Node, NodeKind, ParsedDocument, Span};
pub use parser::LatexParser;
