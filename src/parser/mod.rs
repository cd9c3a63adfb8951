//! Markup parser for Markform documents
//!
//! Parsing runs in three passes:
//! - the lexer splits frontmatter, tags, fences and text lines
//! - the tree builder balances tags into a `Document`
//! - the schema builder walks the tree into a `ParsedForm`, handing each field body
//!   to the response parser for its syntax

pub mod attributes;
pub mod builder;
pub mod interface;
pub mod lexer;
pub mod parsers;
pub mod sentinel;

pub use builder::build_form;
pub use interface::{ResponseParser, parser_for};
pub use parsers::{CheckboxParser, TableParser, TextParser};

use tracing::trace;

use crate::document::{Document, build_tree};
use crate::error::{MarkformResult, ParseResult};
use crate::models::ParsedForm;

/// Lex and balance a document into a tag tree
///
/// # Errors
///
/// Returns a parse error for unbalanced tags, malformed attributes, an unclosed fence
/// or unclosed frontmatter
pub fn parse_markup(text: &str) -> ParseResult<Document> {
    let lexed = lexer::tokenize(text)?;
    trace!(tokens = lexed.tokens.len(), "lexed document");
    let children = build_tree(lexed.tokens)?;
    Ok(Document {
        frontmatter: lexed.frontmatter,
        children,
        style: lexed.style.unwrap_or_default(),
    })
}

/// Parse a document into a form
///
/// # Errors
///
/// Returns a parse error for malformed markup and a validation error for markup
/// that is well formed but inconsistent
pub fn parse(text: &str) -> MarkformResult<ParsedForm> {
    build_form(&parse_markup(text)?)
}
