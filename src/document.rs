//! Tag tree produced by the lexer, before any schema is attached

pub mod span;
pub mod tree;

pub use span::{LineSpan, Position};
pub use tree::{AstNode, AttrValue, Attributes, Document, FenceNode, TagNode, TextLine, build_tree};
