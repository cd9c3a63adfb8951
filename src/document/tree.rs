use core::fmt;

use serde::{Deserialize, Serialize};

use super::span::{LineSpan, Position};
use crate::error::{ParseError, ParseResult};
use crate::models::TagStyle;

/// A tag attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<AttrValue>),
}

impl AttrValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    /// Writes the value in attribute syntax
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered `name=value` pairs of one tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace an attribute, keeping first-seen order
    pub fn insert(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lexical unit handed from the lexer to the tree builder
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Open {
        name: String,
        attrs: Attributes,
        self_closing: bool,
        style: TagStyle,
        position: Position,
        end_line: usize,
    },
    Close {
        name: String,
        position: Position,
    },
    Fence(FenceNode),
    Text(TextLine),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagNode {
    pub name: String,
    pub attrs: Attributes,
    pub children: Vec<AstNode>,
    pub style: TagStyle,
    pub position: Position,
    pub span: LineSpan,
}

impl TagNode {
    /// Text lines directly inside this tag
    pub fn text_lines(&self) -> impl Iterator<Item = &TextLine> {
        self.children.iter().filter_map(|c| match c {
            AstNode::Text(line) => Some(line),
            _ => None,
        })
    }

    /// Tags directly inside this tag
    pub fn child_tags(&self) -> impl Iterator<Item = &TagNode> {
        self.children.iter().filter_map(|c| match c {
            AstNode::Tag(tag) => Some(tag),
            _ => None,
        })
    }
}

/// A fenced code block, content without the fence lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceNode {
    /// The opening marker run, e.g. "```" or "~~~~"
    pub marker: String,
    pub info: String,
    pub content: String,
    pub span: LineSpan,
}

impl FenceNode {
    /// Markdown text of the whole fence
    #[must_use]
    pub fn to_markdown(&self) -> String {
        if self.content.is_empty() {
            format!("{}{}\n{}", self.marker, self.info, self.marker)
        } else {
            format!(
                "{}{}\n{}\n{}",
                self.marker, self.info, self.content, self.marker
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub line: usize,
}

impl TextLine {
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Tag(TagNode),
    Fence(FenceNode),
    Text(TextLine),
}

/// Root of the tag tree
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Raw YAML between the leading `---` lines, with the line it starts on
    pub frontmatter: Option<(String, usize)>,
    pub children: Vec<AstNode>,
    /// Syntax of the first tag in the document
    pub style: TagStyle,
}

struct OpenFrame {
    tag: TagNode,
}

/// Assemble a token stream into a tree, checking that every tag is balanced
///
/// # Errors
///
/// Returns a parse error for a closing tag that does not match the innermost open tag,
/// a closing tag with nothing open, or a tag left open at the end of input
pub fn build_tree(tokens: Vec<Token>) -> ParseResult<Vec<AstNode>> {
    let mut root: Vec<AstNode> = Vec::new();
    let mut stack: Vec<OpenFrame> = Vec::new();

    fn push(stack: &mut [OpenFrame], root: &mut Vec<AstNode>, node: AstNode) {
        match stack.last_mut() {
            Some(frame) => frame.tag.children.push(node),
            None => root.push(node),
        }
    }

    for token in tokens {
        match token {
            Token::Open {
                name,
                attrs,
                self_closing,
                style,
                position,
                end_line,
            } => {
                let tag = TagNode {
                    name,
                    attrs,
                    children: Vec::new(),
                    style,
                    position,
                    span: LineSpan::new(position.line, end_line),
                };
                if self_closing {
                    push(&mut stack, &mut root, AstNode::Tag(tag));
                } else {
                    stack.push(OpenFrame { tag });
                }
            }
            Token::Close { name, position } => {
                let Some(frame) = stack.pop() else {
                    return Err(ParseError::at(
                        position.line,
                        position.column,
                        format!("Closing tag '/{name}' has no matching opening tag"),
                    ));
                };
                if frame.tag.name != name {
                    return Err(ParseError::at(
                        position.line,
                        position.column,
                        format!(
                            "Closing tag '/{name}' does not match '{}' opened at line {}",
                            frame.tag.name, frame.tag.position.line
                        ),
                    ));
                }
                let mut tag = frame.tag;
                tag.span = tag.span.through(position.line);
                push(&mut stack, &mut root, AstNode::Tag(tag));
            }
            Token::Fence(fence) => push(&mut stack, &mut root, AstNode::Fence(fence)),
            Token::Text(line) => push(&mut stack, &mut root, AstNode::Text(line)),
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(ParseError::at(
            frame.tag.position.line,
            frame.tag.position.column,
            format!("Tag '{}' is never closed", frame.tag.name),
        ));
    }

    Ok(root)
}
