//! Line-oriented lexer for Markform markup
//!
//! Both tag syntaxes are normalized here: `{% field id="a" %}` and
//! `<!-- field id="a" -->` produce the same token, so everything downstream is
//! syntax-agnostic. Fenced blocks are opaque: tags inside them are never read.

use crate::document::tree::Token;
use crate::document::{Attributes, FenceNode, LineSpan, Position, TextLine};
use crate::error::{ParseError, ParseResult};
use crate::models::{FieldKind, TagStyle};

use super::attributes::parse_attributes;

/// Tag names with a structural meaning
pub const STRUCTURAL_TAGS: [&str; 8] = [
    "form",
    "field",
    "field-group",
    "group",
    "note",
    "description",
    "instructions",
    "documentation",
];

/// Whether `name` is a tag this engine understands
#[must_use]
pub fn is_known_tag(name: &str) -> bool {
    STRUCTURAL_TAGS.contains(&name) || FieldKind::from_legacy_tag(name).is_some()
}

/// Output of the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed {
    pub frontmatter: Option<(String, usize)>,
    pub tokens: Vec<Token>,
    pub style: Option<TagStyle>,
}

struct Delimiters {
    open: &'static str,
    close: &'static str,
    style: TagStyle,
}

const BRACKET: Delimiters = Delimiters {
    open: "{%",
    close: "%}",
    style: TagStyle::Bracket,
};

const COMMENT: Delimiters = Delimiters {
    open: "<!--",
    close: "-->",
    style: TagStyle::Comment,
};

/// Split a document into frontmatter and a flat token stream
///
/// # Errors
///
/// Returns a parse error for unclosed frontmatter, fences or tags, for unknown
/// bracket tags and for malformed attribute lists
pub fn tokenize(text: &str) -> ParseResult<Lexed> {
    let lines: Vec<&str> = text.lines().collect();
    let mut tokens = Vec::new();
    let mut style = None;
    let mut index = 0;

    let frontmatter = if lines.first().map(|l| l.trim_end()) == Some("---") {
        let end = lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, l)| l.trim_end() == "---")
            .map(|(i, _)| i)
            .ok_or_else(|| ParseError::at_line(1, "Frontmatter is never closed"))?;
        index = end + 1;
        Some((lines[1..end].join("\n"), 2))
    } else {
        None
    };

    while index < lines.len() {
        let line = lines[index];
        let trimmed = line.trim_start();
        let column = line.len() - trimmed.len() + 1;

        if let Some((fence, next)) = scan_fence(&lines, index)? {
            tokens.push(Token::Fence(fence));
            index = next;
            continue;
        }

        let delimiters = if trimmed.starts_with(BRACKET.open) && !is_annotation(trimmed, &BRACKET)
        {
            Some(&BRACKET)
        } else if trimmed.starts_with(COMMENT.open) && is_markform_comment(trimmed) {
            Some(&COMMENT)
        } else {
            None
        };

        if let Some(delimiters) = delimiters {
            let next = scan_tags(&lines, index, column, delimiters, &mut tokens)?;
            style.get_or_insert(delimiters.style);
            index = next;
            continue;
        }

        tokens.push(Token::Text(TextLine {
            text: line.to_string(),
            line: index + 1,
        }));
        index += 1;
    }

    Ok(Lexed {
        frontmatter,
        tokens,
        style,
    })
}

/// `{% #id %}` style annotations belong to list items, not to the tag stream
fn is_annotation(trimmed: &str, delimiters: &Delimiters) -> bool {
    trimmed[delimiters.open.len()..].trim_start().starts_with('#')
}

/// A comment is a tag only if its first word names a Markform tag
fn is_markform_comment(trimmed: &str) -> bool {
    let body = trimmed[COMMENT.open.len()..].trim_start();
    let body = body.strip_prefix('/').unwrap_or(body);
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    is_known_tag(&name)
}

/// Backtick or tilde run of three or more that opens a fenced block
pub(crate) fn fence_marker(trimmed: &str) -> Option<&str> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|c| *c == first).count();
    (run >= 3).then(|| &trimmed[..run])
}

/// Scan a fenced block starting at `start`, returning it and the index after it
fn scan_fence(lines: &[&str], start: usize) -> ParseResult<Option<(FenceNode, usize)>> {
    let trimmed = lines[start].trim_start();
    let Some(marker) = fence_marker(trimmed) else {
        return Ok(None);
    };
    let info = trimmed[marker.len()..].trim().to_string();
    let fence_char = marker.chars().next().unwrap_or('`');

    for (offset, line) in lines[start + 1..].iter().enumerate() {
        let candidate = line.trim();
        let run = candidate.chars().take_while(|c| *c == fence_char).count();
        if run >= marker.len() && candidate[run..].trim().is_empty() {
            let end = start + 1 + offset;
            return Ok(Some((
                FenceNode {
                    marker: marker.to_string(),
                    info,
                    content: lines[start + 1..end].join("\n"),
                    span: LineSpan::new(start + 1, end + 1),
                },
                end + 1,
            )));
        }
    }

    Err(ParseError::at(
        start + 1,
        lines[start].len() - trimmed.len() + 1,
        format!("Fenced block opened with '{marker}' is never closed"),
    ))
}

/// Read one or more tags starting on line `start`; tags may continue over several lines
fn scan_tags(
    lines: &[&str],
    start: usize,
    column: usize,
    delimiters: &Delimiters,
    tokens: &mut Vec<Token>,
) -> ParseResult<usize> {
    let mut index = start;
    let mut column = column;
    let mut rest = lines[start].trim_start().to_string();

    loop {
        let position = Position::new(index + 1, column);
        let Some(after_open) = rest.strip_prefix(delimiters.open) else {
            return Err(ParseError::at(
                position.line,
                position.column,
                format!("Unexpected text after tag: '{}'", rest.trim()),
            ));
        };

        let mut source = String::new();
        let mut remaining = after_open.to_string();
        let mut quote = None;
        let after_close = loop {
            if let Some(pos) = find_close(&remaining, delimiters.close, &mut quote) {
                source.push_str(&remaining[..pos]);
                break remaining[pos + delimiters.close.len()..].to_string();
            }
            source.push_str(&remaining);
            source.push('\n');
            index += 1;
            let Some(next) = lines.get(index) else {
                return Err(ParseError::at(
                    position.line,
                    position.column,
                    format!("Tag is never closed with '{}'", delimiters.close),
                ));
            };
            remaining = (*next).to_string();
        };

        tokens.push(tag_token(&source, delimiters, position, index + 1)?);

        let trailing = after_close.trim();
        if trailing.is_empty() {
            return Ok(index + 1);
        }
        column = lines[index].len() - trailing.len() + 1;
        rest = trailing.to_string();
    }
}

/// Offset of `close` outside quoted attribute values
///
/// `quote` carries the open quote from one line of a tag to the next.
fn find_close(text: &str, close: &str, quote: &mut Option<char>) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match *quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(open) if c == open => *quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => *quote = Some(c),
            None if text[i..].starts_with(close) => return Some(i),
            None => {}
        }
    }
    None
}

/// Turn the text between delimiters into an open or close token
fn tag_token(
    source: &str,
    delimiters: &Delimiters,
    position: Position,
    end_line: usize,
) -> ParseResult<Token> {
    let body = source.trim();
    let (closing, body) = match body.strip_prefix('/') {
        Some(stripped) => (true, stripped.trim_start()),
        None => (false, body),
    };
    let (self_closing, body) = match body.strip_suffix('/') {
        Some(stripped) if !closing => (true, stripped.trim_end()),
        _ => (false, body),
    };

    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if name.is_empty() {
        return Err(ParseError::at(
            position.line,
            position.column,
            "Tag has no name",
        ));
    }
    if !is_known_tag(&name) {
        return Err(ParseError::at(
            position.line,
            position.column,
            format!("Unknown tag '{name}'"),
        ));
    }

    let rest = &body[name.len()..];
    if closing {
        if !rest.trim().is_empty() {
            return Err(ParseError::at(
                position.line,
                position.column,
                format!("Closing tag '/{name}' cannot carry attributes"),
            ));
        }
        return Ok(Token::Close { name, position });
    }

    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(ParseError::at(
            position.line,
            position.column,
            format!("Invalid tag name '{}'", body.split_whitespace().next().unwrap_or(body)),
        ));
    }

    let attr_column = position.column + delimiters.open.len() + 1 + name.len();
    let attrs: Attributes = parse_attributes(rest, Position::new(position.line, attr_column))?;

    Ok(Token::Open {
        name,
        attrs,
        self_closing,
        style: delimiters.style,
        position,
        end_line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AttrValue;

    fn names(lexed: &Lexed) -> Vec<String> {
        lexed
            .tokens
            .iter()
            .map(|t| match t {
                Token::Open { name, .. } => name.clone(),
                Token::Close { name, .. } => format!("/{name}"),
                Token::Fence(f) => format!("fence:{}", f.info),
                Token::Text(l) => format!("text:{}", l.text),
            })
            .collect()
    }

    #[test]
    fn both_syntaxes_produce_identical_tokens() {
        let bracket = tokenize("{% field kind=\"string\" id=\"a\" %}\n{% /field %}").unwrap();
        let comment = tokenize("<!-- field kind=\"string\" id=\"a\" -->\n<!-- /field -->").unwrap();

        let strip = |lexed: &Lexed| -> Vec<(String, Attributes)> {
            lexed
                .tokens
                .iter()
                .filter_map(|t| match t {
                    Token::Open { name, attrs, .. } => Some((name.clone(), attrs.clone())),
                    Token::Close { name, .. } => Some((name.clone(), Attributes::new())),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(strip(&bracket), strip(&comment));
        assert_eq!(bracket.style, Some(TagStyle::Bracket));
        assert_eq!(comment.style, Some(TagStyle::Comment));
    }

    #[test]
    fn frontmatter_is_split_off() {
        let lexed = tokenize("---\nmarkform:\n  spec: MF/0.1\n---\n{% form id=\"f\" %}\n{% /form %}")
            .unwrap();
        let (yaml, line) = lexed.frontmatter.clone().unwrap();
        assert!(yaml.contains("spec: MF/0.1"));
        assert_eq!(line, 2);
        assert_eq!(names(&lexed), vec!["form", "/form"]);
    }

    #[test]
    fn unclosed_frontmatter_fails() {
        let err = tokenize("---\ntitle: x\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn tags_inside_fences_are_opaque() {
        let lexed = tokenize("```value\n{% form %}\n```").unwrap();
        assert_eq!(names(&lexed), vec!["fence:value"]);
        let Token::Fence(fence) = &lexed.tokens[0] else {
            panic!("expected fence");
        };
        assert_eq!(fence.content, "{% form %}");
    }

    #[test]
    fn unclosed_fence_reports_opening_line() {
        let err = tokenize("text\n```value\nAlice\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn longer_fence_contains_shorter_one() {
        let lexed = tokenize("````value\n```\ninner\n```\n````").unwrap();
        let Token::Fence(fence) = &lexed.tokens[0] else {
            panic!("expected fence");
        };
        assert_eq!(fence.content, "```\ninner\n```");
    }

    #[test]
    fn tag_may_span_lines() {
        let lexed =
            tokenize("{% field kind=\"string\"\n   id=\"name\"\n   label=\"Name\" %}\n{% /field %}")
                .unwrap();
        let Token::Open { attrs, end_line, .. } = &lexed.tokens[0] else {
            panic!("expected open tag");
        };
        assert_eq!(attrs.str("label"), Some("Name"));
        assert_eq!(*end_line, 3);
        assert_eq!(names(&lexed), vec!["field", "/field"]);
    }

    #[test]
    fn several_tags_on_one_line() {
        let lexed = tokenize("{% field kind=\"string\" id=\"a\" %}{% /field %}").unwrap();
        assert_eq!(names(&lexed), vec!["field", "/field"]);
    }

    #[test]
    fn closing_delimiter_inside_quotes_is_text() {
        let lexed = tokenize("{% field kind=\"string\" id=\"a\" label=\"50%} \\\"off\\\"\" %}{% /field %}")
            .unwrap();
        assert_eq!(names(&lexed), vec!["field", "/field"]);
        let Token::Open { attrs, .. } = &lexed.tokens[0] else {
            panic!("expected open tag");
        };
        assert_eq!(attrs.str("label"), Some("50%} \"off\""));

        let lexed =
            tokenize("<!-- field kind=\"string\"\n  label='a --> b' -->\n<!-- /field -->").unwrap();
        assert_eq!(names(&lexed), vec!["field", "/field"]);
    }

    #[test]
    fn self_closing_tag() {
        let lexed = tokenize("{% field kind=\"string\" id=\"a\" /%}").unwrap();
        assert!(matches!(
            lexed.tokens[0],
            Token::Open {
                self_closing: true,
                ..
            }
        ));
    }

    #[test]
    fn ordinary_comments_are_text() {
        let lexed = tokenize("<!-- just a remark -->").unwrap();
        assert_eq!(names(&lexed), vec!["text:<!-- just a remark -->"]);
        assert_eq!(lexed.style, None);
    }

    #[test]
    fn unknown_bracket_tag_fails() {
        let err = tokenize("\n  {% widget id=\"x\" %}").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
        assert!(err.message.contains("widget"));
    }

    #[test]
    fn unclosed_tag_delimiter_fails() {
        let err = tokenize("{% field id=\"a\"\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn text_after_tag_fails() {
        let err = tokenize("{% form id=\"f\" %} trailing").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn closing_tag_with_attributes_fails() {
        assert!(tokenize("{% /field id=\"a\" %}").is_err());
    }

    #[test]
    fn legacy_tag_names_are_known() {
        let lexed = tokenize("{% string-field id=\"a\" required=true %}\n{% /string-field %}")
            .unwrap();
        let Token::Open { attrs, .. } = &lexed.tokens[0] else {
            panic!("expected open tag");
        };
        assert_eq!(attrs.get("required"), Some(&AttrValue::Bool(true)));
    }
}
