//! Attribute list grammar: `name="text"`, `name=true`, `name=3`, `name=["a", "b"]`

use core::iter::Peekable;
use core::str::CharIndices;

use crate::document::{AttrValue, Attributes, Position};
use crate::error::{ParseError, ParseResult};

struct Cursor<'a> {
    chars: Peekable<CharIndices<'a>>,
    origin: Position,
}

impl Cursor<'_> {
    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.origin.line, self.origin.column + offset, message)
    }

    fn offset(&mut self, len: usize) -> usize {
        self.chars.peek().map_or(len, |(i, _)| *i)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }
}

/// Parse the attribute part of a tag
///
/// `origin` is the location of the first character of `source`, used for error columns.
///
/// # Errors
///
/// Returns a parse error for missing `=`, unterminated strings or lists, duplicate
/// names and values that are neither strings, numbers, booleans nor lists
pub fn parse_attributes(source: &str, origin: Position) -> ParseResult<Attributes> {
    let mut cursor = Cursor {
        chars: source.char_indices().peekable(),
        origin,
    };
    let mut attrs = Attributes::new();

    loop {
        cursor.skip_whitespace();
        let Some(&(start, first)) = cursor.chars.peek() else {
            break;
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(cursor.error_at(start, format!("Expected attribute name, found '{first}'")));
        }

        let mut name = String::new();
        while let Some((_, c)) = cursor
            .chars
            .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        {
            name.push(c);
        }

        cursor.skip_whitespace();
        if cursor.chars.next_if(|(_, c)| *c == '=').is_none() {
            let at = cursor.offset(source.len());
            return Err(cursor.error_at(at, format!("Expected '=' after attribute '{name}'")));
        }
        cursor.skip_whitespace();

        let value = parse_value(&mut cursor, source)?;
        if attrs.contains(&name) {
            return Err(cursor.error_at(start, format!("Duplicate attribute '{name}'")));
        }
        attrs.insert(name, value);
    }

    Ok(attrs)
}

fn parse_value(cursor: &mut Cursor<'_>, source: &str) -> ParseResult<AttrValue> {
    let Some(&(start, first)) = cursor.chars.peek() else {
        return Err(cursor.error_at(source.len(), "Expected attribute value"));
    };

    match first {
        '"' | '\'' => parse_string(cursor, first, start).map(AttrValue::String),
        '[' => parse_list(cursor, source, start),
        _ => {
            let mut word = String::new();
            while let Some((_, c)) = cursor
                .chars
                .next_if(|(_, c)| !c.is_whitespace() && *c != ',' && *c != ']')
            {
                word.push(c);
            }
            match word.as_str() {
                "true" => Ok(AttrValue::Bool(true)),
                "false" => Ok(AttrValue::Bool(false)),
                _ => word
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite() && looks_numeric(&word))
                    .map(AttrValue::Number)
                    .ok_or_else(|| {
                        cursor.error_at(
                            start,
                            format!("Invalid attribute value '{word}' (strings must be quoted)"),
                        )
                    }),
            }
        }
    }
}

fn looks_numeric(word: &str) -> bool {
    word.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
}

fn parse_string(cursor: &mut Cursor<'_>, quote: char, start: usize) -> ParseResult<String> {
    cursor.chars.next();
    let mut out = String::new();
    while let Some((_, c)) = cursor.chars.next() {
        match c {
            '\\' => match cursor.chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(cursor.error_at(start, "Unterminated string value"))
}

fn parse_list(cursor: &mut Cursor<'_>, source: &str, start: usize) -> ParseResult<AttrValue> {
    cursor.chars.next();
    let mut items = Vec::new();
    loop {
        cursor.skip_whitespace();
        match cursor.chars.peek() {
            None => return Err(cursor.error_at(start, "Unterminated list value")),
            Some((_, ']')) => {
                cursor.chars.next();
                return Ok(AttrValue::List(items));
            }
            Some(_) => {
                items.push(parse_value(cursor, source)?);
                cursor.skip_whitespace();
                match cursor.chars.next() {
                    Some((_, ',')) => {}
                    Some((_, ']')) => return Ok(AttrValue::List(items)),
                    Some((at, c)) => {
                        return Err(
                            cursor.error_at(at, format!("Expected ',' or ']' in list, found '{c}'"))
                        );
                    }
                    None => return Err(cursor.error_at(start, "Unterminated list value")),
                }
            }
        }
    }
}
