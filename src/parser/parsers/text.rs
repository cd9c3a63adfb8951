//! Fenced-value fields: string, number, lists, url, date, year

use crate::document::{AstNode, FenceNode, TagNode};
use crate::error::{SerializeResult, ValidationError, ValidationResult};
use crate::models::response::format_number;
use crate::models::{Field, FieldKind, FieldResponse, FieldSyntax, FieldValue, ResponseState, TagStyle};
use crate::parser::interface::{reject_child_tags, resolve_state, unfilled_response, ResponseParser};
use crate::parser::sentinel::fence_sentinel;

/// Info string of the fence holding a field value
pub const VALUE_FENCE_INFO: &str = "value";

/// Parser for fields whose value lives in a ```` ```value ```` fence
#[derive(Debug)]
pub struct TextParser;

impl ResponseParser for TextParser {
    fn syntax(&self) -> FieldSyntax {
        FieldSyntax::Text
    }

    fn parse(
        &self,
        node: &TagNode,
        field: &mut Field,
        declared: Option<ResponseState>,
    ) -> ValidationResult<FieldResponse> {
        reject_child_tags(node, &field.id)?;

        let mut fence: Option<&FenceNode> = None;
        for child in &node.children {
            match child {
                AstNode::Text(line) if line.is_blank() => {}
                AstNode::Text(line) => {
                    return Err(ValidationError::unexpected_content(
                        &field.id,
                        format!(
                            "Unexpected text at line {} in field '{}'; values belong in a ```value fence",
                            line.line, field.id
                        ),
                    ));
                }
                AstNode::Fence(found) if found.info != VALUE_FENCE_INFO => {
                    return Err(ValidationError::unexpected_content(
                        &field.id,
                        format!(
                            "Fence at line {} in field '{}' must be a ```value fence",
                            found.span.start, field.id
                        ),
                    ));
                }
                AstNode::Fence(found) => {
                    if fence.is_some() {
                        return Err(ValidationError::unexpected_content(
                            &field.id,
                            format!("Field '{}' has more than one value fence", field.id),
                        ));
                    }
                    fence = Some(found);
                }
                AstNode::Tag(_) => {}
            }
        }

        let content = fence.map_or("", |f| f.content.as_str());
        let sentinel = fence_sentinel(content);
        let filled = sentinel.is_none() && !content.trim().is_empty();
        let terminal = resolve_state(field, filled, declared, sentinel)?;
        if !filled {
            return Ok(unfilled_response(terminal));
        }

        coerce_text(field.kind(), &field.id, content).map(FieldResponse::answered)
    }

    fn render(
        &self,
        _field: &Field,
        response: &FieldResponse,
        _style: TagStyle,
    ) -> SerializeResult<Vec<String>> {
        let Some(value) = response.value.as_ref().filter(|_| response.is_answered()) else {
            return Ok(Vec::new());
        };
        let Some(text) = value_text(value) else {
            return Ok(Vec::new());
        };

        let marker = fence_marker_for(&text);
        Ok(vec![format!("{marker}{VALUE_FENCE_INFO}"), text, marker])
    }
}

/// Read a finite number
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Read a year; a number with no fractional part is accepted
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    text.parse::<i32>().ok().or_else(|| {
        let number = parse_number(text)?;
        (number.fract() == 0.0 && number.abs() <= f64::from(i32::MAX)).then_some(number as i32)
    })
}

/// Non-blank lines of a list value, trimmed
#[must_use]
pub fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert fence content to a value of `kind`
///
/// # Errors
///
/// Returns `TypeMismatch` when a number or year cannot be read, or when `kind` is
/// not a fenced-value kind
pub fn coerce_text(kind: FieldKind, reference: &str, content: &str) -> ValidationResult<FieldValue> {
    let trimmed = content.trim();
    let value = match kind {
        FieldKind::String => FieldValue::String(trimmed.to_string()),
        FieldKind::Url => FieldValue::Url(trimmed.to_string()),
        FieldKind::Date => FieldValue::Date(trimmed.to_string()),
        FieldKind::Number => FieldValue::Number(parse_number(trimmed).ok_or_else(|| {
            ValidationError::type_mismatch(reference, format!("'{trimmed}' is not a number"))
        })?),
        FieldKind::Year => FieldValue::Year(parse_year(trimmed).ok_or_else(|| {
            ValidationError::type_mismatch(reference, format!("'{trimmed}' is not a year"))
        })?),
        FieldKind::StringList => FieldValue::StringList(list_items(content)),
        FieldKind::UrlList => FieldValue::UrlList(list_items(content)),
        FieldKind::Checkboxes
        | FieldKind::SingleSelect
        | FieldKind::MultiSelect
        | FieldKind::Table => {
            return Err(ValidationError::type_mismatch(
                reference,
                format!("{kind} fields do not take a fenced value"),
            ));
        }
    };
    Ok(value)
}

/// Text written inside the value fence
#[must_use]
pub fn value_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::String(text) | FieldValue::Url(text) | FieldValue::Date(text) => {
            Some(text.clone())
        }
        FieldValue::Number(number) => Some(format_number(*number)),
        FieldValue::Year(year) => Some(year.to_string()),
        FieldValue::StringList(items) | FieldValue::UrlList(items) => Some(items.join("\n")),
        FieldValue::Checkboxes(_)
        | FieldValue::SingleSelect(_)
        | FieldValue::MultiSelect(_)
        | FieldValue::Table(_) => None,
    }
}

/// A backtick fence longer than any backtick run inside `content`
#[must_use]
pub fn fence_marker_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
