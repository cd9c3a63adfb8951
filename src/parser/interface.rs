//! Response parser interface shared by the three field syntaxes

use crate::document::TagNode;
use crate::error::{SerializeResult, ValidationError, ValidationResult};
use crate::models::{Field, FieldKind, FieldResponse, FieldSyntax, ResponseState, TagStyle};

use super::parsers::{CheckboxParser, TableParser, TextParser};

/// Reads and writes the value part of one field syntax
pub trait ResponseParser: Send + Sync {
    /// The syntax this parser handles
    fn syntax(&self) -> FieldSyntax;

    /// Read the body of a field tag
    ///
    /// Completes the parts of `field` declared in the body (options, table columns)
    /// and derives its response. `declared` is the field's `state` attribute.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the body is inconsistent with the field
    fn parse(
        &self,
        node: &TagNode,
        field: &mut Field,
        declared: Option<ResponseState>,
    ) -> ValidationResult<FieldResponse>;

    /// Render the lines between the field's opening and closing tags
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be written in this syntax
    fn render(
        &self,
        field: &Field,
        response: &FieldResponse,
        style: TagStyle,
    ) -> SerializeResult<Vec<String>>;
}

/// The parser for a field syntax
#[must_use]
pub fn parser_for(syntax: FieldSyntax) -> &'static dyn ResponseParser {
    match syntax {
        FieldSyntax::Text => &TextParser,
        FieldSyntax::Checkboxes => &CheckboxParser,
        FieldSyntax::Table => &TableParser,
    }
}

/// Whether a tag name opens a field
#[must_use]
pub fn is_field_tag(name: &str) -> bool {
    name == "field" || FieldKind::from_legacy_tag(name).is_some()
}

/// Fields hold values only; any tag inside one is an error
///
/// # Errors
///
/// Returns `NestedField` for a field tag and `UnexpectedContent` for any other tag
pub fn reject_child_tags(node: &TagNode, field_id: &str) -> ValidationResult<()> {
    match node.child_tags().next() {
        Some(child) if is_field_tag(&child.name) => Err(ValidationError::nested_field(field_id)),
        Some(child) => Err(ValidationError::unexpected_content(
            field_id,
            format!(
                "Tag '{}' at line {} is not allowed inside field '{field_id}'",
                child.name, child.position.line
            ),
        )),
        None => Ok(()),
    }
}

/// Reconcile the declared `state` attribute, a sentinel token and the field's fill status
///
/// Returns the terminal state the field is in, or `None` when the response follows
/// from the content.
///
/// # Errors
///
/// Returns `StateConflict` when the sentinel contradicts the attribute or a filled
/// field declares a terminal state, and `RequiredSkip` for a skipped required field
pub fn resolve_state(
    field: &Field,
    filled: bool,
    declared: Option<ResponseState>,
    sentinel: Option<ResponseState>,
) -> ValidationResult<Option<ResponseState>> {
    if let (Some(declared), Some(sentinel)) = (declared, sentinel)
        && declared != sentinel
    {
        return Err(ValidationError::state_conflict(
            &field.id,
            format!(
                "state=\"{}\" conflicts with the {} token in the value",
                declared.as_str(),
                sentinel.sentinel().unwrap_or_default()
            ),
        ));
    }

    let terminal = sentinel.or(declared);
    if let Some(state) = terminal {
        if filled {
            return Err(ValidationError::state_conflict(
                &field.id,
                format!(
                    "Field '{}' has a value and cannot also be {}",
                    field.id,
                    state.as_str()
                ),
            ));
        }
        if state == ResponseState::Skipped && field.required {
            return Err(ValidationError::required_skip(&field.id));
        }
    }
    Ok(terminal)
}

/// Response for a field that is unfilled: its terminal state or empty
#[must_use]
pub const fn unfilled_response(terminal: Option<ResponseState>) -> FieldResponse {
    match terminal {
        Some(ResponseState::Skipped) => FieldResponse::skipped(),
        Some(ResponseState::Aborted) => FieldResponse::aborted(),
        _ => FieldResponse::empty(),
    }
}
