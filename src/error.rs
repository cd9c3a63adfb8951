//! Error types for the markform engine
//!
//! Parse errors (malformed markup) and validation errors (well-formed markup that
//! breaks schema rules) are separate families and never share a variant. Patch
//! failures are values carried inside an apply result rather than aborting a batch.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed markup: unclosed tags or fences, bad attribute syntax, unbalanced nesting
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
}

impl ParseError {
    /// Create a parse error at a specific location
    pub fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    /// Create a parse error at the start of a line
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self::at(line, 1, message)
    }
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Category of a validation error raised while building a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    NestedField,
    NestedGroup,
    DuplicateId,
    ReservedId,
    InvalidId,
    MissingAttribute,
    InvalidAttribute,
    StateConflict,
    RequiredSkip,
    MixedCheckboxMode,
    InvalidColumns,
    InvalidCell,
    TypeMismatch,
    InvalidOption,
    UnexpectedContent,
    InvalidRef,
}

impl ValidationErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NestedField => "nested_field",
            Self::NestedGroup => "nested_group",
            Self::DuplicateId => "duplicate_id",
            Self::ReservedId => "reserved_id",
            Self::InvalidId => "invalid_id",
            Self::MissingAttribute => "missing_attribute",
            Self::InvalidAttribute => "invalid_attribute",
            Self::StateConflict => "state_conflict",
            Self::RequiredSkip => "required_skip",
            Self::MixedCheckboxMode => "mixed_checkbox_mode",
            Self::InvalidColumns => "invalid_columns",
            Self::InvalidCell => "invalid_cell",
            Self::TypeMismatch => "type_mismatch",
            Self::InvalidOption => "invalid_option",
            Self::UnexpectedContent => "unexpected_content",
            Self::InvalidRef => "invalid_ref",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-formed markup that violates a schema or semantic rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error ({kind}) at '{reference}': {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// Scope reference of the offending element (field, `field.option`, `field.column[row]`, ...)
    pub reference: String,
}

impl ValidationError {
    pub fn new(
        kind: ValidationErrorKind,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            reference: reference.into(),
        }
    }

    pub fn nested_field(reference: impl Into<String>) -> Self {
        Self::new(
            ValidationErrorKind::NestedField,
            reference,
            "Field tags cannot be nested",
        )
    }

    pub fn duplicate_id(id: &str) -> Self {
        Self::new(
            ValidationErrorKind::DuplicateId,
            id,
            format!("Duplicate id '{id}'"),
        )
    }

    pub fn reserved_id(id: &str) -> Self {
        Self::new(
            ValidationErrorKind::ReservedId,
            id,
            format!("'{id}' is a reserved id and cannot be used explicitly"),
        )
    }

    pub fn missing_attribute(reference: impl Into<String>, attribute: &str) -> Self {
        Self::new(
            ValidationErrorKind::MissingAttribute,
            reference,
            format!("Missing required attribute '{attribute}'"),
        )
    }

    pub fn invalid_attribute(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::InvalidAttribute, reference, message)
    }

    pub fn state_conflict(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::StateConflict, reference, message)
    }

    pub fn required_skip(field_id: &str) -> Self {
        Self::new(
            ValidationErrorKind::RequiredSkip,
            field_id,
            format!("Required field '{field_id}' cannot be skipped"),
        )
    }

    pub fn type_mismatch(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::TypeMismatch, reference, message)
    }

    pub fn unexpected_content(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::UnexpectedContent, reference, message)
    }
}

/// Result type for schema building and response parsing
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Category of a rejected patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchErrorKind {
    FieldNotFound,
    TypeMismatch,
    InvalidValue,
    InvalidOption,
    RequiredFieldSkip,
    RefNotFound,
    NoteNotFound,
}

impl fmt::Display for PatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FieldNotFound => "field_not_found",
            Self::TypeMismatch => "type_mismatch",
            Self::InvalidValue => "invalid_value",
            Self::InvalidOption => "invalid_option",
            Self::RequiredFieldSkip => "required_field_skip",
            Self::RefNotFound => "ref_not_found",
            Self::NoteNotFound => "note_not_found",
        };
        f.write_str(name)
    }
}

/// A patch that could not be applied; the form is left as it was before that patch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Patch rejected ({kind}): {message}")]
pub struct PatchError {
    pub kind: PatchErrorKind,
    pub message: String,
}

impl PatchError {
    pub fn new(kind: PatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn field_not_found(field_id: &str) -> Self {
        Self::new(
            PatchErrorKind::FieldNotFound,
            format!("Field '{field_id}' does not exist"),
        )
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(PatchErrorKind::InvalidValue, message)
    }

    pub fn required_field_skip(field_id: &str) -> Self {
        Self::new(
            PatchErrorKind::RequiredFieldSkip,
            format!("Field '{field_id}' is required and cannot be skipped"),
        )
    }
}

/// Result type for a single patch
pub type PatchResult<T> = Result<T, PatchError>;

/// Serialization-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// A table cell contains a character that cannot be written inside a row
    #[error("Cell '{reference}' contains a newline or control character")]
    InvalidCellText { reference: String },

    /// An answered table cell has nothing to write
    #[error("Cell '{reference}' is answered but empty")]
    EmptyCell { reference: String },

    /// Frontmatter could not be written back as YAML
    #[error("Frontmatter serialization failed: {0}")]
    Frontmatter(String),

    /// Export to an interchange format failed
    #[error("Export failed: {0}")]
    Export(String),
}

impl SerializeError {
    pub fn invalid_cell_text(reference: impl Into<String>) -> Self {
        Self::InvalidCellText {
            reference: reference.into(),
        }
    }

    pub fn empty_cell(reference: impl Into<String>) -> Self {
        Self::EmptyCell {
            reference: reference.into(),
        }
    }
}

/// Result type for serialization operations
pub type SerializeResult<T> = Result<T, SerializeError>;

/// Main unified error type that can represent any markform error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkformError {
    /// Malformed markup
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Semantically inconsistent markup
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Serialization or export failure
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl MarkformError {
    /// True when the document itself is malformed and must be fixed before anything else
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Result type for top-level markform operations
pub type MarkformResult<T> = Result<T, MarkformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_location() {
        let err = ParseError::at(42, 7, "unclosed tag");
        let text = err.to_string();
        assert!(text.contains("line 42"));
        assert!(text.contains("column 7"));
        assert!(text.contains("unclosed tag"));
    }

    #[test]
    fn test_validation_error_carries_reference() {
        let err = ValidationError::required_skip("name");
        assert_eq!(err.kind, ValidationErrorKind::RequiredSkip);
        assert!(err.to_string().contains("'name'"));
        assert!(err.to_string().contains("required_skip"));
    }

    #[test]
    fn test_families_stay_distinct() {
        let parse: MarkformError = ParseError::at_line(1, "bad").into();
        let validation: MarkformError = ValidationError::duplicate_id("a").into();
        assert!(parse.is_parse_error());
        assert!(!validation.is_parse_error());
    }

    #[test]
    fn test_patch_error_kind_display() {
        let err = PatchError::required_field_skip("age");
        assert_eq!(err.kind.to_string(), "required_field_skip");
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn test_serialize_error_cell() {
        let err = SerializeError::invalid_cell_text("films.title[0]");
        assert!(err.to_string().contains("films.title[0]"));
    }
}
