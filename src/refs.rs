//! Scope references: textual addresses of forms, groups, fields, options, columns,
//! cells and notes
//!
//! ```text
//! films.title[2]   cell
//! films.title      option or column, decided against the schema
//! films            form, group, field or note
//! ```

use core::fmt;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrorKind, ValidationResult};
use crate::models::{FieldKind, FormSchema, IdKind, ParsedForm};

static CELL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_-]*)\[(\d+)\]$")
        .expect("cell reference pattern is valid")
});
static QUALIFIED_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_-]*)$")
        .expect("qualified reference pattern is valid")
});
static ID_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("id reference pattern is valid")
});

/// Alternatives listed in a resolution error before the list is cut short
const MAX_ALTERNATIVES: usize = 8;

/// A syntactically valid reference, not yet checked against a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedRef {
    Id { id: String },
    /// `parent.child`: an option or a column
    Qualified { parent: String, child: String },
    Cell {
        field: String,
        column: String,
        row: usize,
    },
}

impl ParsedRef {
    /// The leading id of the reference
    #[must_use]
    pub fn root(&self) -> &str {
        match self {
            Self::Id { id } => id,
            Self::Qualified { parent, .. } => parent,
            Self::Cell { field, .. } => field,
        }
    }
}

impl fmt::Display for ParsedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id { id } => f.write_str(id),
            Self::Qualified { parent, child } => write!(f, "{parent}.{child}"),
            Self::Cell { field, column, row } => write!(f, "{field}.{column}[{row}]"),
        }
    }
}

/// What kind of element a reference addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Form,
    Group,
    Field,
    Option,
    Column,
    Cell,
    Note,
}

impl Scope {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Group => "group",
            Self::Field => "field",
            Self::Option => "option",
            Self::Column => "column",
            Self::Cell => "cell",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference that names an existing element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    pub scope: Scope,
    pub reference: ParsedRef,
    /// Field the element belongs to, for field, option, column and cell scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

fn invalid_ref(reference: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError::new(ValidationErrorKind::InvalidRef, reference, message)
}

fn alternatives<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let ids: Vec<&str> = ids.collect();
    if ids.is_empty() {
        return "none".to_string();
    }
    let mut listed = ids
        .iter()
        .take(MAX_ALTERNATIVES)
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > MAX_ALTERNATIVES {
        listed.push_str(&format!(" and {} more", ids.len() - MAX_ALTERNATIVES));
    }
    listed
}

/// Parse a reference, most specific form first
///
/// # Errors
///
/// Returns `InvalidRef` when `text` matches none of the reference forms
pub fn parse_ref(text: &str) -> ValidationResult<ParsedRef> {
    let text = text.trim();
    if let Some(caps) = CELL_REF.captures(text) {
        let row = caps[3]
            .parse()
            .map_err(|_| invalid_ref(text, format!("Row index in '{text}' is too large")))?;
        return Ok(ParsedRef::Cell {
            field: caps[1].to_string(),
            column: caps[2].to_string(),
            row,
        });
    }
    if let Some(caps) = QUALIFIED_REF.captures(text) {
        return Ok(ParsedRef::Qualified {
            parent: caps[1].to_string(),
            child: caps[2].to_string(),
        });
    }
    if ID_REF.is_match(text) {
        return Ok(ParsedRef::Id {
            id: text.to_string(),
        });
    }
    Err(invalid_ref(
        text,
        format!("'{text}' is not a reference; expected id, id.child or id.column[row]"),
    ))
}

/// Check a reference against a schema
///
/// `row_counts` maps table field ids to their current row count; when given, cell
/// rows are range checked.
///
/// # Errors
///
/// Returns `InvalidRef` naming the valid alternatives when the reference does not
/// address an element of the schema
pub fn resolve_ref(
    reference: &ParsedRef,
    schema: &FormSchema,
    row_counts: Option<&HashMap<String, usize>>,
) -> ValidationResult<ResolvedRef> {
    let resolved = |scope: Scope, field_id: Option<&str>| ResolvedRef {
        scope,
        reference: reference.clone(),
        field_id: field_id.map(str::to_string),
    };
    let text = reference.to_string();

    match reference {
        ParsedRef::Id { id } => {
            if *id == schema.id {
                Ok(resolved(Scope::Form, None))
            } else if schema.group(id).is_some() {
                Ok(resolved(Scope::Group, None))
            } else if schema.field(id).is_some() {
                Ok(resolved(Scope::Field, Some(id)))
            } else {
                Err(invalid_ref(
                    &text,
                    format!(
                        "No form, group or field '{id}'; fields are {}",
                        alternatives(schema.fields.iter().map(|f| f.id.as_str()))
                    ),
                ))
            }
        }
        ParsedRef::Qualified { parent, child } => {
            let field = schema.field(parent).ok_or_else(|| {
                invalid_ref(
                    &text,
                    format!(
                        "No field '{parent}'; fields are {}",
                        alternatives(schema.fields.iter().map(|f| f.id.as_str()))
                    ),
                )
            })?;
            if field.kind() == FieldKind::Table {
                return match field.column(child) {
                    Some(_) => Ok(resolved(Scope::Column, Some(parent))),
                    None => Err(invalid_ref(
                        &text,
                        format!(
                            "Table '{parent}' has no column '{child}'; columns are {}",
                            alternatives(field.attrs.columns().iter().map(|c| c.id.as_str()))
                        ),
                    )),
                };
            }
            if field.attrs.options().is_empty() {
                return Err(invalid_ref(
                    &text,
                    format!(
                        "Field '{parent}' is a {} field with no options or columns; use '{parent}'",
                        field.kind()
                    ),
                ));
            }
            match field.option(child) {
                Some(_) => Ok(resolved(Scope::Option, Some(parent))),
                None => Err(invalid_ref(
                    &text,
                    format!(
                        "Field '{parent}' has no option '{child}'; options are {}",
                        alternatives(field.attrs.options().iter().map(|o| o.id.as_str()))
                    ),
                )),
            }
        }
        ParsedRef::Cell { field, column, row } => {
            let table = schema.field(field).ok_or_else(|| {
                invalid_ref(
                    &text,
                    format!(
                        "No table field '{field}'; tables are {}",
                        alternatives(
                            schema
                                .fields
                                .iter()
                                .filter(|f| f.kind() == FieldKind::Table)
                                .map(|f| f.id.as_str())
                        )
                    ),
                )
            })?;
            if table.kind() != FieldKind::Table {
                return Err(invalid_ref(
                    &text,
                    format!(
                        "Cell references need a table field; '{field}' is a {} field, use '{field}.{column}'",
                        table.kind()
                    ),
                ));
            }
            if table.column(column).is_none() {
                return Err(invalid_ref(
                    &text,
                    format!(
                        "Table '{field}' has no column '{column}'; columns are {}",
                        alternatives(table.attrs.columns().iter().map(|c| c.id.as_str()))
                    ),
                ));
            }
            if let Some(count) = row_counts.map(|counts| counts.get(field).copied().unwrap_or(0))
                && *row >= count
            {
                let valid = if count == 0 {
                    "the table has no rows".to_string()
                } else {
                    format!("valid rows are 0..={}", count - 1)
                };
                return Err(invalid_ref(
                    &text,
                    format!("Row {row} is out of range for table '{field}'; {valid}"),
                ));
            }
            Ok(resolved(Scope::Cell, Some(field)))
        }
    }
}

/// Whether `reference` addresses `field_id` or one of its options, columns or cells
#[must_use]
pub fn refers_to_field(reference: &str, field_id: &str) -> bool {
    reference
        .strip_prefix(field_id)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Current row count of every answered table
#[must_use]
pub fn row_counts(form: &ParsedForm) -> HashMap<String, usize> {
    form.responses_by_field_id
        .iter()
        .filter_map(|(id, response)| {
            let table = response.value.as_ref()?.as_table()?;
            Some((id.clone(), table.row_count()))
        })
        .collect()
}

/// Parse and resolve a reference against a whole form, notes and row counts included
///
/// # Errors
///
/// Returns `InvalidRef` when `text` is not a reference or names nothing in the form
pub fn resolve_in_form(text: &str, form: &ParsedForm) -> ValidationResult<ResolvedRef> {
    let reference = parse_ref(text)?;
    if let ParsedRef::Id { id } = &reference
        && form.id_index.get(id).is_some_and(|entry| entry.kind == IdKind::Note)
    {
        return Ok(ResolvedRef {
            scope: Scope::Note,
            reference,
            field_id: None,
        });
    }
    resolve_ref(&reference, &form.schema, Some(&row_counts(form)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use rstest::rstest;

    const FORM: &str = r#"{% form id="movies" %}
{% field-group id="picks" %}
{% field kind="table" id="films" columnIds=["title", "year"] columnTypes=["string", "year"] %}
| Title | Year |
| --- | --- |
| Heat | 1995 |
{% /field %}
{% field kind="multi_select" id="genres" %}
- [ ] Drama {% #title %}
- [x] Crime {% #crime %}
{% /field %}
{% field kind="string" id="comment" %}{% /field %}
{% /field-group %}
{% note id="n1" ref="films" %}
Check the year.
{% /note %}
{% /form %}
"#;

    #[rstest]
    #[case("films", ParsedRef::Id { id: "films".into() })]
    #[case("films.title", ParsedRef::Qualified { parent: "films".into(), child: "title".into() })]
    #[case("films.title[12]", ParsedRef::Cell { field: "films".into(), column: "title".into(), row: 12 })]
    fn parses_reference_forms(#[case] text: &str, #[case] expected: ParsedRef) {
        let parsed = parse_ref(text).unwrap();
        assert_eq!(parsed.to_string(), text);
        assert_eq!(parsed, expected);
    }

    #[rstest]
    #[case("")]
    #[case("films.")]
    #[case("films.title[x]")]
    #[case("a.b.c")]
    #[case("9lives")]
    fn rejects_malformed_references(#[case] text: &str) {
        assert_eq!(
            parse_ref(text).unwrap_err().kind,
            ValidationErrorKind::InvalidRef
        );
    }

    #[test]
    fn qualified_reference_is_disambiguated_by_field_kind() {
        let form = parse(FORM).unwrap();
        let column = resolve_in_form("films.title", &form).unwrap();
        assert_eq!(column.scope, Scope::Column);
        let option = resolve_in_form("genres.title", &form).unwrap();
        assert_eq!(option.scope, Scope::Option);
        assert_eq!(option.field_id.as_deref(), Some("genres"));
    }

    #[test]
    fn cells_are_range_checked_with_row_counts() {
        let form = parse(FORM).unwrap();
        assert_eq!(
            resolve_in_form("films.year[0]", &form).unwrap().scope,
            Scope::Cell
        );
        let err = resolve_in_form("films.year[1]", &form).unwrap_err();
        assert!(err.message.contains("0..=0"));

        let unchecked = resolve_ref(&parse_ref("films.year[9]").unwrap(), &form.schema, None);
        assert!(unchecked.is_ok());
    }

    #[test]
    fn cell_on_a_select_suggests_the_qualified_form() {
        let form = parse(FORM).unwrap();
        let err = resolve_in_form("genres.crime[0]", &form).unwrap_err();
        assert!(err.message.contains("'genres.crime'"));
    }

    #[test]
    fn errors_list_alternatives() {
        let form = parse(FORM).unwrap();
        let err = resolve_in_form("films.rating", &form).unwrap_err();
        assert!(err.message.contains("'title', 'year'"));
        let err = resolve_in_form("comment.x", &form).unwrap_err();
        assert!(err.message.contains("no options or columns"));
    }

    #[test]
    fn field_ownership_of_references() {
        assert!(refers_to_field("films", "films"));
        assert!(refers_to_field("films.title[0]", "films"));
        assert!(!refers_to_field("films2", "films"));
    }

    #[test]
    fn form_group_and_note_scopes() {
        let form = parse(FORM).unwrap();
        assert_eq!(resolve_in_form("movies", &form).unwrap().scope, Scope::Form);
        assert_eq!(resolve_in_form("picks", &form).unwrap().scope, Scope::Group);
        assert_eq!(resolve_in_form("n1", &form).unwrap().scope, Scope::Note);
    }
}
