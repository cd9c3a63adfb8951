//! Markdown sub-table fields
//!
//! Column ids come from the `columnIds` attribute or, when it is absent, from the
//! header row. A table with a header and separator but no data rows is an answered
//! empty table; a field with no table at all is unanswered.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::document::{AstNode, AttrValue, TagNode};
use crate::error::{
    SerializeError, SerializeResult, ValidationError, ValidationErrorKind, ValidationResult,
};
use crate::models::{
    CellResponse, CellState, ColumnType, Field, FieldAttrs, FieldResponse, FieldSyntax,
    FieldValue, ResponseState, ScalarValue, TableColumn, TableRow, TableValue, TagStyle,
};
use crate::parser::interface::{reject_child_tags, resolve_state, unfilled_response, ResponseParser};
use crate::parser::sentinel::{cell_sentinel, cell_sentinel_text};

use super::text::{parse_number, parse_year};

static COLUMN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("column id pattern is valid"));

static SEPARATOR_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-+:?$").expect("separator pattern is valid"));

/// Whether `id` is usable as a column id
#[must_use]
pub fn is_valid_column_id(id: &str) -> bool {
    COLUMN_ID.is_match(id)
}

/// Escape a cell for writing between `|` delimiters
///
/// A run of backslashes directly before a `|` is doubled, then the `|` itself is
/// escaped, so `split_row` can tell an escaped pipe (odd run) from a delimiter.
#[must_use]
pub fn escape_cell(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for c in text.chars() {
        match c {
            '\\' => run += 1,
            '|' => {
                out.push_str(&"\\".repeat(run * 2));
                out.push_str("\\|");
                run = 0;
            }
            _ => {
                out.push_str(&"\\".repeat(run));
                run = 0;
                out.push(c);
            }
        }
    }
    out.push_str(&"\\".repeat(run));
    out
}

/// Split a table row into unescaped, trimmed cells
#[must_use]
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut run = 0;
    let mut ended_with_delimiter = false;

    for c in line.chars() {
        ended_with_delimiter = false;
        match c {
            '\\' => run += 1,
            '|' if run % 2 == 1 => {
                current.push_str(&"\\".repeat(run / 2));
                current.push('|');
                run = 0;
            }
            '|' => {
                current.push_str(&"\\".repeat(run / 2));
                cells.push(current.trim().to_string());
                current.clear();
                run = 0;
                ended_with_delimiter = true;
            }
            _ => {
                current.push_str(&"\\".repeat(run));
                run = 0;
                current.push(c);
            }
        }
    }
    current.push_str(&"\\".repeat(run));
    cells.push(current.trim().to_string());

    if ended_with_delimiter {
        cells.pop();
    }
    if line.starts_with('|') && !cells.is_empty() {
        cells.remove(0);
    }
    cells
}

/// Whether a line is a header separator such as `|---|:--:|`
#[must_use]
pub fn is_separator_row(line: &str) -> bool {
    let cells = split_row(line);
    !cells.is_empty() && cells.iter().all(|c| SEPARATOR_CELL.is_match(c))
}

/// Read one cell as a typed scalar or a sentinel
///
/// # Errors
///
/// Returns `InvalidCell` for an empty cell and `TypeMismatch` for a number or year
/// column holding something else
pub fn coerce_cell(
    column_type: ColumnType,
    text: &str,
    reference: &str,
) -> ValidationResult<CellResponse> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::new(
            ValidationErrorKind::InvalidCell,
            reference,
            format!("Cell '{reference}' is empty; write a value or %SKIP%"),
        ));
    }
    if let Some((state, reason)) = cell_sentinel(text) {
        return Ok(match state {
            CellState::Aborted => CellResponse::aborted(reason),
            CellState::Skipped | CellState::Answered => CellResponse::skipped(reason),
        });
    }

    let value = match column_type {
        ColumnType::String => ScalarValue::String(text.to_string()),
        ColumnType::Url => ScalarValue::Url(text.to_string()),
        ColumnType::Date => ScalarValue::Date(text.to_string()),
        ColumnType::Number => ScalarValue::Number(parse_number(text).ok_or_else(|| {
            ValidationError::type_mismatch(
                reference,
                format!("Cell '{reference}' expects a number, found '{text}'"),
            )
        })?),
        ColumnType::Year => ScalarValue::Year(parse_year(text).ok_or_else(|| {
            ValidationError::type_mismatch(
                reference,
                format!("Cell '{reference}' expects a year, found '{text}'"),
            )
        })?),
    };
    Ok(CellResponse::answered(value))
}

/// Text of a cell as written in a row, before escaping
///
/// # Errors
///
/// Returns an error for missing or blank answered cells and for text with newlines
/// or control characters
pub fn cell_text(cell: Option<&CellResponse>, reference: &str) -> SerializeResult<String> {
    let cell = cell.ok_or_else(|| SerializeError::empty_cell(reference))?;
    let text = match cell.state {
        CellState::Answered => cell
            .value
            .as_ref()
            .map(ScalarValue::to_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SerializeError::empty_cell(reference))?,
        CellState::Skipped | CellState::Aborted => {
            cell_sentinel_text(cell.state, cell.reason.as_deref()).unwrap_or_default()
        }
    };
    if text.chars().any(char::is_control) {
        return Err(SerializeError::invalid_cell_text(reference));
    }
    Ok(text)
}

/// Render cells as one row
#[must_use]
pub fn format_row<S: AsRef<str>>(cells: &[S]) -> String {
    let body: Vec<String> = cells.iter().map(|c| escape_cell(c.as_ref())).collect();
    format!("| {} |", body.join(" | "))
}

fn string_list(node: &TagNode, name: &str, field_id: &str) -> ValidationResult<Option<Vec<String>>> {
    let Some(value) = node.attrs.get(name) else {
        return Ok(None);
    };
    let items = value
        .as_list()
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            ValidationError::invalid_attribute(
                field_id,
                format!("'{name}' must be a list of strings, found {value}"),
            )
        })?;
    Ok(Some(items))
}

fn columns_error(field_id: &str, message: String) -> ValidationError {
    ValidationError::new(ValidationErrorKind::InvalidColumns, field_id, message)
}

/// Zip declared ids, labels and types with the header row
fn resolve_columns(
    node: &TagNode,
    field_id: &str,
    header: Option<&[String]>,
) -> ValidationResult<Vec<TableColumn>> {
    let declared_ids = string_list(node, "columnIds", field_id)?;
    let declared_types = string_list(node, "columnTypes", field_id)?;
    let declared_labels = string_list(node, "columnLabels", field_id)?;

    let ids = match (declared_ids, header) {
        (Some(ids), Some(header)) if ids.len() != header.len() => {
            return Err(columns_error(
                field_id,
                format!(
                    "columnIds declares {} columns but the header row has {}",
                    ids.len(),
                    header.len()
                ),
            ));
        }
        (Some(ids), _) => ids,
        (None, Some(header)) => header.to_vec(),
        (None, None) => return Err(ValidationError::missing_attribute(field_id, "columnIds")),
    };

    let mut seen = HashSet::new();
    for id in &ids {
        if !is_valid_column_id(id) {
            return Err(columns_error(
                field_id,
                format!("Column id '{id}' must match ^[a-z][a-z0-9_]*$"),
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(columns_error(field_id, format!("Column id '{id}' appears twice")));
        }
    }

    let types = match declared_types {
        Some(types) if types.len() != ids.len() => {
            return Err(columns_error(
                field_id,
                format!(
                    "columnTypes has {} entries but the table has {} columns",
                    types.len(),
                    ids.len()
                ),
            ));
        }
        Some(types) => types
            .iter()
            .map(|name| {
                ColumnType::from_name(name).ok_or_else(|| {
                    columns_error(
                        field_id,
                        format!(
                            "Unknown column type '{name}'; expected string, number, url, date or year"
                        ),
                    )
                })
            })
            .collect::<ValidationResult<Vec<_>>>()?,
        None => vec![ColumnType::String; ids.len()],
    };

    let labels: Vec<Option<String>> = match (declared_labels, header) {
        (Some(labels), _) if labels.len() != ids.len() => {
            return Err(columns_error(
                field_id,
                format!(
                    "columnLabels has {} entries but the table has {} columns",
                    labels.len(),
                    ids.len()
                ),
            ));
        }
        (Some(labels), _) => labels.into_iter().map(Some).collect(),
        (None, Some(header)) => header.iter().cloned().map(Some).collect(),
        (None, None) => vec![None; ids.len()],
    };

    Ok(ids
        .into_iter()
        .zip(types)
        .zip(labels)
        .map(|((id, column_type), label)| TableColumn {
            label: label.filter(|l| *l != id),
            id,
            column_type,
        })
        .collect())
}

/// Parser for table fields
#[derive(Debug)]
pub struct TableParser;

impl ResponseParser for TableParser {
    fn syntax(&self) -> FieldSyntax {
        FieldSyntax::Table
    }

    fn parse(
        &self,
        node: &TagNode,
        field: &mut Field,
        declared: Option<ResponseState>,
    ) -> ValidationResult<FieldResponse> {
        reject_child_tags(node, &field.id)?;

        let mut lines = Vec::new();
        for child in &node.children {
            match child {
                AstNode::Text(line) if line.is_blank() => {}
                AstNode::Text(line) if line.text.trim_start().starts_with('|') => lines.push(line),
                AstNode::Text(line) => {
                    return Err(ValidationError::unexpected_content(
                        &field.id,
                        format!(
                            "Line {} in table field '{}' is not a table row: '{}'",
                            line.line,
                            field.id,
                            line.text.trim()
                        ),
                    ));
                }
                AstNode::Fence(fence) => {
                    return Err(ValidationError::unexpected_content(
                        &field.id,
                        format!(
                            "Fence at line {} is not allowed in table field '{}'",
                            fence.span.start, field.id
                        ),
                    ));
                }
                AstNode::Tag(_) => {}
            }
        }

        let header = lines.first().map(|line| split_row(&line.text));
        if let Some(first) = lines.first()
            && !lines.get(1).is_some_and(|line| is_separator_row(&line.text))
        {
            return Err(columns_error(
                &field.id,
                format!(
                    "Table header at line {} must be followed by a separator row",
                    first.line
                ),
            ));
        }

        let columns = resolve_columns(node, &field.id, header.as_deref())?;
        let mut rows = Vec::new();
        for (index, line) in lines.iter().skip(2).enumerate() {
            let cells = split_row(&line.text);
            if cells.len() != columns.len() {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidCell,
                    &field.id,
                    format!(
                        "Row {index} of '{}' (line {}) has {} cells, expected {}",
                        field.id,
                        line.line,
                        cells.len(),
                        columns.len()
                    ),
                ));
            }
            let mut row = TableRow::new();
            for (column, cell) in columns.iter().zip(&cells) {
                let reference = format!("{}.{}[{index}]", field.id, column.id);
                row.insert(
                    column.id.clone(),
                    coerce_cell(column.column_type, cell, &reference)?,
                );
            }
            rows.push(row);
        }

        if let FieldAttrs::Table { columns: slot, .. } = &mut field.attrs {
            *slot = columns;
        }

        let terminal = resolve_state(field, !rows.is_empty(), declared, None)?;
        if terminal.is_some() || lines.is_empty() {
            return Ok(unfilled_response(terminal));
        }
        Ok(FieldResponse::answered(FieldValue::Table(TableValue::new(
            rows,
        ))))
    }

    fn render(
        &self,
        field: &Field,
        response: &FieldResponse,
        _style: TagStyle,
    ) -> SerializeResult<Vec<String>> {
        let Some(FieldValue::Table(table)) = response.value.as_ref().filter(|_| response.is_answered())
        else {
            return Ok(Vec::new());
        };
        let columns = field.attrs.columns();

        let header: Vec<&str> = columns
            .iter()
            .map(|c| c.label.as_deref().unwrap_or(&c.id))
            .collect();
        let mut lines = vec![
            format_row(&header),
            format!("|{}", " --- |".repeat(columns.len())),
        ];

        for (index, row) in table.rows.iter().enumerate() {
            let cells = columns
                .iter()
                .map(|column| {
                    cell_text(
                        row.get(&column.id),
                        &format!("{}.{}[{index}]", field.id, column.id),
                    )
                })
                .collect::<SerializeResult<Vec<_>>>()?;
            lines.push(format_row(&cells));
        }
        Ok(lines)
    }
}

fn text_list(items: impl Iterator<Item = String>) -> AttrValue {
    AttrValue::List(items.map(AttrValue::String).collect())
}

/// Attribute values describing a table's columns, in canonical form
#[must_use]
pub fn column_attributes(columns: &[TableColumn]) -> Vec<(&'static str, AttrValue)> {
    let mut attrs = vec![("columnIds", text_list(columns.iter().map(|c| c.id.clone())))];
    if columns.iter().any(|c| c.label.is_some()) {
        attrs.push((
            "columnLabels",
            text_list(
                columns
                    .iter()
                    .map(|c| c.label.clone().unwrap_or_else(|| c.id.clone())),
            ),
        ));
    }
    attrs.push((
        "columnTypes",
        text_list(columns.iter().map(|c| c.column_type.as_str().to_string())),
    ));
    attrs
}
