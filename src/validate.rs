//! Semantic validation of a parsed form
//!
//! Structural problems fail `parse` outright. What remains are per-field issues
//! an author or agent can fix one at a time: missing answers, values outside their
//! constraints and notes pointing nowhere.

use core::fmt;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::debug;

use crate::models::schema::DEFAULT_DATE_FORMAT;
use crate::models::schema::{DEFAULT_YEAR_MAX, DEFAULT_YEAR_MIN};
use crate::models::{
    CellState, CheckboxMode, CheckboxState, ColumnType, Field, FieldAttrs, FieldResponse,
    FieldValue, ListConstraints, ParsedForm, Priority, ResponseState, ScalarValue, TableValue,
};
use crate::refs::{Scope, resolve_in_form};

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("url pattern is valid")
});

/// Parse description for a supported `format` attribute
#[must_use]
pub fn date_format(format: &str) -> Option<&'static [BorrowedFormatItem<'static>]> {
    let description: &'static [BorrowedFormatItem<'static>] = match format {
        "YYYY-MM-DD" => format_description!("[year]-[month]-[day]"),
        "YYYY/MM/DD" => format_description!("[year]/[month]/[day]"),
        "YYYYMMDD" => format_description!("[year][month][day]"),
        "DD/MM/YYYY" => format_description!("[day]/[month]/[year]"),
        "MM/DD/YYYY" => format_description!("[month]/[day]/[year]"),
        "DD.MM.YYYY" => format_description!("[day].[month].[year]"),
        _ => return None,
    };
    Some(description)
}

/// Read a date written in `format`
#[must_use]
pub fn parse_date(value: &str, format: &str) -> Option<Date> {
    Date::parse(value.trim(), date_format(format)?).ok()
}

#[must_use]
pub fn is_valid_url(value: &str) -> bool {
    URL.is_match(value)
}

/// How urgently an issue blocks completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Must be resolved before the form is complete
    Required,
    /// Worth resolving; answering or skipping the field clears it
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    /// A value or reference breaks a rule
    ValidationError,
    RequiredMissing,
    OptionalEmpty,
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ValidationError => "validation_error",
            Self::RequiredMissing => "required_missing",
            Self::OptionalEmpty => "optional_empty",
        })
    }
}

/// One outstanding problem, located by a scope reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "ref")]
    pub reference: String,
    pub scope: Scope,
    pub reason: IssueReason,
    pub severity: Severity,
    pub message: String,
    pub priority: Priority,
    /// Field the issue belongs to; `None` for note issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

impl Issue {
    fn invalid(field: &Field, scope: Scope, reference: impl Into<String>, message: String) -> Self {
        Self {
            reference: reference.into(),
            scope,
            reason: IssueReason::ValidationError,
            severity: Severity::Required,
            message,
            priority: field.priority,
            field_id: Some(field.id.clone()),
        }
    }

    fn on_field(field: &Field, message: String) -> Self {
        Self::invalid(field, Scope::Field, &field.id, message)
    }

    /// True for issues that come from a broken rule rather than a missing answer
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.reason == IssueReason::ValidationError
    }
}

/// Check every field and note of a form
///
/// Issues are ordered by severity, then field priority, then document order.
#[must_use]
pub fn validate(form: &ParsedForm) -> Vec<Issue> {
    let mut issues = Vec::new();
    for field in form.fields_in_order() {
        issues.extend(check_field(field, &form.response(&field.id)));
    }

    for note in &form.notes {
        if let Err(err) = resolve_in_form(&note.reference, form) {
            issues.push(Issue {
                reference: note.id.clone(),
                scope: Scope::Note,
                reason: IssueReason::ValidationError,
                severity: Severity::Required,
                message: format!("Note '{}' refers to nothing: {}", note.id, err.message),
                priority: Priority::default(),
                field_id: None,
            });
        }
    }

    let position: HashMap<&str, usize> = form
        .order_index
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    issues.sort_by_key(|issue| {
        (
            issue.severity,
            issue.priority,
            issue
                .field_id
                .as_deref()
                .and_then(|id| position.get(id).copied())
                .unwrap_or(usize::MAX),
        )
    });

    debug!(form = %form.schema.id, issues = issues.len(), "validated form");
    issues
}

/// Issues for one field given its response
#[must_use]
pub fn check_field(field: &Field, response: &FieldResponse) -> Vec<Issue> {
    match response.state {
        ResponseState::Empty if field.required => vec![Issue {
            reason: IssueReason::RequiredMissing,
            ..Issue::on_field(field, format!("Required field '{}' is empty", field.label))
        }],
        ResponseState::Empty => vec![Issue {
            reason: IssueReason::OptionalEmpty,
            severity: Severity::Optional,
            ..Issue::on_field(
                field,
                format!("Optional field '{}' is empty; answer or skip it", field.label),
            )
        }],
        ResponseState::Skipped if field.required => vec![Issue::on_field(
            field,
            format!("Required field '{}' cannot be skipped", field.label),
        )],
        ResponseState::Skipped | ResponseState::Aborted => Vec::new(),
        ResponseState::Answered => match &response.value {
            Some(value) => check_value(field, value),
            None => vec![Issue::on_field(
                field,
                format!("Field '{}' is answered but has no value", field.id),
            )],
        },
    }
}

fn check_value(field: &Field, value: &FieldValue) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut fail = |message: String| issues.push(Issue::on_field(field, message));

    match (&field.attrs, value) {
        (
            FieldAttrs::String {
                min_length,
                max_length,
                pattern,
            },
            FieldValue::String(text),
        ) => {
            let length = text.chars().count();
            if let Some(min) = *min_length
                && length < min
            {
                fail(format!("Must be at least {min} characters, has {length}"));
            }
            if let Some(max) = *max_length
                && length > max
            {
                fail(format!("Must be at most {max} characters, has {length}"));
            }
            if let Some(pattern) = pattern
                && let Ok(re) = Regex::new(pattern)
                && !re.is_match(text)
            {
                fail(format!("'{text}' does not match pattern {pattern}"));
            }
        }
        (FieldAttrs::Number { min, max, integer }, FieldValue::Number(number)) => {
            if *integer && number.fract() != 0.0 {
                fail(format!("{number} must be an integer"));
            }
            if let Some(min) = *min
                && *number < min
            {
                fail(format!("{number} is below the minimum {min}"));
            }
            if let Some(max) = *max
                && *number > max
            {
                fail(format!("{number} is above the maximum {max}"));
            }
        }
        (FieldAttrs::StringList(constraints), FieldValue::StringList(items)) => {
            check_list(constraints, items, &mut fail);
        }
        (FieldAttrs::UrlList(constraints), FieldValue::UrlList(items)) => {
            check_list(constraints, items, &mut fail);
            for (i, item) in items.iter().enumerate() {
                if !is_valid_url(item) {
                    fail(format!("Item {} '{item}' is not a valid URL", i + 1));
                }
            }
        }
        (FieldAttrs::Url, FieldValue::Url(url)) => {
            if !is_valid_url(url) {
                fail(format!("'{url}' is not a valid URL"));
            }
        }
        (FieldAttrs::Date { format, min, max }, FieldValue::Date(text)) => {
            match parse_date(text, format) {
                None => fail(format!("'{text}' is not a valid date in format {format}")),
                Some(date) => {
                    if let Some(min) = min
                        && parse_date(min, format).is_some_and(|min| date < min)
                    {
                        fail(format!("{text} is before the earliest allowed date {min}"));
                    }
                    if let Some(max) = max
                        && parse_date(max, format).is_some_and(|max| date > max)
                    {
                        fail(format!("{text} is after the latest allowed date {max}"));
                    }
                }
            }
        }
        (FieldAttrs::Year { min, max }, FieldValue::Year(year)) => {
            if !(*min..=*max).contains(year) {
                fail(format!("Year {year} is outside {min}..={max}"));
            }
        }
        (FieldAttrs::Checkboxes { mode, options }, FieldValue::Checkboxes(states)) => {
            if *mode == CheckboxMode::Explicit && field.required {
                for option in options {
                    let state = states
                        .get(&option.id)
                        .copied()
                        .unwrap_or(CheckboxState::Unfilled);
                    if state == CheckboxState::Unfilled {
                        issues.push(Issue {
                            reason: IssueReason::RequiredMissing,
                            ..Issue::invalid(
                                field,
                                Scope::Option,
                                format!("{}.{}", field.id, option.id),
                                format!("'{}' needs a yes or no answer", option.label),
                            )
                        });
                    }
                }
            }
        }
        (FieldAttrs::SingleSelect { .. }, FieldValue::SingleSelect(selected)) => {
            if field.option(selected).is_none() {
                fail(format!("'{selected}' is not an option of '{}'", field.id));
            }
        }
        (
            FieldAttrs::MultiSelect {
                min_selections,
                max_selections,
                ..
            },
            FieldValue::MultiSelect(selected),
        ) => {
            let count = selected.len();
            if let Some(min) = *min_selections
                && count < min
            {
                fail(format!("Select at least {min} options, {count} selected"));
            }
            if let Some(max) = *max_selections
                && count > max
            {
                fail(format!("Select at most {max} options, {count} selected"));
            }
        }
        (
            FieldAttrs::Table {
                min_rows, max_rows, ..
            },
            FieldValue::Table(table),
        ) => {
            let count = table.row_count();
            if let Some(min) = *min_rows
                && count < min
            {
                fail(format!("Table needs at least {min} rows, has {count}"));
            }
            if let Some(max) = *max_rows
                && count > max
            {
                fail(format!("Table allows at most {max} rows, has {count}"));
            }
            issues.extend(check_cells(field, table));
        }
        (attrs, value) => fail(format!(
            "Value of kind {} does not fit a {} field",
            value.kind(),
            attrs.kind()
        )),
    }
    issues
}

fn check_list(constraints: &ListConstraints, items: &[String], fail: &mut impl FnMut(String)) {
    let count = items.len();
    if let Some(min) = constraints.min_items
        && count < min
    {
        fail(format!("Needs at least {min} items, has {count}"));
    }
    if let Some(max) = constraints.max_items
        && count > max
    {
        fail(format!("Allows at most {max} items, has {count}"));
    }
    if constraints.unique_items {
        let mut seen = std::collections::HashSet::new();
        for item in items {
            if !seen.insert(item.as_str()) {
                fail(format!("'{item}' appears more than once"));
            }
        }
    }
}

fn check_cells(field: &Field, table: &TableValue) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (row, cells) in table.rows.iter().enumerate() {
        for column in field.attrs.columns() {
            let reference = format!("{}.{}[{row}]", field.id, column.id);
            let message = match cells.get(&column.id) {
                None => Some("Cell is missing; every cell needs a value or a sentinel".to_string()),
                Some(cell) if cell.state != CellState::Answered => None,
                Some(cell) => match &cell.value {
                    None => Some("Answered cell has no value".to_string()),
                    Some(value) => cell_problem(column.column_type, value),
                },
            };
            if let Some(message) = message {
                issues.push(Issue::invalid(field, Scope::Cell, reference, message));
            }
        }
    }
    issues
}

fn cell_problem(column_type: ColumnType, value: &ScalarValue) -> Option<String> {
    if value.column_type() != column_type {
        return Some(format!(
            "Cell holds a {} value but the column is {column_type}",
            value.column_type()
        ));
    }
    match value {
        ScalarValue::Url(url) if !is_valid_url(url) => Some(format!("'{url}' is not a valid URL")),
        ScalarValue::Date(date) if parse_date(date, DEFAULT_DATE_FORMAT).is_none() => Some(
            format!("'{date}' is not a valid date in format {DEFAULT_DATE_FORMAT}"),
        ),
        ScalarValue::Year(year) if !(DEFAULT_YEAR_MIN..=DEFAULT_YEAR_MAX).contains(year) => Some(
            format!("Year {year} is outside {DEFAULT_YEAR_MIN}..={DEFAULT_YEAR_MAX}"),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use rstest::rstest;

    fn issues_for(body: &str) -> Vec<Issue> {
        let text = format!("{{% form id=\"f\" %}}\n{body}\n{{% /form %}}\n");
        validate(&parse(&text).unwrap())
    }

    fn fenced(kind: &str, attrs: &str, value: &str) -> String {
        format!("{{% field kind=\"{kind}\" id=\"x\" {attrs} %}}\n```value\n{value}\n```\n{{% /field %}}")
    }

    #[test]
    fn empty_fields_by_requirement() {
        let issues = issues_for(
            "{% field kind=\"string\" id=\"a\" %}{% /field %}\n{% field kind=\"string\" id=\"b\" required=true %}{% /field %}",
        );
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].reference, "b");
        assert_eq!(issues[0].reason, IssueReason::RequiredMissing);
        assert_eq!(issues[1].severity, Severity::Optional);
    }

    #[test]
    fn skipped_optional_field_has_no_issue() {
        let issues = issues_for("{% field kind=\"url\" id=\"a\" state=\"skipped\" %}{% /field %}");
        assert!(issues.is_empty());
    }

    #[rstest]
    #[case("string", "minLength=5", "abc", true)]
    #[case("string", "pattern=\"^[A-Z]+$\"", "ABC", false)]
    #[case("string", "pattern=\"^[A-Z]+$\"", "abc", true)]
    #[case("number", "integer=true", "2.5", true)]
    #[case("number", "min=0 max=10", "11", true)]
    #[case("number", "min=0 max=10", "10", false)]
    #[case("url", "", "https://example.com/a", false)]
    #[case("url", "", "example dot com", true)]
    #[case("date", "", "2024-02-30", true)]
    #[case("date", "min=\"2020-01-01\"", "2019-12-31", true)]
    #[case("date", "format=\"DD/MM/YYYY\"", "31/12/2019", false)]
    #[case("year", "", "999", true)]
    #[case("year", "min=1900 max=2000", "1950", false)]
    #[case("string_list", "minItems=2", "one", true)]
    #[case("string_list", "uniqueItems=true", "a\nb\na", true)]
    #[case("url_list", "", "https://a.io\nnope", true)]
    fn value_constraints(
        #[case] kind: &str,
        #[case] attrs: &str,
        #[case] value: &str,
        #[case] fails: bool,
    ) {
        let issues = issues_for(&fenced(kind, attrs, value));
        assert_eq!(!issues.is_empty(), fails, "{issues:?}");
        assert!(issues.iter().all(Issue::is_validation_error));
    }

    #[test]
    fn zero_row_table_against_min_rows() {
        let table = |min_rows: u32| {
            format!(
                "{{% field kind=\"table\" id=\"t\" columnIds=[\"name\", \"title\"] minRows={min_rows} %}}\n| name | title |\n|---|---|\n{{% /field %}}"
            )
        };
        assert!(issues_for(&table(0)).is_empty());

        let issues = issues_for(&table(1));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Required);
        assert!(issues[0].message.contains("at least 1 rows"));
    }

    #[test]
    fn table_cells_are_checked() {
        let issues = issues_for(
            "{% field kind=\"table\" id=\"t\" columnIds=[\"site\"] columnTypes=[\"url\"] %}\n| Site |\n|---|\n| https://ok.io |\n| not a url |\n{% /field %}",
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].scope, Scope::Cell);
        assert_eq!(issues[0].reference, "t.site[1]");
    }

    #[test]
    fn explicit_required_checkboxes_need_every_answer() {
        let issues = issues_for(
            "{% field kind=\"checkboxes\" id=\"c\" checkboxMode=\"explicit\" required=true %}\n- [y] One {% #one %}\n- [ ] Two {% #two %}\n{% /field %}",
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].scope, Scope::Option);
        assert_eq!(issues[0].reference, "c.two");
    }

    #[test]
    fn multi_select_bounds() {
        let issues = issues_for(
            "{% field kind=\"multi_select\" id=\"m\" minSelections=2 %}\n- [x] A {% #a %}\n- [ ] B {% #b %}\n{% /field %}",
        );
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn dangling_note_ref_is_an_issue() {
        let issues = issues_for(
            "{% field kind=\"string\" id=\"a\" state=\"skipped\" %}{% /field %}\n{% note id=\"n1\" ref=\"a.nothing\" %}\nhm\n{% /note %}",
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].scope, Scope::Note);
    }

    #[test]
    fn issues_are_ordered_by_severity_then_priority() {
        let issues = issues_for(
            "{% field kind=\"string\" id=\"a\" %}{% /field %}\n{% field kind=\"string\" id=\"b\" priority=\"low\" required=true %}{% /field %}\n{% field kind=\"string\" id=\"c\" priority=\"high\" required=true %}{% /field %}",
        );
        let order: Vec<_> = issues.iter().map(|i| i.reference.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn supported_date_formats() {
        assert!(parse_date("2024-02-29", "YYYY-MM-DD").is_some());
        assert!(parse_date("2023-02-29", "YYYY-MM-DD").is_none());
        assert!(parse_date("20240229", "YYYYMMDD").is_some());
        assert!(date_format("YY-M-D").is_none());
    }
}
