//! Response values: what is currently known about each field
//!
//! A `FieldResponse` pairs a `ResponseState` with an optional `FieldValue`. The value
//! is present exactly when the state is `Answered`, and its discriminant is always a
//! real field kind; skipped and aborted are states, never values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CheckboxState, ColumnType, FieldKind};

/// Token standing in for a skipped value inside fences and table cells
pub const SKIP_SENTINEL: &str = "%SKIP%";
/// Token standing in for an aborted value inside fences and table cells
pub const ABORT_SENTINEL: &str = "%ABORT%";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    #[default]
    Empty,
    Answered,
    Skipped,
    Aborted,
}

impl ResponseState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Answered => "answered",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }

    /// The in-band token for this state, if it has one
    #[must_use]
    pub const fn sentinel(&self) -> Option<&'static str> {
        match self {
            Self::Skipped => Some(SKIP_SENTINEL),
            Self::Aborted => Some(ABORT_SENTINEL),
            Self::Empty | Self::Answered => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResponse {
    pub state: ResponseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl FieldResponse {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            state: ResponseState::Empty,
            value: None,
        }
    }

    #[must_use]
    pub const fn answered(value: FieldValue) -> Self {
        Self {
            state: ResponseState::Answered,
            value: Some(value),
        }
    }

    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            state: ResponseState::Skipped,
            value: None,
        }
    }

    #[must_use]
    pub const fn aborted() -> Self {
        Self {
            state: ResponseState::Aborted,
            value: None,
        }
    }

    #[must_use]
    pub const fn is_answered(&self) -> bool {
        matches!(self.state, ResponseState::Answered)
    }
}

/// A typed scalar, as stored in a table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScalarValue {
    String(String),
    Number(f64),
    Url(String),
    Date(String),
    Year(i32),
}

impl ScalarValue {
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::String(_) => ColumnType::String,
            Self::Number(_) => ColumnType::Number,
            Self::Url(_) => ColumnType::Url,
            Self::Date(_) => ColumnType::Date,
            Self::Year(_) => ColumnType::Year,
        }
    }

    /// Text form as written in a document
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(text) | Self::Url(text) | Self::Date(text) => text.clone(),
            Self::Number(number) => format_number(*number),
            Self::Year(year) => year.to_string(),
        }
    }

    /// Plain JSON value for exports
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(text) | Self::Url(text) | Self::Date(text) => {
                serde_json::Value::String(text.clone())
            }
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Year(year) => serde_json::Value::from(*year),
        }
    }
}

/// Write a number the way it is read back: integral values without a fraction
#[must_use]
pub fn format_number(number: f64) -> String {
    format!("{number}")
}

/// State of an individual table cell; cells are never implicitly empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Answered,
    Skipped,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellResponse {
    pub state: CellState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ScalarValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CellResponse {
    #[must_use]
    pub const fn answered(value: ScalarValue) -> Self {
        Self {
            state: CellState::Answered,
            value: Some(value),
            reason: None,
        }
    }

    #[must_use]
    pub const fn skipped(reason: Option<String>) -> Self {
        Self {
            state: CellState::Skipped,
            value: None,
            reason,
        }
    }

    #[must_use]
    pub const fn aborted(reason: Option<String>) -> Self {
        Self {
            state: CellState::Aborted,
            value: None,
            reason,
        }
    }
}

/// One table row, keyed by column id
pub type TableRow = BTreeMap<String, CellResponse>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    pub rows: Vec<TableRow>,
}

impl TableValue {
    #[must_use]
    pub const fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A field value; the variant always names the field's kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Number(f64),
    StringList(Vec<String>),
    Url(String),
    UrlList(Vec<String>),
    Date(String),
    Year(i32),
    Checkboxes(BTreeMap<String, CheckboxState>),
    SingleSelect(String),
    MultiSelect(Vec<String>),
    Table(TableValue),
}

impl FieldValue {
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::String(_) => FieldKind::String,
            Self::Number(_) => FieldKind::Number,
            Self::StringList(_) => FieldKind::StringList,
            Self::Url(_) => FieldKind::Url,
            Self::UrlList(_) => FieldKind::UrlList,
            Self::Date(_) => FieldKind::Date,
            Self::Year(_) => FieldKind::Year,
            Self::Checkboxes(_) => FieldKind::Checkboxes,
            Self::SingleSelect(_) => FieldKind::SingleSelect,
            Self::MultiSelect(_) => FieldKind::MultiSelect,
            Self::Table(_) => FieldKind::Table,
        }
    }
}

macro_rules! impl_value_accessors {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FieldValue {
                paste::paste! {
                    #[must_use]
                    pub fn [<as_ $variant:snake>](&self) -> Option<&$ty> {
                        if let FieldValue::$variant(value) = self {
                            Some(value)
                        } else {
                            None
                        }
                    }

                    #[must_use]
                    pub fn [<is_ $variant:snake>](&self) -> bool {
                        self.[<as_ $variant:snake>]().is_some()
                    }
                }
            }
        )*
    };
}

impl_value_accessors!(
    String => String,
    Number => f64,
    StringList => Vec<String>,
    Url => String,
    UrlList => Vec<String>,
    Date => String,
    Year => i32,
    Checkboxes => BTreeMap<String, CheckboxState>,
    SingleSelect => String,
    MultiSelect => Vec<String>,
    Table => TableValue,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_discriminant_matches_kind() {
        assert_eq!(FieldValue::Year(1999).kind(), FieldKind::Year);
        assert_eq!(
            FieldValue::Table(TableValue::default()).kind(),
            FieldKind::Table
        );
    }

    #[test]
    fn generated_accessors() {
        let value = FieldValue::StringList(vec!["a".into()]);
        assert!(value.is_string_list());
        assert!(!value.is_url_list());
        assert_eq!(value.as_string_list().map(Vec::len), Some(1));
        assert_eq!(FieldValue::Number(2.5).as_number(), Some(&2.5));
    }

    #[test]
    fn numbers_format_without_trailing_fraction() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.25), "-0.25");
    }

    #[test]
    fn sentinels_only_for_terminal_states() {
        assert_eq!(ResponseState::Skipped.sentinel(), Some("%SKIP%"));
        assert_eq!(ResponseState::Aborted.sentinel(), Some("%ABORT%"));
        assert_eq!(ResponseState::Answered.sentinel(), None);
    }
}
