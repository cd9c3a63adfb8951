use core::fmt;

use serde::{Deserialize, Serialize};

pub mod form;
pub mod note;
pub mod response;
pub mod schema;

pub use form::{FormMetadata, HarnessConfig, IdEntry, IdKind, MarkformSection, ParsedForm};
pub use note::{Note, NoteState};
pub use response::{
    CellResponse, CellState, FieldResponse, FieldValue, ResponseState, ScalarValue, TableRow,
    TableValue,
};
pub use schema::{
    BodyNode, DocBlock, DocTag, Field, FieldAttrs, FieldGroup, FieldOption, FormSchema,
    ImplicitCheckbox, ListConstraints, TableColumn,
};

/// Id of the implicit group holding fields placed directly under the form
pub const DEFAULT_GROUP_ID: &str = "_default";
/// Id of the implicit field synthesized from bare checkbox list items
pub const IMPLICIT_CHECKBOXES_ID: &str = "_checkboxes";
/// Ids an author may never use for an explicit element
pub const RESERVED_IDS: [&str; 2] = [DEFAULT_GROUP_ID, IMPLICIT_CHECKBOXES_ID];

/// Role assumed when a field or note declares none
pub const DEFAULT_ROLE: &str = "agent";

#[must_use]
pub fn is_reserved_id(id: &str) -> bool {
    RESERVED_IDS.contains(&id)
}

/// Identifier syntax shared by forms, groups, fields, options and notes
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// The closed set of field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    StringList,
    Url,
    UrlList,
    Date,
    Year,
    Checkboxes,
    SingleSelect,
    MultiSelect,
    Table,
}

impl FieldKind {
    pub const ALL: [Self; 11] = [
        Self::String,
        Self::Number,
        Self::StringList,
        Self::Url,
        Self::UrlList,
        Self::Date,
        Self::Year,
        Self::Checkboxes,
        Self::SingleSelect,
        Self::MultiSelect,
        Self::Table,
    ];

    /// Name used in the `kind` attribute and in `set_<kind>` patches
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::StringList => "string_list",
            Self::Url => "url",
            Self::UrlList => "url_list",
            Self::Date => "date",
            Self::Year => "year",
            Self::Checkboxes => "checkboxes",
            Self::SingleSelect => "single_select",
            Self::MultiSelect => "multi_select",
            Self::Table => "table",
        }
    }

    /// Dedicated tag name accepted as an alias for `field kind="..."`
    #[must_use]
    pub const fn legacy_tag(&self) -> &'static str {
        match self {
            Self::String => "string-field",
            Self::Number => "number-field",
            Self::StringList => "string-list",
            Self::Url => "url-field",
            Self::UrlList => "url-list",
            Self::Date => "date-field",
            Self::Year => "year-field",
            Self::Checkboxes => "checkboxes",
            Self::SingleSelect => "single-select",
            Self::MultiSelect => "multi-select",
            Self::Table => "table-field",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    #[must_use]
    pub fn from_legacy_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.legacy_tag() == tag)
    }

    /// Where the value of a field of this kind lives in the markup
    #[must_use]
    pub const fn syntax(&self) -> FieldSyntax {
        match self {
            Self::String
            | Self::Number
            | Self::StringList
            | Self::Url
            | Self::UrlList
            | Self::Date
            | Self::Year => FieldSyntax::Text,
            Self::Checkboxes | Self::SingleSelect | Self::MultiSelect => FieldSyntax::Checkboxes,
            Self::Table => FieldSyntax::Table,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's value is written in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldSyntax {
    /// Value lives in a fenced `value` block
    Text,
    /// Value lives in inline `[ ]`/`[x]` markers
    Checkboxes,
    /// Value is a markdown sub-table
    Table,
}

/// Scalar types allowed for table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Number,
    Url,
    Date,
    Year,
}

impl ColumnType {
    pub const ALL: [Self; 5] = [
        Self::String,
        Self::Number,
        Self::Url,
        Self::Date,
        Self::Year,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Url => "url",
            Self::Date => "date",
            Self::Year => "year",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == name)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative importance of a field, used to order issues
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Marker vocabulary of a checkboxes field
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxMode {
    #[default]
    Multi,
    Simple,
    Explicit,
}

impl CheckboxMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Multi => "multi",
            Self::Simple => "simple",
            Self::Explicit => "explicit",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "multi" => Some(Self::Multi),
            "simple" => Some(Self::Simple),
            "explicit" => Some(Self::Explicit),
            _ => None,
        }
    }

    /// State an untouched checkbox has in this mode
    #[must_use]
    pub const fn default_state(&self) -> CheckboxState {
        match self {
            Self::Multi | Self::Simple => CheckboxState::Todo,
            Self::Explicit => CheckboxState::Unfilled,
        }
    }

    #[must_use]
    pub const fn allows(&self, state: CheckboxState) -> bool {
        match self {
            Self::Multi => matches!(
                state,
                CheckboxState::Todo
                    | CheckboxState::Done
                    | CheckboxState::Incomplete
                    | CheckboxState::Active
                    | CheckboxState::Na
            ),
            Self::Simple => matches!(state, CheckboxState::Todo | CheckboxState::Done),
            Self::Explicit => matches!(
                state,
                CheckboxState::Unfilled | CheckboxState::Yes | CheckboxState::No
            ),
        }
    }
}

/// State of one checkbox item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxState {
    Todo,
    Done,
    Incomplete,
    Active,
    Na,
    Unfilled,
    Yes,
    No,
}

impl CheckboxState {
    /// Character written between the brackets
    #[must_use]
    pub const fn marker(&self) -> char {
        match self {
            Self::Todo | Self::Unfilled => ' ',
            Self::Done => 'x',
            Self::Incomplete => '/',
            Self::Active => '*',
            Self::Na => '-',
            Self::Yes => 'y',
            Self::No => 'n',
        }
    }

    /// Read a marker in the vocabulary of `mode`
    #[must_use]
    pub fn from_marker(marker: char, mode: CheckboxMode) -> Option<Self> {
        let state = match (marker, mode) {
            (' ', CheckboxMode::Explicit) => Self::Unfilled,
            (' ', _) => Self::Todo,
            ('x' | 'X', CheckboxMode::Multi | CheckboxMode::Simple) => Self::Done,
            ('/', CheckboxMode::Multi) => Self::Incomplete,
            ('*', CheckboxMode::Multi) => Self::Active,
            ('-', CheckboxMode::Multi) => Self::Na,
            ('y' | 'Y', CheckboxMode::Explicit) => Self::Yes,
            ('n' | 'N', CheckboxMode::Explicit) => Self::No,
            _ => return None,
        };
        Some(state)
    }

    /// Whether the item needs no further work
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Na | Self::Yes | Self::No)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Done => "done",
            Self::Incomplete => "incomplete",
            Self::Active => "active",
            Self::Na => "na",
            Self::Unfilled => "unfilled",
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

/// Tag syntax a document is written in
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStyle {
    /// `{% tag %}`
    #[default]
    Bracket,
    /// `<!-- tag -->`
    Comment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_kind_names_round_trip() {
        for kind in FieldKind::ALL {
            assert_eq!(FieldKind::from_name(kind.as_str()), Some(kind));
            assert_eq!(FieldKind::from_legacy_tag(kind.legacy_tag()), Some(kind));
        }
        assert_eq!(FieldKind::from_name("text"), None);
    }

    #[test]
    fn field_kind_syntax_groups() {
        assert_eq!(FieldKind::Year.syntax(), FieldSyntax::Text);
        assert_eq!(FieldKind::MultiSelect.syntax(), FieldSyntax::Checkboxes);
        assert_eq!(FieldKind::Table.syntax(), FieldSyntax::Table);
    }

    #[test]
    fn checkbox_markers_respect_mode() {
        assert_eq!(
            CheckboxState::from_marker(' ', CheckboxMode::Explicit),
            Some(CheckboxState::Unfilled)
        );
        assert_eq!(
            CheckboxState::from_marker('/', CheckboxMode::Multi),
            Some(CheckboxState::Incomplete)
        );
        assert_eq!(CheckboxState::from_marker('/', CheckboxMode::Simple), None);
        assert_eq!(CheckboxState::from_marker('x', CheckboxMode::Explicit), None);
        for state in [CheckboxState::Done, CheckboxState::Na, CheckboxState::Yes] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn reserved_ids() {
        assert!(is_reserved_id("_default"));
        assert!(is_reserved_id("_checkboxes"));
        assert!(!is_reserved_id("_private"));
    }

    #[test]
    fn identifier_syntax() {
        assert!(is_valid_id("release_year"));
        assert!(is_valid_id("_x-2"));
        assert!(!is_valid_id("2nd"));
        assert!(!is_valid_id("films.title"));
        assert!(!is_valid_id(""));
    }
}
