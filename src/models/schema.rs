//! Form schema: groups, fields and the document layout around them

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{CheckboxMode, ColumnType, FieldKind, Priority, TagStyle};
use crate::document::AttrValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub column_type: ColumnType,
}

/// Size constraints shared by list-valued kinds
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListConstraints {
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
}

/// Kind-specific attributes; the variant determines the field kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldAttrs {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<String>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    StringList(ListConstraints),
    Url,
    UrlList(ListConstraints),
    Date {
        format: String,
        min: Option<String>,
        max: Option<String>,
    },
    Year {
        min: i32,
        max: i32,
    },
    Checkboxes {
        mode: CheckboxMode,
        options: Vec<FieldOption>,
    },
    SingleSelect {
        options: Vec<FieldOption>,
    },
    MultiSelect {
        options: Vec<FieldOption>,
        min_selections: Option<usize>,
        max_selections: Option<usize>,
    },
    Table {
        columns: Vec<TableColumn>,
        min_rows: Option<usize>,
        max_rows: Option<usize>,
    },
}

/// Default `format` of date fields
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";
pub const DEFAULT_YEAR_MIN: i32 = 1000;
pub const DEFAULT_YEAR_MAX: i32 = 2500;

impl FieldAttrs {
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::String { .. } => FieldKind::String,
            Self::Number { .. } => FieldKind::Number,
            Self::StringList(_) => FieldKind::StringList,
            Self::Url => FieldKind::Url,
            Self::UrlList(_) => FieldKind::UrlList,
            Self::Date { .. } => FieldKind::Date,
            Self::Year { .. } => FieldKind::Year,
            Self::Checkboxes { .. } => FieldKind::Checkboxes,
            Self::SingleSelect { .. } => FieldKind::SingleSelect,
            Self::MultiSelect { .. } => FieldKind::MultiSelect,
            Self::Table { .. } => FieldKind::Table,
        }
    }

    /// Defaults for a kind with no constraints declared
    #[must_use]
    pub fn defaults_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => Self::String {
                min_length: None,
                max_length: None,
                pattern: None,
            },
            FieldKind::Number => Self::Number {
                min: None,
                max: None,
                integer: false,
            },
            FieldKind::StringList => Self::StringList(ListConstraints::default()),
            FieldKind::Url => Self::Url,
            FieldKind::UrlList => Self::UrlList(ListConstraints::default()),
            FieldKind::Date => Self::Date {
                format: DEFAULT_DATE_FORMAT.to_string(),
                min: None,
                max: None,
            },
            FieldKind::Year => Self::Year {
                min: DEFAULT_YEAR_MIN,
                max: DEFAULT_YEAR_MAX,
            },
            FieldKind::Checkboxes => Self::Checkboxes {
                mode: CheckboxMode::default(),
                options: Vec::new(),
            },
            FieldKind::SingleSelect => Self::SingleSelect {
                options: Vec::new(),
            },
            FieldKind::MultiSelect => Self::MultiSelect {
                options: Vec::new(),
                min_selections: None,
                max_selections: None,
            },
            FieldKind::Table => Self::Table {
                columns: Vec::new(),
                min_rows: None,
                max_rows: None,
            },
        }
    }

    /// Options of checkbox-syntax kinds; empty for every other kind
    #[must_use]
    pub fn options(&self) -> &[FieldOption] {
        match self {
            Self::Checkboxes { options, .. }
            | Self::SingleSelect { options }
            | Self::MultiSelect { options, .. } => options,
            _ => &[],
        }
    }

    /// Columns of table fields; empty for every other kind
    #[must_use]
    pub fn columns(&self) -> &[TableColumn] {
        match self {
            Self::Table { columns, .. } => columns,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub label: String,
    pub required: bool,
    pub role: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub attrs: FieldAttrs,
    /// Id of the owning group (`_default` for fields placed directly in the form)
    pub group_id: String,
    /// Attributes this engine does not interpret, kept for round trip
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, AttrValue>,
}

impl Field {
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.attrs.kind()
    }

    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<&FieldOption> {
        self.attrs.options().iter().find(|o| o.id == option_id)
    }

    #[must_use]
    pub fn column(&self, column_id: &str) -> Option<&TableColumn> {
        self.attrs.columns().iter().find(|c| c.id == column_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub field_ids: Vec<String>,
    /// True for the synthesized `_default` group
    pub implicit: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, AttrValue>,
}

/// Which documentation tag a doc block came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocTag {
    Description,
    Instructions,
    Documentation,
}

impl DocTag {
    #[must_use]
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Instructions => "instructions",
            Self::Documentation => "documentation",
        }
    }

    #[must_use]
    pub fn from_tag_name(name: &str) -> Option<Self> {
        match name {
            "description" => Some(Self::Description),
            "instructions" => Some(Self::Instructions),
            "documentation" => Some(Self::Documentation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocBlock {
    pub tag: DocTag,
    #[serde(rename = "ref")]
    pub reference: String,
    pub body: String,
}

/// A checkbox list item outside any field, owned by the implicit `_checkboxes` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitCheckbox {
    pub option_id: String,
    /// Leading whitespace before the bullet
    pub indent: String,
    pub bullet: char,
    /// Whether the item carried an explicit id annotation
    pub annotated: bool,
}

/// Layout of the form body in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyNode {
    /// Free markdown, trimmed
    Markdown { text: String },
    Doc(DocBlock),
    Field { id: String },
    Group { id: String, body: Vec<BodyNode> },
    Checkbox(ImplicitCheckbox),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, AttrValue>,
    pub groups: Vec<FieldGroup>,
    /// Fields in document order
    pub fields: Vec<Field>,
    /// Field id to position in `fields`
    #[serde(skip)]
    pub field_index: HashMap<String, usize>,
    pub body: Vec<BodyNode>,
    /// Tag syntax the document was written in
    pub style: TagStyle,
}

impl FormSchema {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            extra: BTreeMap::new(),
            groups: Vec::new(),
            fields: Vec::new(),
            field_index: HashMap::new(),
            body: Vec::new(),
            style: TagStyle::default(),
        }
    }

    #[must_use]
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.field_index.get(id).and_then(|&i| self.fields.get(i))
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&FieldGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Push a field and index it
    pub fn push_field(&mut self, field: Field) {
        self.field_index.insert(field.id.clone(), self.fields.len());
        self.fields.push(field);
    }

    /// Rebuild `field_index` from `fields`
    pub fn reindex(&mut self) {
        self.field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();
    }

    /// All doc blocks in document order
    #[must_use]
    pub fn doc_blocks(&self) -> Vec<&DocBlock> {
        fn collect<'a>(nodes: &'a [BodyNode], out: &mut Vec<&'a DocBlock>) {
            for node in nodes {
                match node {
                    BodyNode::Doc(doc) => out.push(doc),
                    BodyNode::Group { body, .. } => collect(body, out),
                    _ => {}
                }
            }
        }

        let mut docs = Vec::new();
        collect(&self.body, &mut docs);
        docs
    }
}
