//! Schema builder: walks the tag tree into a `ParsedForm`
//!
//! Groups, fields, options, columns and notes are registered in one id index as
//! they are met, so duplicates are reported at the second occurrence. Field bodies
//! are handed to the response parser for their syntax.

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use tracing::{debug, warn};

use crate::document::{AstNode, AttrValue, Attributes, Document, TagNode};
use crate::error::{
    MarkformResult, ParseError, ParseResult, ValidationError, ValidationErrorKind,
    ValidationResult,
};
use crate::models::form::SPEC_VERSION;
use crate::models::note::sort_notes;
use crate::models::schema::{DEFAULT_DATE_FORMAT, DEFAULT_YEAR_MAX, DEFAULT_YEAR_MIN};
use crate::models::{
    is_reserved_id, is_valid_id, BodyNode, CheckboxMode, CheckboxState, DocBlock, DocTag, Field,
    FieldAttrs, FieldGroup, FieldKind, FieldOption, FieldResponse, FormMetadata, FormSchema,
    IdEntry, IdKind, ImplicitCheckbox, ListConstraints, Note, NoteState, ParsedForm, Priority,
    ResponseState, TagStyle, DEFAULT_GROUP_ID, DEFAULT_ROLE, IMPLICIT_CHECKBOXES_ID,
};
use crate::validate::date_format;

use super::interface::{is_field_tag, parser_for};
use super::parsers::checkboxes::{scan_item, value_from_states, CheckboxItem};

/// Attributes every field tag understands
const FIELD_ATTRS: [&str; 8] = [
    "kind",
    "id",
    "label",
    "required",
    "role",
    "priority",
    "placeholder",
    "state",
];

/// Kind-specific attributes, consumed by `kind_attrs`
const fn kind_attr_names(kind: FieldKind) -> &'static [&'static str] {
    match kind {
        FieldKind::String => &["minLength", "maxLength", "pattern"],
        FieldKind::Number => &["min", "max", "integer"],
        FieldKind::StringList | FieldKind::UrlList => &["minItems", "maxItems", "uniqueItems"],
        FieldKind::Url | FieldKind::SingleSelect => &[],
        FieldKind::Date => &["format", "min", "max"],
        FieldKind::Year => &["min", "max"],
        FieldKind::Checkboxes => &["checkboxMode"],
        FieldKind::MultiSelect => &["minSelections", "maxSelections"],
        FieldKind::Table => &["columnIds", "columnLabels", "columnTypes", "minRows", "maxRows"],
    }
}

/// Build a parsed form from a document tree
///
/// # Errors
///
/// Returns a parse error for invalid frontmatter or a missing or repeated form tag,
/// and a validation error for the first semantic problem met while walking the form
pub fn build_form(document: &Document) -> MarkformResult<ParsedForm> {
    let metadata = document
        .frontmatter
        .as_ref()
        .map(|(yaml, line)| parse_metadata(yaml, *line))
        .transpose()?;

    let mut form: Option<&TagNode> = None;
    let mut leading = Vec::new();
    let mut trailing = Vec::new();
    for node in &document.children {
        match node {
            AstNode::Tag(tag) if tag.name == "form" => {
                if form.is_some() {
                    return Err(ParseError::at(
                        tag.position.line,
                        tag.position.column,
                        "A document may contain only one form tag",
                    )
                    .into());
                }
                form = Some(tag);
            }
            AstNode::Tag(tag) => {
                return Err(ValidationError::unexpected_content(
                    tag.attrs.str("id").unwrap_or(&tag.name),
                    format!(
                        "Tag '{}' at line {} must be inside the form",
                        tag.name, tag.position.line
                    ),
                )
                .into());
            }
            other if form.is_some() => trailing.push(other),
            other => leading.push(other),
        }
    }
    let form = form.ok_or_else(|| ParseError::at_line(1, "Document has no form tag"))?;

    let mut builder = SchemaBuilder::new(form)?;
    builder.schema.body = builder.walk(&form.children, None)?;
    let parsed = builder.finish(
        metadata,
        markdown_of(&leading),
        markdown_of(&trailing),
        document.style,
    )?;

    debug!(
        form = %parsed.schema.id,
        groups = parsed.schema.groups.len(),
        fields = parsed.schema.fields.len(),
        notes = parsed.notes.len(),
        "built form"
    );
    Ok(parsed)
}

fn parse_metadata(yaml: &str, line: usize) -> ParseResult<FormMetadata> {
    if yaml.trim().is_empty() {
        return Ok(FormMetadata::default());
    }
    let metadata: FormMetadata = serde_yaml::from_str(yaml).map_err(|e| {
        let at = e.location().map_or(line, |loc| line + loc.line().saturating_sub(1));
        ParseError::at_line(at, format!("Invalid frontmatter: {e}"))
    })?;
    if metadata.markform.spec != SPEC_VERSION {
        warn!(
            spec = %metadata.markform.spec,
            supported = SPEC_VERSION,
            "unknown markform spec version"
        );
    }
    Ok(metadata)
}

/// Markdown text of nodes outside any tag, trimmed
fn markdown_of(nodes: &[&AstNode]) -> Option<String> {
    let text = nodes
        .iter()
        .filter_map(|node| match node {
            AstNode::Text(line) => Some(line.text.clone()),
            AstNode::Fence(fence) => Some(fence.to_markdown()),
            AstNode::Tag(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Id derived from a checkbox label: lowercase words joined by `_`
#[must_use]
pub fn slugify(label: &str) -> String {
    let mut slug = String::new();
    let mut gap = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('_');
            }
            gap = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    if slug.is_empty() {
        "item".to_string()
    } else if slug.starts_with(|c: char| c.is_ascii_digit()) {
        format!("item_{slug}")
    } else {
        slug
    }
}

struct ImplicitItem {
    option: FieldOption,
    state: CheckboxState,
}

struct SchemaBuilder {
    schema: FormSchema,
    responses: HashMap<String, FieldResponse>,
    notes: Vec<Note>,
    id_index: HashMap<String, IdEntry>,
    order: Vec<String>,
    implicit: Vec<ImplicitItem>,
    implicit_ids: HashSet<String>,
}

impl SchemaBuilder {
    fn new(form: &TagNode) -> ValidationResult<Self> {
        let mut builder = Self {
            schema: FormSchema::new(String::new()),
            responses: HashMap::new(),
            notes: Vec::new(),
            id_index: HashMap::new(),
            order: Vec::new(),
            implicit: Vec::new(),
            implicit_ids: HashSet::new(),
        };
        let id = builder.element_id(
            form,
            IdEntry {
                kind: IdKind::Form,
                field_kind: None,
                parent: None,
            },
        )?;
        builder.schema.title = opt_str(&form.attrs, "title", &id)?;
        builder.schema.extra = extra_attrs(&form.attrs, &[&["id", "title"]]);
        builder.schema.id = id;
        Ok(builder)
    }

    fn register(&mut self, key: String, entry: IdEntry) -> ValidationResult<()> {
        if self.id_index.contains_key(&key) {
            return Err(ValidationError::duplicate_id(&key));
        }
        self.id_index.insert(key, entry);
        Ok(())
    }

    /// Read, check and register the `id` attribute of a tag
    fn element_id(&mut self, tag: &TagNode, entry: IdEntry) -> ValidationResult<String> {
        let id = match tag.attrs.get("id") {
            Some(AttrValue::String(id)) => id.clone(),
            Some(other) => {
                return Err(ValidationError::invalid_attribute(
                    &tag.name,
                    format!("'id' must be a string, found {other}"),
                ));
            }
            None => {
                return Err(ValidationError::missing_attribute(
                    format!("{} (line {})", tag.name, tag.position.line),
                    "id",
                ));
            }
        };
        if is_reserved_id(&id) {
            return Err(ValidationError::reserved_id(&id));
        }
        if !is_valid_id(&id) {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidId,
                &id,
                format!("'{id}' is not a valid id"),
            ));
        }
        self.register(id.clone(), entry)?;
        Ok(id)
    }

    fn ensure_default_group(&mut self) -> ValidationResult<()> {
        if self.schema.group(DEFAULT_GROUP_ID).is_none() {
            self.register(
                DEFAULT_GROUP_ID.to_string(),
                IdEntry {
                    kind: IdKind::Group,
                    field_kind: None,
                    parent: Some(self.schema.id.clone()),
                },
            )?;
            self.schema.groups.push(FieldGroup {
                id: DEFAULT_GROUP_ID.to_string(),
                title: None,
                field_ids: Vec::new(),
                implicit: true,
                extra: BTreeMap::new(),
            });
        }
        Ok(())
    }

    fn walk(&mut self, children: &[AstNode], group: Option<&str>) -> ValidationResult<Vec<BodyNode>> {
        let mut body = Vec::new();
        let mut prose: Vec<String> = Vec::new();

        for child in children {
            match child {
                AstNode::Text(line) => match scan_item(&line.text) {
                    Some(item) => {
                        flush_prose(&mut prose, &mut body);
                        body.push(self.implicit_checkbox(item, line.line)?);
                    }
                    None => prose.push(line.text.clone()),
                },
                AstNode::Fence(fence) => prose.push(fence.to_markdown()),
                AstNode::Tag(tag) if tag.name == "note" => self.note(tag)?,
                AstNode::Tag(tag) => {
                    flush_prose(&mut prose, &mut body);
                    body.push(self.tag(tag, group)?);
                }
            }
        }
        flush_prose(&mut prose, &mut body);
        Ok(body)
    }

    fn tag(&mut self, tag: &TagNode, group: Option<&str>) -> ValidationResult<BodyNode> {
        match tag.name.as_str() {
            "field-group" | "group" => match group {
                Some(parent) => Err(ValidationError::new(
                    ValidationErrorKind::NestedGroup,
                    tag.attrs.str("id").unwrap_or(parent),
                    format!(
                        "Group at line {} is nested inside group '{parent}'; groups cannot be nested",
                        tag.position.line
                    ),
                )),
                None => self.group(tag),
            },
            name if is_field_tag(name) => self.field(tag, group),
            "form" => Err(ValidationError::unexpected_content(
                &self.schema.id,
                format!("Form tag at line {} is nested inside a form", tag.position.line),
            )),
            name => match DocTag::from_tag_name(name) {
                Some(doc) => Ok(BodyNode::Doc(self.doc_block(tag, doc, group)?)),
                None => Err(ValidationError::unexpected_content(
                    &self.schema.id,
                    format!("Tag '{name}' at line {} is not allowed here", tag.position.line),
                )),
            },
        }
    }

    fn group(&mut self, tag: &TagNode) -> ValidationResult<BodyNode> {
        let id = self.element_id(
            tag,
            IdEntry {
                kind: IdKind::Group,
                field_kind: None,
                parent: Some(self.schema.id.clone()),
            },
        )?;
        self.schema.groups.push(FieldGroup {
            id: id.clone(),
            title: opt_str(&tag.attrs, "title", &id)?,
            field_ids: Vec::new(),
            implicit: false,
            extra: extra_attrs(&tag.attrs, &[&["id", "title"]]),
        });
        let body = self.walk(&tag.children, Some(&id))?;
        Ok(BodyNode::Group { id, body })
    }

    fn field(&mut self, tag: &TagNode, group: Option<&str>) -> ValidationResult<BodyNode> {
        let kind = field_kind(tag)?;
        let group_id = match group {
            Some(group) => group.to_string(),
            None => {
                self.ensure_default_group()?;
                DEFAULT_GROUP_ID.to_string()
            }
        };
        let id = self.element_id(
            tag,
            IdEntry {
                kind: IdKind::Field,
                field_kind: Some(kind),
                parent: Some(group_id.clone()),
            },
        )?;

        let attrs = &tag.attrs;
        let priority = match opt_str(attrs, "priority", &id)? {
            Some(name) => Priority::from_name(&name).ok_or_else(|| {
                ValidationError::invalid_attribute(
                    &id,
                    format!("priority must be high, medium or low, found '{name}'"),
                )
            })?,
            None => Priority::default(),
        };
        let declared = match opt_str(attrs, "state", &id)?.as_deref() {
            None => None,
            Some("skipped") => Some(ResponseState::Skipped),
            Some("aborted") => Some(ResponseState::Aborted),
            Some(other) => {
                return Err(ValidationError::invalid_attribute(
                    &id,
                    format!("state must be skipped or aborted, found '{other}'"),
                ));
            }
        };

        let mut field = Field {
            label: opt_str(attrs, "label", &id)?.unwrap_or_else(|| id.clone()),
            required: opt_bool(attrs, "required", &id)?.unwrap_or(false),
            role: opt_str(attrs, "role", &id)?.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            priority,
            placeholder: opt_str(attrs, "placeholder", &id)?,
            attrs: kind_attrs(kind, attrs, &id)?,
            group_id: group_id.clone(),
            extra: extra_attrs(attrs, &[&FIELD_ATTRS, kind_attr_names(kind)]),
            id: id.clone(),
        };
        let response = parser_for(kind.syntax()).parse(tag, &mut field, declared)?;

        let children = field
            .attrs
            .options()
            .iter()
            .map(|o| (o.id.clone(), IdKind::Option))
            .chain(
                field
                    .attrs
                    .columns()
                    .iter()
                    .map(|c| (c.id.clone(), IdKind::Column)),
            )
            .collect::<Vec<_>>();
        for (child, child_kind) in children {
            self.register(
                format!("{id}.{child}"),
                IdEntry {
                    kind: child_kind,
                    field_kind: Some(kind),
                    parent: Some(id.clone()),
                },
            )?;
        }

        if let Some(group) = self.schema.groups.iter_mut().find(|g| g.id == group_id) {
            group.field_ids.push(id.clone());
        }
        self.order.push(id.clone());
        self.responses.insert(id.clone(), response);
        self.schema.push_field(field);
        Ok(BodyNode::Field { id })
    }

    fn implicit_checkbox(&mut self, item: CheckboxItem, line: usize) -> ValidationResult<BodyNode> {
        let annotated = item.id.is_some();
        let id = match item.id {
            Some(id) => {
                let reference = format!("{IMPLICIT_CHECKBOXES_ID}.{id}");
                if !is_valid_id(&id) {
                    return Err(ValidationError::new(
                        ValidationErrorKind::InvalidId,
                        reference,
                        format!("'{id}' is not a valid option id"),
                    ));
                }
                if self.implicit_ids.contains(&id) {
                    return Err(ValidationError::duplicate_id(&reference));
                }
                id
            }
            None => {
                let base = slugify(&item.label);
                let mut candidate = base.clone();
                let mut n = 2;
                while self.implicit_ids.contains(&candidate) {
                    candidate = format!("{base}_{n}");
                    n += 1;
                }
                candidate
            }
        };

        let state = CheckboxState::from_marker(item.marker, CheckboxMode::Multi).ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::InvalidOption,
                format!("{IMPLICIT_CHECKBOXES_ID}.{id}"),
                format!("Marker '[{}]' at line {line} is not a checkbox marker", item.marker),
            )
        })?;

        self.implicit_ids.insert(id.clone());
        self.implicit.push(ImplicitItem {
            option: FieldOption {
                id: id.clone(),
                label: item.label,
            },
            state,
        });
        Ok(BodyNode::Checkbox(ImplicitCheckbox {
            option_id: id,
            indent: item.indent,
            bullet: item.bullet,
            annotated,
        }))
    }

    fn note(&mut self, tag: &TagNode) -> ValidationResult<()> {
        let id = self.element_id(
            tag,
            IdEntry {
                kind: IdKind::Note,
                field_kind: None,
                parent: None,
            },
        )?;
        let reference =
            opt_str(&tag.attrs, "ref", &id)?.ok_or_else(|| ValidationError::missing_attribute(&id, "ref"))?;
        let state = match opt_str(&tag.attrs, "state", &id)? {
            Some(name) => Some(NoteState::from_name(&name).ok_or_else(|| {
                ValidationError::invalid_attribute(
                    &id,
                    format!("Note state must be skipped or aborted, found '{name}'"),
                )
            })?),
            None => None,
        };
        warn_dropped(&tag.attrs, &["id", "ref", "role", "state"], &id);

        self.notes.push(Note {
            role: opt_str(&tag.attrs, "role", &id)?.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            text: body_text(tag, &id)?,
            id,
            reference,
            state,
        });
        Ok(())
    }

    fn doc_block(&self, tag: &TagNode, doc: DocTag, group: Option<&str>) -> ValidationResult<DocBlock> {
        let owner = group.unwrap_or(&self.schema.id);
        let reference = opt_str(&tag.attrs, "ref", owner)?.unwrap_or_else(|| owner.to_string());
        warn_dropped(&tag.attrs, &["ref"], &reference);
        Ok(DocBlock {
            tag: doc,
            body: body_text(tag, &reference)?,
            reference,
        })
    }

    fn synthesize_checkboxes(&mut self) -> ValidationResult<()> {
        if !self.schema.fields.is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::MixedCheckboxMode,
                IMPLICIT_CHECKBOXES_ID,
                "Form mixes field tags with checkboxes outside any field; choose one mode",
            ));
        }

        let (options, states): (Vec<FieldOption>, Vec<(String, CheckboxState)>) = self
            .implicit
            .drain(..)
            .map(|item| {
                let state = (item.option.id.clone(), item.state);
                (item.option, state)
            })
            .unzip();
        let field = Field {
            id: IMPLICIT_CHECKBOXES_ID.to_string(),
            label: "Checkboxes".to_string(),
            required: false,
            role: DEFAULT_ROLE.to_string(),
            priority: Priority::default(),
            placeholder: None,
            attrs: FieldAttrs::Checkboxes {
                mode: CheckboxMode::Multi,
                options,
            },
            group_id: DEFAULT_GROUP_ID.to_string(),
            extra: BTreeMap::new(),
        };
        let response = value_from_states(&field, &states)?
            .map_or_else(FieldResponse::empty, FieldResponse::answered);

        self.ensure_default_group()?;
        self.register(
            field.id.clone(),
            IdEntry {
                kind: IdKind::Field,
                field_kind: Some(FieldKind::Checkboxes),
                parent: Some(DEFAULT_GROUP_ID.to_string()),
            },
        )?;
        for (option_id, _) in &states {
            self.register(
                format!("{IMPLICIT_CHECKBOXES_ID}.{option_id}"),
                IdEntry {
                    kind: IdKind::Option,
                    field_kind: Some(FieldKind::Checkboxes),
                    parent: Some(field.id.clone()),
                },
            )?;
        }
        if let Some(group) = self
            .schema
            .groups
            .iter_mut()
            .find(|g| g.id == DEFAULT_GROUP_ID)
        {
            group.field_ids.push(field.id.clone());
        }
        self.order.push(field.id.clone());
        self.responses.insert(field.id.clone(), response);
        self.schema.push_field(field);
        Ok(())
    }

    fn finish(
        mut self,
        metadata: Option<FormMetadata>,
        leading: Option<String>,
        trailing: Option<String>,
        style: TagStyle,
    ) -> ValidationResult<ParsedForm> {
        if !self.implicit.is_empty() {
            self.synthesize_checkboxes()?;
        }

        for doc in self.schema.doc_blocks() {
            if !self.id_index.contains_key(&doc.reference) {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidRef,
                    &doc.reference,
                    format!(
                        "{} block refers to unknown id '{}'",
                        doc.tag.tag_name(),
                        doc.reference
                    ),
                ));
            }
        }

        sort_notes(&mut self.notes);
        self.schema.style = style;
        Ok(ParsedForm {
            metadata,
            schema: self.schema,
            responses_by_field_id: self.responses,
            notes: self.notes,
            order_index: self.order,
            id_index: self.id_index,
            leading,
            trailing,
        })
    }
}

fn flush_prose(prose: &mut Vec<String>, body: &mut Vec<BodyNode>) {
    let text = prose.join("\n");
    let text = text.trim();
    if !text.is_empty() {
        body.push(BodyNode::Markdown {
            text: text.to_string(),
        });
    }
    prose.clear();
}

/// Text inside a note or doc tag; tags are not allowed there
fn body_text(tag: &TagNode, reference: &str) -> ValidationResult<String> {
    if let Some(child) = tag.child_tags().next() {
        return Err(ValidationError::unexpected_content(
            reference,
            format!(
                "Tag '{}' at line {} is not allowed inside '{}'",
                child.name, child.position.line, tag.name
            ),
        ));
    }
    let text = tag
        .children
        .iter()
        .filter_map(|child| match child {
            AstNode::Text(line) => Some(line.text.clone()),
            AstNode::Fence(fence) => Some(fence.to_markdown()),
            AstNode::Tag(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(text.trim().to_string())
}

fn field_kind(tag: &TagNode) -> ValidationResult<FieldKind> {
    let reference = tag.attrs.str("id").unwrap_or(&tag.name).to_string();
    let declared = match tag.attrs.get("kind") {
        None => None,
        Some(AttrValue::String(name)) => Some(FieldKind::from_name(name).ok_or_else(|| {
            ValidationError::invalid_attribute(&reference, format!("Unknown field kind '{name}'"))
        })?),
        Some(other) => {
            return Err(ValidationError::invalid_attribute(
                &reference,
                format!("'kind' must be a string, found {other}"),
            ));
        }
    };

    match (FieldKind::from_legacy_tag(&tag.name), declared) {
        (Some(from_tag), Some(kind)) if from_tag != kind => Err(ValidationError::invalid_attribute(
            &reference,
            format!("Tag '{}' cannot declare kind=\"{kind}\"", tag.name),
        )),
        (Some(kind), _) | (None, Some(kind)) => Ok(kind),
        (None, None) => Err(ValidationError::missing_attribute(reference, "kind")),
    }
}

fn kind_attrs(kind: FieldKind, attrs: &Attributes, id: &str) -> ValidationResult<FieldAttrs> {
    let list = || -> ValidationResult<ListConstraints> {
        Ok(ListConstraints {
            min_items: opt_usize(attrs, "minItems", id)?,
            max_items: opt_usize(attrs, "maxItems", id)?,
            unique_items: opt_bool(attrs, "uniqueItems", id)?.unwrap_or(false),
        })
    };

    let field_attrs = match kind {
        FieldKind::String => {
            let pattern = opt_str(attrs, "pattern", id)?;
            if let Some(pattern) = &pattern {
                Regex::new(pattern).map_err(|e| {
                    ValidationError::invalid_attribute(id, format!("Invalid pattern: {e}"))
                })?;
            }
            FieldAttrs::String {
                min_length: opt_usize(attrs, "minLength", id)?,
                max_length: opt_usize(attrs, "maxLength", id)?,
                pattern,
            }
        }
        FieldKind::Number => FieldAttrs::Number {
            min: opt_f64(attrs, "min", id)?,
            max: opt_f64(attrs, "max", id)?,
            integer: opt_bool(attrs, "integer", id)?.unwrap_or(false),
        },
        FieldKind::StringList => FieldAttrs::StringList(list()?),
        FieldKind::Url => FieldAttrs::Url,
        FieldKind::UrlList => FieldAttrs::UrlList(list()?),
        FieldKind::Date => {
            let format =
                opt_str(attrs, "format", id)?.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
            let description = date_format(&format).ok_or_else(|| {
                ValidationError::invalid_attribute(id, format!("Unsupported date format '{format}'"))
            })?;
            let bound = |name: &str| -> ValidationResult<Option<String>> {
                let value = opt_str(attrs, name, id)?;
                if let Some(value) = &value
                    && time::Date::parse(value, description).is_err()
                {
                    return Err(ValidationError::invalid_attribute(
                        id,
                        format!("{name}=\"{value}\" does not match format {format}"),
                    ));
                }
                Ok(value)
            };
            FieldAttrs::Date {
                min: bound("min")?,
                max: bound("max")?,
                format,
            }
        }
        FieldKind::Year => FieldAttrs::Year {
            min: opt_i32(attrs, "min", id)?.unwrap_or(DEFAULT_YEAR_MIN),
            max: opt_i32(attrs, "max", id)?.unwrap_or(DEFAULT_YEAR_MAX),
        },
        FieldKind::Checkboxes => FieldAttrs::Checkboxes {
            mode: match opt_str(attrs, "checkboxMode", id)? {
                Some(name) => CheckboxMode::from_name(&name).ok_or_else(|| {
                    ValidationError::invalid_attribute(
                        id,
                        format!("checkboxMode must be multi, simple or explicit, found '{name}'"),
                    )
                })?,
                None => CheckboxMode::default(),
            },
            options: Vec::new(),
        },
        FieldKind::SingleSelect => FieldAttrs::SingleSelect {
            options: Vec::new(),
        },
        FieldKind::MultiSelect => FieldAttrs::MultiSelect {
            options: Vec::new(),
            min_selections: opt_usize(attrs, "minSelections", id)?,
            max_selections: opt_usize(attrs, "maxSelections", id)?,
        },
        FieldKind::Table => FieldAttrs::Table {
            columns: Vec::new(),
            min_rows: opt_usize(attrs, "minRows", id)?,
            max_rows: opt_usize(attrs, "maxRows", id)?,
        },
    };
    Ok(field_attrs)
}

fn extra_attrs(attrs: &Attributes, known: &[&[&str]]) -> BTreeMap<String, AttrValue> {
    attrs
        .iter()
        .filter(|(name, _)| !known.iter().any(|set| set.contains(name)))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn warn_dropped(attrs: &Attributes, known: &[&str], reference: &str) {
    for (name, _) in attrs.iter().filter(|(name, _)| !known.contains(name)) {
        warn!(attribute = name, element = reference, "ignoring unknown attribute");
    }
}

fn opt_str(attrs: &Attributes, name: &str, reference: &str) -> ValidationResult<Option<String>> {
    match attrs.get(name) {
        None => Ok(None),
        Some(AttrValue::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(ValidationError::invalid_attribute(
            reference,
            format!("'{name}' must be a quoted string, found {other}"),
        )),
    }
}

fn opt_bool(attrs: &Attributes, name: &str, reference: &str) -> ValidationResult<Option<bool>> {
    match attrs.get(name) {
        None => Ok(None),
        Some(AttrValue::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(ValidationError::invalid_attribute(
            reference,
            format!("'{name}' must be true or false, found {other}"),
        )),
    }
}

fn opt_f64(attrs: &Attributes, name: &str, reference: &str) -> ValidationResult<Option<f64>> {
    match attrs.get(name) {
        None => Ok(None),
        Some(AttrValue::Number(value)) => Ok(Some(*value)),
        Some(other) => Err(ValidationError::invalid_attribute(
            reference,
            format!("'{name}' must be a number, found {other}"),
        )),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn opt_usize(attrs: &Attributes, name: &str, reference: &str) -> ValidationResult<Option<usize>> {
    match opt_f64(attrs, name, reference)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
        Some(n) => Err(ValidationError::invalid_attribute(
            reference,
            format!("'{name}' must be a non-negative integer, found {n}"),
        )),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn opt_i32(attrs: &Attributes, name: &str, reference: &str) -> ValidationResult<Option<i32>> {
    match opt_f64(attrs, name, reference)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 && n.abs() <= f64::from(i32::MAX) => Ok(Some(n as i32)),
        Some(n) => Err(ValidationError::invalid_attribute(
            reference,
            format!("'{name}' must be an integer, found {n}"),
        )),
    }
}
