//! Canonical Markform markup writer
//!
//! Output is deterministic: attributes in a fixed order, one blank line between
//! blocks, notes after the body, values in `value` fences. Parsing the output gives
//! back an equal form.

use std::collections::HashMap;

use tracing::debug;

use crate::document::AttrValue;
use crate::error::{SerializeError, SerializeResult};
use crate::formats::FormWriter;
use crate::models::schema::{DEFAULT_DATE_FORMAT, DEFAULT_YEAR_MAX, DEFAULT_YEAR_MIN};
use crate::models::{
    BodyNode, CheckboxMode, CheckboxState, DEFAULT_ROLE, DocBlock, Field, FieldAttrs,
    FieldResponse, IMPLICIT_CHECKBOXES_ID, ImplicitCheckbox, Note, ParsedForm, Priority,
    ResponseState, TagStyle,
};
use crate::parser::parser_for;
use crate::parser::parsers::checkboxes::{id_annotation, option_states};
use crate::parser::parsers::table::column_attributes;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Tag syntax to write; the document's own syntax when unset
    pub style: Option<TagStyle>,
}

/// Serialize a form in the tag syntax it was parsed from
///
/// # Errors
///
/// Returns an error when frontmatter cannot be written or a table cell holds text
/// that cannot be written inside a row
pub fn serialize(form: &ParsedForm) -> SerializeResult<String> {
    serialize_with(form, SerializeOptions::default())
}

/// Serialize a form with explicit options
///
/// # Errors
///
/// See [`serialize`]
pub fn serialize_with(form: &ParsedForm, options: SerializeOptions) -> SerializeResult<String> {
    let writer = Writer::new(form, options.style.unwrap_or(form.schema.style));
    let mut out = String::new();

    if let Some(metadata) = &form.metadata {
        let yaml = serde_yaml::to_string(metadata)
            .map_err(|e| SerializeError::Frontmatter(e.to_string()))?;
        out.push_str("---\n");
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("---\n\n");
    }

    if let Some(leading) = form.leading.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str(leading);
        out.push_str("\n\n");
    }

    let mut blocks = writer.body(&form.schema.body, None)?;
    blocks.extend(form.notes.iter().map(|note| Block::Text(writer.note(note))));

    let mut form_attrs = vec![("id".to_string(), AttrValue::from(form.schema.id.as_str()))];
    if let Some(title) = &form.schema.title {
        form_attrs.push(("title".to_string(), AttrValue::from(title.as_str())));
    }
    form_attrs.extend(form.schema.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    out.push_str(&writer.open("form", &form_attrs));
    out.push_str("\n\n");
    if !blocks.is_empty() {
        out.push_str(&join_blocks(&blocks));
        out.push_str("\n\n");
    }
    out.push_str(&writer.close("form"));
    out.push('\n');

    if let Some(trailing) = form.trailing.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        out.push('\n');
        out.push_str(trailing);
        out.push('\n');
    }

    debug!(form = %form.schema.id, bytes = out.len(), "serialized form");
    Ok(out)
}

/// A rendered body element; adjacent checkbox items stay on consecutive lines
enum Block {
    Text(String),
    Item(String),
}

fn join_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_item = false;
    for (i, block) in blocks.iter().enumerate() {
        let (text, item) = match block {
            Block::Text(text) => (text, false),
            Block::Item(text) => (text, true),
        };
        if i > 0 {
            out.push_str(if item && previous_item { "\n" } else { "\n\n" });
        }
        out.push_str(text);
        previous_item = item;
    }
    out
}

struct Writer<'a> {
    form: &'a ParsedForm,
    style: TagStyle,
    /// Marker state of every implicit checkbox
    implicit: HashMap<String, CheckboxState>,
}

impl<'a> Writer<'a> {
    fn new(form: &'a ParsedForm, style: TagStyle) -> Self {
        let implicit = form
            .field(IMPLICIT_CHECKBOXES_ID)
            .map(|field| {
                option_states(field, &form.response(IMPLICIT_CHECKBOXES_ID))
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        Self {
            form,
            style,
            implicit,
        }
    }

    fn open(&self, name: &str, attrs: &[(String, AttrValue)]) -> String {
        let mut inner = name.to_string();
        for (key, value) in attrs {
            inner.push(' ');
            inner.push_str(key);
            inner.push('=');
            inner.push_str(&value.to_string());
        }
        match self.style {
            TagStyle::Bracket => format!("{{% {inner} %}}"),
            TagStyle::Comment => format!("<!-- {inner} -->"),
        }
    }

    fn close(&self, name: &str) -> String {
        match self.style {
            TagStyle::Bracket => format!("{{% /{name} %}}"),
            TagStyle::Comment => format!("<!-- /{name} -->"),
        }
    }

    /// Tag pair around body lines; an empty body keeps both tags on one line
    fn wrap(&self, name: &str, attrs: &[(String, AttrValue)], body: &str) -> String {
        if body.is_empty() {
            format!("{}{}", self.open(name, attrs), self.close(name))
        } else {
            format!("{}\n{body}\n{}", self.open(name, attrs), self.close(name))
        }
    }

    fn body(&self, nodes: &[BodyNode], group: Option<&str>) -> SerializeResult<Vec<Block>> {
        let mut blocks = Vec::with_capacity(nodes.len());
        for node in nodes {
            let block = match node {
                BodyNode::Markdown { text } => Block::Text(text.clone()),
                BodyNode::Doc(doc) => Block::Text(self.doc(doc, group)),
                BodyNode::Field { id } => match self.form.field(id) {
                    Some(field) => Block::Text(self.field(field, &self.form.response(id))?),
                    None => continue,
                },
                BodyNode::Group { id, body } => Block::Text(self.group(id, body)?),
                BodyNode::Checkbox(item) => Block::Item(self.checkbox(item)),
            };
            blocks.push(block);
        }
        Ok(blocks)
    }

    fn group(&self, id: &str, body: &[BodyNode]) -> SerializeResult<String> {
        let mut attrs = vec![("id".to_string(), AttrValue::from(id))];
        if let Some(group) = self.form.schema.group(id) {
            if let Some(title) = &group.title {
                attrs.push(("title".to_string(), AttrValue::from(title.as_str())));
            }
            attrs.extend(group.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let inner = join_blocks(&self.body(body, Some(id))?);
        if inner.is_empty() {
            return Ok(self.wrap("field-group", &attrs, ""));
        }
        Ok(format!(
            "{}\n\n{inner}\n\n{}",
            self.open("field-group", &attrs),
            self.close("field-group")
        ))
    }

    fn doc(&self, doc: &DocBlock, group: Option<&str>) -> String {
        let owner = group.unwrap_or(&self.form.schema.id);
        let attrs = if doc.reference == owner {
            Vec::new()
        } else {
            vec![("ref".to_string(), AttrValue::from(doc.reference.as_str()))]
        };
        self.wrap(doc.tag.tag_name(), &attrs, &doc.body)
    }

    fn field(&self, field: &Field, response: &FieldResponse) -> SerializeResult<String> {
        let lines = parser_for(field.kind().syntax()).render(field, response, self.style)?;
        Ok(self.wrap("field", &field_attributes(field, response), &lines.join("\n")))
    }

    fn checkbox(&self, item: &ImplicitCheckbox) -> String {
        let marker = self
            .implicit
            .get(&item.option_id)
            .copied()
            .unwrap_or(CheckboxState::Todo)
            .marker();
        let label = self
            .form
            .field(IMPLICIT_CHECKBOXES_ID)
            .and_then(|f| f.option(&item.option_id))
            .map_or(item.option_id.as_str(), |o| o.label.as_str());
        let mut line = format!("{}{} [{marker}] {label}", item.indent, item.bullet);
        if item.annotated {
            line.push(' ');
            line.push_str(&id_annotation(&item.option_id, self.style));
        }
        line
    }

    fn note(&self, note: &Note) -> String {
        let mut attrs = vec![
            ("id".to_string(), AttrValue::from(note.id.as_str())),
            ("ref".to_string(), AttrValue::from(note.reference.as_str())),
        ];
        if note.role != DEFAULT_ROLE {
            attrs.push(("role".to_string(), AttrValue::from(note.role.as_str())));
        }
        if let Some(state) = note.state {
            attrs.push(("state".to_string(), AttrValue::from(state.as_str())));
        }
        self.wrap("note", &attrs, &note.text)
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> AttrValue {
    AttrValue::Number(n as f64)
}

/// Field tag attributes in canonical order
fn field_attributes(field: &Field, response: &FieldResponse) -> Vec<(String, AttrValue)> {
    let mut attrs: Vec<(&str, AttrValue)> = vec![
        ("kind", AttrValue::from(field.kind().as_str())),
        ("id", AttrValue::from(field.id.as_str())),
        ("label", AttrValue::from(field.label.as_str())),
    ];
    if field.required {
        attrs.push(("required", AttrValue::Bool(true)));
    }
    if field.role != DEFAULT_ROLE {
        attrs.push(("role", AttrValue::from(field.role.as_str())));
    }
    if field.priority != Priority::default() {
        attrs.push(("priority", AttrValue::from(field.priority.as_str())));
    }
    if let Some(placeholder) = &field.placeholder {
        attrs.push(("placeholder", AttrValue::from(placeholder.as_str())));
    }
    if matches!(response.state, ResponseState::Skipped | ResponseState::Aborted) {
        attrs.push(("state", AttrValue::from(response.state.as_str())));
    }

    let mut optional = |name: &'static str, value: Option<AttrValue>| {
        if let Some(value) = value {
            attrs.push((name, value));
        }
    };
    match &field.attrs {
        FieldAttrs::String {
            min_length,
            max_length,
            pattern,
        } => {
            optional("minLength", min_length.map(count));
            optional("maxLength", max_length.map(count));
            optional("pattern", pattern.as_deref().map(AttrValue::from));
        }
        FieldAttrs::Number { min, max, integer } => {
            optional("min", min.map(AttrValue::Number));
            optional("max", max.map(AttrValue::Number));
            optional("integer", integer.then_some(AttrValue::Bool(true)));
        }
        FieldAttrs::StringList(list) | FieldAttrs::UrlList(list) => {
            optional("minItems", list.min_items.map(count));
            optional("maxItems", list.max_items.map(count));
            optional("uniqueItems", list.unique_items.then_some(AttrValue::Bool(true)));
        }
        FieldAttrs::Url | FieldAttrs::SingleSelect { .. } => {}
        FieldAttrs::Date { format, min, max } => {
            optional(
                "format",
                (format != DEFAULT_DATE_FORMAT).then(|| AttrValue::from(format.as_str())),
            );
            optional("min", min.as_deref().map(AttrValue::from));
            optional("max", max.as_deref().map(AttrValue::from));
        }
        FieldAttrs::Year { min, max } => {
            optional(
                "min",
                (*min != DEFAULT_YEAR_MIN).then(|| AttrValue::Number(f64::from(*min))),
            );
            optional(
                "max",
                (*max != DEFAULT_YEAR_MAX).then(|| AttrValue::Number(f64::from(*max))),
            );
        }
        FieldAttrs::Checkboxes { mode, .. } => {
            optional(
                "checkboxMode",
                (*mode != CheckboxMode::default())
                    .then(|| AttrValue::from(mode.as_str())),
            );
        }
        FieldAttrs::MultiSelect {
            min_selections,
            max_selections,
            ..
        } => {
            optional("minSelections", min_selections.map(count));
            optional("maxSelections", max_selections.map(count));
        }
        FieldAttrs::Table {
            columns,
            min_rows,
            max_rows,
        } => {
            for (name, value) in column_attributes(columns) {
                optional(name, Some(value));
            }
            optional("minRows", min_rows.map(count));
            optional("maxRows", max_rows.map(count));
        }
    }

    attrs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .chain(field.extra.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
}

/// Markform markup writer
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkformWriter {
    options: SerializeOptions,
}

impl MarkformWriter {
    #[must_use]
    pub const fn new(options: SerializeOptions) -> Self {
        Self { options }
    }
}

impl FormWriter for MarkformWriter {
    fn name(&self) -> &'static str {
        match self.options.style {
            None => "markform",
            Some(TagStyle::Bracket) => "markform-bracket",
            Some(TagStyle::Comment) => "markform-comment",
        }
    }

    fn write(&self, form: &ParsedForm) -> SerializeResult<String> {
        serialize_with(form, self.options)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::parser::parse;

    const MOVIE: &str = r#"---
markform:
  spec: MF/0.1
  title: Movie night
---

# Movie night

{% form id="movie" title="Movie night" %}

{% instructions %}
Fill in what you know.
{% /instructions %}

{% field-group id="basics" title="Basics" %}

{% field kind="string" id="title" label="Title" required=true maxLength=80 %}
```value
The Thing
```
{% /field %}

{% field kind="year" id="released" label="Released" state="skipped" %}{% /field %}

{% field kind="single_select" id="genre" label="Genre" %}
- [ ] Horror {% #horror %}
- [x] Comedy {% #comedy %}
{% /field %}

{% /field-group %}

{% field kind="table" id="cast" label="Cast" columnIds=["name", "role"] columnTypes=["string", "string"] %}
| name | role |
| --- | --- |
| Kurt Russell | MacReady |
| Keith David | %SKIP% (uncredited) |
{% /field %}

{% note id="n1" ref="released" state="skipped" %}
Not listed anywhere.
{% /note %}

{% /form %}
"#;

    #[test]
    fn reparses_to_an_equal_form() {
        let form = parse(MOVIE).unwrap();
        let text = serialize(&form).unwrap();
        assert_eq!(parse(&text).unwrap(), form);
    }

    #[test]
    fn canonical_output_is_stable() {
        let once = serialize(&parse(MOVIE).unwrap()).unwrap();
        let twice = serialize(&parse(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn attributes_come_in_canonical_order() {
        let form = parse(MOVIE).unwrap();
        let text = serialize(&form).unwrap();
        assert!(text.contains(
            r#"{% field kind="string" id="title" label="Title" required=true maxLength=80 %}"#
        ));
        assert!(text.contains(
            r#"{% field kind="year" id="released" label="Released" state="skipped" %}{% /field %}"#
        ));
    }

    #[rstest]
    #[case(TagStyle::Bracket, "{% /form %}")]
    #[case(TagStyle::Comment, "<!-- /form -->")]
    fn writes_the_requested_syntax(#[case] style: TagStyle, #[case] close: &str) {
        let form = parse(MOVIE).unwrap();
        let text = serialize_with(&form, SerializeOptions { style: Some(style) }).unwrap();
        assert!(text.contains(close));
        assert_eq!(parse(&text).unwrap().responses_by_field_id, form.responses_by_field_id);
    }

    #[test]
    fn implicit_checkboxes_stay_on_adjacent_lines() {
        let text = "{% form id=\"chores\" %}\n\n- [ ] Dishes\n- [x] Laundry {% #laundry %}\n\n{% /form %}\n";
        let form = parse(text).unwrap();
        let out = serialize(&form).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn pipes_in_cells_survive() {
        let mut form = parse(MOVIE).unwrap();
        let patch: crate::patch::Patch = serde_json::from_str(
            r#"{"op":"set_table","fieldId":"cast","rows":[{"name":"A|B","role":"x"}]}"#,
        )
        .unwrap();
        let result =
            crate::patch::apply_patches(&mut form, &[patch], crate::patch::ApplyOptions::default());
        assert!(result.is_ok());
        let text = serialize(&form).unwrap();
        assert_eq!(parse(&text).unwrap(), form);
    }
}
