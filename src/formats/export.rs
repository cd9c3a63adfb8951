//! Value and schema export to JSON and YAML

use serde_json::{Map, Value, json};

use crate::error::{SerializeError, SerializeResult};
use crate::formats::FormWriter;
use crate::models::response::{ABORT_SENTINEL, SKIP_SENTINEL};
use crate::models::{
    CellResponse, CellState, Field, FieldAttrs, FieldResponse, FieldValue, ParsedForm,
    ResponseState,
};
use crate::parser::sentinel::cell_sentinel_text;

/// Shape of exported values
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// `{ "state": ..., "value": ... }` for every field and cell
    #[default]
    Structured,
    /// Bare values; skipped and aborted become `%SKIP%` / `%ABORT%`, empty becomes null
    Friendly,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExportEncoding {
    #[default]
    Json,
    Yaml,
}

/// Field values keyed by field id
#[must_use]
pub fn export_values(form: &ParsedForm, mode: ExportMode) -> Value {
    let values: Map<String, Value> = form
        .fields_in_order()
        .map(|field| (field.id.clone(), field_entry(&form.response(&field.id), mode)))
        .collect();
    Value::Object(values)
}

/// Field values as YAML
///
/// # Errors
///
/// Returns an error if YAML encoding fails
pub fn export_yaml(form: &ParsedForm, mode: ExportMode) -> SerializeResult<String> {
    serde_yaml::to_string(&export_values(form, mode))
        .map_err(|e| SerializeError::Export(e.to_string()))
}

/// Field definitions grouped the way the form lays them out
#[must_use]
pub fn export_schema(form: &ParsedForm) -> Value {
    let schema = &form.schema;
    let groups: Vec<Value> = schema
        .groups
        .iter()
        .map(|group| {
            let fields: Vec<Value> = group
                .field_ids
                .iter()
                .filter_map(|id| schema.field(id))
                .map(field_schema)
                .collect();
            let mut entry = json!({ "id": group.id, "fields": fields });
            if let Some(title) = &group.title {
                entry["title"] = json!(title);
            }
            entry
        })
        .collect();

    let mut out = json!({ "id": schema.id, "groups": groups });
    if let Some(title) = &schema.title {
        out["title"] = json!(title);
    }
    out
}

fn field_schema(field: &Field) -> Value {
    let mut entry = json!({
        "id": field.id,
        "kind": field.kind().as_str(),
        "label": field.label,
        "required": field.required,
        "role": field.role,
        "priority": field.priority.as_str(),
    });
    let options = field.attrs.options();
    if !options.is_empty() {
        entry["options"] = options
            .iter()
            .map(|o| json!({ "id": o.id, "label": o.label }))
            .collect();
    }
    if let FieldAttrs::Table { columns, .. } = &field.attrs {
        entry["columns"] = columns
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "label": c.label.as_deref().unwrap_or(&c.id),
                    "type": c.column_type.as_str(),
                })
            })
            .collect();
    }
    if let FieldAttrs::Checkboxes { mode, .. } = &field.attrs {
        entry["checkboxMode"] = json!(mode.as_str());
    }
    entry
}

fn field_entry(response: &FieldResponse, mode: ExportMode) -> Value {
    let value = response
        .value
        .as_ref()
        .filter(|_| response.is_answered())
        .map(|v| value_json(v, mode));
    match mode {
        ExportMode::Structured => {
            let mut entry = json!({ "state": response.state.as_str() });
            if let Some(value) = value {
                entry["value"] = value;
            }
            entry
        }
        ExportMode::Friendly => match response.state {
            ResponseState::Skipped => json!(SKIP_SENTINEL),
            ResponseState::Aborted => json!(ABORT_SENTINEL),
            ResponseState::Answered | ResponseState::Empty => value.unwrap_or(Value::Null),
        },
    }
}

fn value_json(value: &FieldValue, mode: ExportMode) -> Value {
    match value {
        FieldValue::String(text)
        | FieldValue::Url(text)
        | FieldValue::Date(text)
        | FieldValue::SingleSelect(text) => json!(text),
        FieldValue::Number(number) => json!(number),
        FieldValue::Year(year) => json!(year),
        FieldValue::StringList(items) | FieldValue::UrlList(items) | FieldValue::MultiSelect(items) => {
            json!(items)
        }
        FieldValue::Checkboxes(states) => states
            .iter()
            .map(|(id, state)| (id.clone(), json!(state.as_str())))
            .collect::<Map<_, _>>()
            .into(),
        FieldValue::Table(table) => table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, cell)| (column.clone(), cell_json(cell, mode)))
                    .collect::<Map<_, _>>()
                    .into()
            })
            .collect::<Vec<Value>>()
            .into(),
    }
}

fn cell_json(cell: &CellResponse, mode: ExportMode) -> Value {
    let value = cell.value.as_ref().map(crate::models::ScalarValue::to_json);
    match mode {
        ExportMode::Structured => {
            let state = match cell.state {
                CellState::Answered => "answered",
                CellState::Skipped => "skipped",
                CellState::Aborted => "aborted",
            };
            let mut entry = json!({ "state": state });
            if let Some(value) = value {
                entry["value"] = value;
            }
            if let Some(reason) = &cell.reason {
                entry["reason"] = json!(reason);
            }
            entry
        }
        ExportMode::Friendly => cell_sentinel_text(cell.state, cell.reason.as_deref())
            .map(Value::String)
            .or(value)
            .unwrap_or(Value::Null),
    }
}

/// Value export as a `FormWriter`
#[derive(Debug, Default, Clone, Copy)]
pub struct ValuesWriter {
    mode: ExportMode,
    encoding: ExportEncoding,
}

impl ValuesWriter {
    #[must_use]
    pub const fn new(mode: ExportMode, encoding: ExportEncoding) -> Self {
        Self { mode, encoding }
    }
}

impl FormWriter for ValuesWriter {
    fn name(&self) -> &'static str {
        match (self.encoding, self.mode) {
            (ExportEncoding::Json, ExportMode::Structured) => "json",
            (ExportEncoding::Json, ExportMode::Friendly) => "json-friendly",
            (ExportEncoding::Yaml, ExportMode::Structured) => "yaml",
            (ExportEncoding::Yaml, ExportMode::Friendly) => "yaml-friendly",
        }
    }

    fn write(&self, form: &ParsedForm) -> SerializeResult<String> {
        match self.encoding {
            ExportEncoding::Json => serde_json::to_string_pretty(&export_values(form, self.mode))
                .map_err(|e| SerializeError::Export(e.to_string())),
            ExportEncoding::Yaml => export_yaml(form, self.mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const FORM: &str = r#"{% form id="trip" %}
{% field kind="string" id="city" label="City" %}
```value
Lisbon
```
{% /field %}
{% field kind="number" id="nights" label="Nights" state="skipped" %}{% /field %}
{% field kind="date" id="leave" label="Leave" %}{% /field %}
{% field kind="table" id="stops" label="Stops" columnIds=["place", "days"] columnTypes=["string", "number"] %}
| place | days |
| --- | --- |
| Porto | %SKIP% (undecided) |
{% /field %}
{% /form %}
"#;

    #[test]
    fn structured_export_carries_states() {
        let values = export_values(&parse(FORM).unwrap(), ExportMode::Structured);
        assert_eq!(values["city"], json!({ "state": "answered", "value": "Lisbon" }));
        assert_eq!(values["nights"], json!({ "state": "skipped" }));
        assert_eq!(values["leave"], json!({ "state": "empty" }));
        assert_eq!(
            values["stops"]["value"][0]["days"],
            json!({ "state": "skipped", "reason": "undecided" })
        );
    }

    #[test]
    fn friendly_export_uses_sentinels() {
        let values = export_values(&parse(FORM).unwrap(), ExportMode::Friendly);
        assert_eq!(values["city"], json!("Lisbon"));
        assert_eq!(values["nights"], json!("%SKIP%"));
        assert_eq!(values["leave"], Value::Null);
        assert_eq!(values["stops"][0]["place"], json!("Porto"));
        assert_eq!(values["stops"][0]["days"], json!("%SKIP% (undecided)"));
    }

    #[test]
    fn yaml_export_parses_back() {
        let yaml = export_yaml(&parse(FORM).unwrap(), ExportMode::Friendly).unwrap();
        let back: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back["city"], json!("Lisbon"));
    }

    #[test]
    fn schema_lists_columns() {
        let schema = export_schema(&parse(FORM).unwrap());
        assert_eq!(schema["id"], json!("trip"));
        let stops = &schema["groups"][0]["fields"][3];
        assert_eq!(stops["kind"], json!("table"));
        assert_eq!(stops["columns"][1], json!({ "id": "days", "label": "days", "type": "number" }));
    }
}
