//! Patch application: the only way a parsed form changes
//!
//! Each patch is checked in full before the form is touched, so a rejected patch
//! leaves the form exactly as it was and a batch can carry on past it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{PatchError, PatchErrorKind, PatchResult};
use crate::models::note::{next_note_id, sort_notes};
use crate::models::{
    CellResponse, CellState, CheckboxState, ColumnType, Field, FieldKind, FieldResponse,
    FieldValue, IdEntry, IdKind, Note, NoteState, ParsedForm, ResponseState, ScalarValue,
    TableRow, TableValue, DEFAULT_ROLE, IMPLICIT_CHECKBOXES_ID,
};
use crate::models::response::format_number;
use crate::parser::lexer::fence_marker;
use crate::parser::parsers::checkboxes::{marker_mode, option_states, value_from_states};
use crate::parser::parsers::table::coerce_cell;
use crate::parser::sentinel::is_sentinel_text;
use crate::refs::{refers_to_field, resolve_in_form};

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// One cell of a `set_table` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellInput {
    Number(f64),
    /// Text coerced to the column type; `%SKIP%` and `%ABORT%` with an optional
    /// `(reason)` are read as cell states
    Text(String),
    State {
        state: CellState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// A single change to a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Patch {
    SetString {
        field_id: String,
        value: Option<String>,
    },
    SetNumber {
        field_id: String,
        value: Option<f64>,
    },
    SetStringList {
        field_id: String,
        items: Vec<String>,
    },
    SetUrl {
        field_id: String,
        value: Option<String>,
    },
    SetUrlList {
        field_id: String,
        items: Vec<String>,
    },
    SetDate {
        field_id: String,
        value: Option<String>,
    },
    SetYear {
        field_id: String,
        value: Option<i32>,
    },
    /// Markers to change; options not listed keep their state
    SetCheckboxes {
        field_id: String,
        values: BTreeMap<String, CheckboxState>,
    },
    SetSingleSelect {
        field_id: String,
        selected: Option<String>,
    },
    SetMultiSelect {
        field_id: String,
        selected: Vec<String>,
    },
    /// Replaces every row; an empty list answers the table with zero rows
    SetTable {
        field_id: String,
        rows: Vec<BTreeMap<String, CellInput>>,
    },
    ClearField {
        field_id: String,
    },
    SkipField {
        field_id: String,
        #[serde(default = "default_role")]
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    AbortField {
        field_id: String,
        #[serde(default = "default_role")]
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    AddNote {
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default = "default_role")]
        role: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<NoteState>,
    },
    RemoveNote {
        note_id: String,
    },
    RemoveNotes {
        #[serde(rename = "ref")]
        reference: String,
        role: String,
    },
}

impl Patch {
    /// Name of the operation, as written in the `op` tag
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::SetString { .. } => "set_string",
            Self::SetNumber { .. } => "set_number",
            Self::SetStringList { .. } => "set_string_list",
            Self::SetUrl { .. } => "set_url",
            Self::SetUrlList { .. } => "set_url_list",
            Self::SetDate { .. } => "set_date",
            Self::SetYear { .. } => "set_year",
            Self::SetCheckboxes { .. } => "set_checkboxes",
            Self::SetSingleSelect { .. } => "set_single_select",
            Self::SetMultiSelect { .. } => "set_multi_select",
            Self::SetTable { .. } => "set_table",
            Self::ClearField { .. } => "clear_field",
            Self::SkipField { .. } => "skip_field",
            Self::AbortField { .. } => "abort_field",
            Self::AddNote { .. } => "add_note",
            Self::RemoveNote { .. } => "remove_note",
            Self::RemoveNotes { .. } => "remove_notes",
        }
    }

    /// The field kind a value patch writes, `None` for the other operations
    #[must_use]
    pub const fn value_kind(&self) -> Option<FieldKind> {
        let kind = match self {
            Self::SetString { .. } => FieldKind::String,
            Self::SetNumber { .. } => FieldKind::Number,
            Self::SetStringList { .. } => FieldKind::StringList,
            Self::SetUrl { .. } => FieldKind::Url,
            Self::SetUrlList { .. } => FieldKind::UrlList,
            Self::SetDate { .. } => FieldKind::Date,
            Self::SetYear { .. } => FieldKind::Year,
            Self::SetCheckboxes { .. } => FieldKind::Checkboxes,
            Self::SetSingleSelect { .. } => FieldKind::SingleSelect,
            Self::SetMultiSelect { .. } => FieldKind::MultiSelect,
            Self::SetTable { .. } => FieldKind::Table,
            Self::ClearField { .. }
            | Self::SkipField { .. }
            | Self::AbortField { .. }
            | Self::AddNote { .. }
            | Self::RemoveNote { .. }
            | Self::RemoveNotes { .. } => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOptions {
    /// Leave the rest of a batch unapplied after the first rejection
    pub stop_on_error: bool,
}

/// What an applied patch changed
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    /// Note created by the patch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchOutcome {
    Applied(PatchEffect),
    Rejected(PatchError),
    /// Not attempted because an earlier patch was rejected with `stop_on_error`
    NotApplied,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    /// One outcome per patch, in batch order
    pub outcomes: Vec<PatchOutcome>,
    pub applied: usize,
    pub rejected: usize,
}

impl ApplyResult {
    /// Every patch was applied
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.applied == self.outcomes.len()
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &PatchError)> {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| match o {
            PatchOutcome::Rejected(err) => Some((i, err)),
            _ => None,
        })
    }
}

/// Apply a batch of patches in order
///
/// Rejections are recorded in the result; the form always reflects every applied
/// patch and nothing of the rejected ones.
pub fn apply_patches(form: &mut ParsedForm, patches: &[Patch], options: ApplyOptions) -> ApplyResult {
    debug!(form = %form.schema.id, patches = patches.len(), "applying patches");
    let mut result = ApplyResult::default();
    let mut stopped = false;

    for patch in patches {
        if stopped {
            result.outcomes.push(PatchOutcome::NotApplied);
            continue;
        }
        match apply_patch(form, patch) {
            Ok(effect) => {
                trace!(op = patch.op(), ?effect, "applied patch");
                result.applied += 1;
                result.outcomes.push(PatchOutcome::Applied(effect));
            }
            Err(err) => {
                warn!(op = patch.op(), kind = %err.kind, message = %err.message, "rejected patch");
                result.rejected += 1;
                result.outcomes.push(PatchOutcome::Rejected(err));
                stopped = options.stop_on_error;
            }
        }
    }
    result
}

/// Apply patches to a copy, leaving `form` untouched
#[must_use]
pub fn apply_patches_cloned(
    form: &ParsedForm,
    patches: &[Patch],
    options: ApplyOptions,
) -> (ParsedForm, ApplyResult) {
    let mut next = form.clone();
    let result = apply_patches(&mut next, patches, options);
    (next, result)
}

/// Apply one patch, or leave the form unchanged and say why not
///
/// # Errors
///
/// Returns a typed `PatchError` when the patch names a missing field, note or
/// reference, carries a value the field cannot hold, or skips a required field
pub fn apply_patch(form: &mut ParsedForm, patch: &Patch) -> PatchResult<PatchEffect> {
    match patch {
        Patch::ClearField { field_id } => {
            field(form, field_id)?;
            Ok(set_response(form, field_id, FieldResponse::empty()))
        }
        Patch::SkipField {
            field_id,
            role,
            reason,
        } => {
            if field(form, field_id)?.required {
                return Err(PatchError::required_field_skip(field_id));
            }
            terminate(form, field_id, role, reason.as_deref(), ResponseState::Skipped)
        }
        Patch::AbortField {
            field_id,
            role,
            reason,
        } => {
            field(form, field_id)?;
            terminate(form, field_id, role, reason.as_deref(), ResponseState::Aborted)
        }
        Patch::AddNote {
            reference,
            role,
            text,
            state,
        } => {
            resolve_in_form(reference, form).map_err(|err| {
                PatchError::new(PatchErrorKind::RefNotFound, err.message)
            })?;
            let note_id = add_note(form, reference, role, text, *state)?;
            Ok(PatchEffect {
                note_id: Some(note_id),
                ..PatchEffect::default()
            })
        }
        Patch::RemoveNote { note_id } => {
            let index = form
                .notes
                .iter()
                .position(|n| n.id == *note_id)
                .ok_or_else(|| {
                    PatchError::new(
                        PatchErrorKind::NoteNotFound,
                        format!("Note '{note_id}' does not exist"),
                    )
                })?;
            form.notes.remove(index);
            form.id_index.remove(note_id);
            Ok(PatchEffect {
                removed_notes: vec![note_id.clone()],
                ..PatchEffect::default()
            })
        }
        Patch::RemoveNotes { reference, role } => {
            resolve_in_form(reference, form).map_err(|err| {
                PatchError::new(PatchErrorKind::RefNotFound, err.message)
            })?;
            let removed = remove_notes_where(form, |n| n.reference == *reference && n.role == *role);
            Ok(PatchEffect {
                removed_notes: removed,
                ..PatchEffect::default()
            })
        }
        value_patch => {
            let Some(kind) = value_patch.value_kind() else {
                return Err(PatchError::invalid_value(format!(
                    "{} is not a value patch",
                    value_patch.op()
                )));
            };
            let field_id = patch_field_id(value_patch);
            let target = field(form, field_id)?;
            if target.kind() != kind {
                return Err(PatchError::new(
                    PatchErrorKind::TypeMismatch,
                    format!(
                        "{} cannot write to '{field_id}', which is a {} field",
                        value_patch.op(),
                        target.kind()
                    ),
                ));
            }
            let value = patch_value(target, &form.response(field_id), value_patch)?;
            let response = value.map_or_else(FieldResponse::empty, FieldResponse::answered);
            Ok(set_response(form, field_id, response))
        }
    }
}

fn patch_field_id(patch: &Patch) -> &str {
    match patch {
        Patch::SetString { field_id, .. }
        | Patch::SetNumber { field_id, .. }
        | Patch::SetStringList { field_id, .. }
        | Patch::SetUrl { field_id, .. }
        | Patch::SetUrlList { field_id, .. }
        | Patch::SetDate { field_id, .. }
        | Patch::SetYear { field_id, .. }
        | Patch::SetCheckboxes { field_id, .. }
        | Patch::SetSingleSelect { field_id, .. }
        | Patch::SetMultiSelect { field_id, .. }
        | Patch::SetTable { field_id, .. }
        | Patch::ClearField { field_id }
        | Patch::SkipField { field_id, .. }
        | Patch::AbortField { field_id, .. } => field_id,
        Patch::AddNote { reference, .. } | Patch::RemoveNotes { reference, .. } => reference,
        Patch::RemoveNote { note_id } => note_id,
    }
}

fn field<'a>(form: &'a ParsedForm, field_id: &str) -> PatchResult<&'a Field> {
    form.field(field_id)
        .ok_or_else(|| PatchError::field_not_found(field_id))
}

/// Store a response; notes linked to a terminal state being left are dropped
fn set_response(form: &mut ParsedForm, field_id: &str, response: FieldResponse) -> PatchEffect {
    let previous = form.response(field_id).state;
    let stale = match previous {
        ResponseState::Skipped if response.state != ResponseState::Skipped => Some(NoteState::Skipped),
        ResponseState::Aborted if response.state != ResponseState::Aborted => Some(NoteState::Aborted),
        _ => None,
    };
    let removed_notes = match stale {
        Some(state) => remove_notes_where(form, |n| {
            n.state == Some(state) && refers_to_field(&n.reference, field_id)
        }),
        None => Vec::new(),
    };
    form.responses_by_field_id
        .insert(field_id.to_string(), response);
    PatchEffect {
        field_id: Some(field_id.to_string()),
        note_id: None,
        removed_notes,
    }
}

fn terminate(
    form: &mut ParsedForm,
    field_id: &str,
    role: &str,
    reason: Option<&str>,
    state: ResponseState,
) -> PatchResult<PatchEffect> {
    let note_state = match state {
        ResponseState::Aborted => NoteState::Aborted,
        _ => NoteState::Skipped,
    };
    if field_id == IMPLICIT_CHECKBOXES_ID {
        return Err(PatchError::invalid_value(
            "Checkboxes outside any field have no tag to carry a skipped or aborted state",
        ));
    }
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if let Some(reason) = reason {
        check_note_text(reason)?;
    }

    let response = match state {
        ResponseState::Aborted => FieldResponse::aborted(),
        _ => FieldResponse::skipped(),
    };
    let mut effect = set_response(form, field_id, response);
    if let Some(reason) = reason {
        effect.note_id = Some(add_note(form, field_id, role, reason, Some(note_state))?);
    }
    Ok(effect)
}

fn check_note_text(text: &str) -> PatchResult<()> {
    if text.trim().is_empty() {
        return Err(PatchError::invalid_value("Note text is empty"));
    }
    if ["{%", "%}", "<!--", "-->"].iter().any(|t| text.contains(t)) {
        return Err(PatchError::invalid_value(
            "Note text cannot contain tag delimiters ({%, %}, <!--, -->)",
        ));
    }
    if text.lines().any(|line| fence_marker(line.trim_start()).is_some()) {
        return Err(PatchError::invalid_value(
            "Note text cannot contain a line starting a code fence (``` or ~~~)",
        ));
    }
    Ok(())
}

fn add_note(
    form: &mut ParsedForm,
    reference: &str,
    role: &str,
    text: &str,
    state: Option<NoteState>,
) -> PatchResult<String> {
    check_note_text(text)?;
    let id = next_note_id(&form.notes, |id| form.contains_id(id));
    form.id_index.insert(
        id.clone(),
        IdEntry {
            kind: IdKind::Note,
            field_kind: None,
            parent: None,
        },
    );
    form.notes.push(Note {
        id: id.clone(),
        reference: reference.to_string(),
        role: role.to_string(),
        state,
        text: text.trim().to_string(),
    });
    sort_notes(&mut form.notes);
    Ok(id)
}

fn remove_notes_where(form: &mut ParsedForm, matches: impl Fn(&Note) -> bool) -> Vec<String> {
    let mut removed = Vec::new();
    form.notes.retain(|note| {
        if matches(note) {
            removed.push(note.id.clone());
            false
        } else {
            true
        }
    });
    for id in &removed {
        form.id_index.remove(id);
    }
    removed
}

fn reject_sentinel(text: &str) -> PatchResult<()> {
    if is_sentinel_text(text) {
        return Err(PatchError::invalid_value(format!(
            "'{text}' is a state token; use skip_field or abort_field instead"
        )));
    }
    Ok(())
}

/// Trimmed text, `None` when blank
fn text_value(value: Option<&String>) -> PatchResult<Option<String>> {
    let Some(text) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    reject_sentinel(text)?;
    Ok(Some(text.to_string()))
}

fn list_value(items: &[String]) -> PatchResult<Vec<String>> {
    let mut out = Vec::new();
    for item in items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        if item.contains(['\n', '\r']) {
            return Err(PatchError::invalid_value(format!(
                "List item '{item}' spans several lines; send one item per entry"
            )));
        }
        reject_sentinel(item)?;
        out.push(item.to_string());
    }
    Ok(out)
}

fn unknown_option(field: &Field, option_id: &str) -> PatchError {
    let valid = field
        .attrs
        .options()
        .iter()
        .map(|o| o.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    PatchError::new(
        PatchErrorKind::InvalidOption,
        format!(
            "'{option_id}' is not an option of '{}'; options are {valid}",
            field.id
        ),
    )
}

/// The value a patch writes, `None` when it writes the unfilled representation
fn patch_value(
    field: &Field,
    current: &FieldResponse,
    patch: &Patch,
) -> PatchResult<Option<FieldValue>> {
    let value = match patch {
        Patch::SetString { value, .. } => text_value(value.as_ref())?.map(FieldValue::String),
        Patch::SetUrl { value, .. } => text_value(value.as_ref())?.map(FieldValue::Url),
        Patch::SetDate { value, .. } => text_value(value.as_ref())?.map(FieldValue::Date),
        Patch::SetNumber { value, .. } => match value {
            Some(n) if !n.is_finite() => {
                return Err(PatchError::invalid_value(format!("{n} is not a finite number")));
            }
            Some(n) => Some(FieldValue::Number(*n)),
            None => None,
        },
        Patch::SetYear { value, .. } => value.map(FieldValue::Year),
        Patch::SetStringList { items, .. } => {
            Some(list_value(items)?).filter(|l| !l.is_empty()).map(FieldValue::StringList)
        }
        Patch::SetUrlList { items, .. } => {
            Some(list_value(items)?).filter(|l| !l.is_empty()).map(FieldValue::UrlList)
        }
        Patch::SetCheckboxes { values, .. } => {
            let mode = marker_mode(&field.attrs);
            if let Some(unknown) = values.keys().find(|id| field.option(id).is_none()) {
                return Err(unknown_option(field, unknown));
            }
            if let Some((id, state)) = values.iter().find(|(_, state)| !mode.allows(**state)) {
                return Err(PatchError::invalid_value(format!(
                    "'{}' is not a {} checkbox state (option '{id}')",
                    state.as_str(),
                    mode.as_str()
                )));
            }
            let states: Vec<(String, CheckboxState)> = option_states(field, current)
                .into_iter()
                .map(|(id, state)| {
                    let state = values.get(&id).copied().unwrap_or(state);
                    (id, state)
                })
                .collect();
            value_from_states(field, &states)
                .map_err(|err| PatchError::invalid_value(err.message))?
        }
        Patch::SetSingleSelect { selected, .. } => match selected {
            Some(id) if field.option(id).is_none() => return Err(unknown_option(field, id)),
            Some(id) => Some(FieldValue::SingleSelect(id.clone())),
            None => None,
        },
        Patch::SetMultiSelect { selected, .. } => {
            if let Some(unknown) = selected.iter().find(|id| field.option(id).is_none()) {
                return Err(unknown_option(field, unknown));
            }
            let chosen: HashSet<&str> = selected.iter().map(String::as_str).collect();
            let ordered: Vec<String> = field
                .attrs
                .options()
                .iter()
                .filter(|o| chosen.contains(o.id.as_str()))
                .map(|o| o.id.clone())
                .collect();
            Some(ordered).filter(|o| !o.is_empty()).map(FieldValue::MultiSelect)
        }
        Patch::SetTable { rows, .. } => Some(FieldValue::Table(table_value(field, rows)?)),
        _ => None,
    };
    Ok(value)
}

fn table_value(field: &Field, rows: &[BTreeMap<String, CellInput>]) -> PatchResult<TableValue> {
    let columns = field.attrs.columns();
    let mut table = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if let Some(unknown) = row.keys().find(|id| field.column(id).is_none()) {
            return Err(PatchError::invalid_value(format!(
                "Row {index} of '{}' has unknown column '{unknown}'",
                field.id
            )));
        }
        let mut cells = TableRow::new();
        for column in columns {
            let reference = format!("{}.{}[{index}]", field.id, column.id);
            let input = row.get(&column.id).ok_or_else(|| {
                PatchError::invalid_value(format!(
                    "Cell '{reference}' is missing; give a value or a skipped/aborted state"
                ))
            })?;
            cells.insert(column.id.clone(), cell_value(column.column_type, input, &reference)?);
        }
        table.push(cells);
    }
    Ok(TableValue::new(table))
}

fn cell_value(column_type: ColumnType, input: &CellInput, reference: &str) -> PatchResult<CellResponse> {
    let check_text = |text: &str| {
        if text.chars().any(char::is_control) {
            return Err(PatchError::invalid_value(format!(
                "Cell '{reference}' contains a newline or control character"
            )));
        }
        Ok(())
    };

    match input {
        CellInput::State { state, reason } => {
            if let Some(reason) = reason {
                check_text(reason)?;
            }
            let reason = reason.as_ref().map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
            match state {
                CellState::Skipped => Ok(CellResponse::skipped(reason)),
                CellState::Aborted => Ok(CellResponse::aborted(reason)),
                CellState::Answered => Err(PatchError::invalid_value(format!(
                    "Cell '{reference}' has state answered but no value"
                ))),
            }
        }
        CellInput::Number(number) => {
            if !number.is_finite() {
                return Err(PatchError::invalid_value(format!(
                    "Cell '{reference}' is not a finite number"
                )));
            }
            match column_type {
                ColumnType::Number => Ok(CellResponse::answered(ScalarValue::Number(*number))),
                _ => coerce(column_type, &format_number(*number), reference),
            }
        }
        CellInput::Text(text) => {
            check_text(text)?;
            coerce(column_type, text, reference)
        }
    }
}

fn coerce(column_type: ColumnType, text: &str, reference: &str) -> PatchResult<CellResponse> {
    coerce_cell(column_type, text, reference).map_err(|err| {
        PatchError::new(
            match err.kind {
                crate::error::ValidationErrorKind::TypeMismatch => PatchErrorKind::TypeMismatch,
                _ => PatchErrorKind::InvalidValue,
            },
            err.message,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use rstest::rstest;

    const FORM: &str = r#"{% form id="f" %}
{% field kind="string" id="name" required=true %}{% /field %}
{% field kind="string" id="nick" %}{% /field %}
{% field kind="number" id="age" %}{% /field %}
{% field kind="single_select" id="color" %}
- [ ] Red {% #red %}
- [ ] Blue {% #blue %}
{% /field %}
{% field kind="checkboxes" id="tasks" %}
- [ ] One {% #one %}
- [x] Two {% #two %}
{% /field %}
{% field kind="table" id="films" columnIds=["title", "year"] columnTypes=["string", "year"] %}{% /field %}
{% /form %}
"#;

    fn form() -> ParsedForm {
        parse(FORM).unwrap()
    }

    fn apply(form: &mut ParsedForm, patch: Patch) -> PatchResult<PatchEffect> {
        apply_patch(form, &patch)
    }

    #[test]
    fn value_patch_answers_field() {
        let mut form = form();
        apply(
            &mut form,
            Patch::SetString {
                field_id: "name".into(),
                value: Some("  Ada ".into()),
            },
        )
        .unwrap();
        assert_eq!(
            form.response("name").value,
            Some(FieldValue::String("Ada".into()))
        );
    }

    #[test]
    fn blank_value_clears() {
        let mut form = form();
        let set = |value: &str| Patch::SetString {
            field_id: "nick".into(),
            value: Some(value.into()),
        };
        apply(&mut form, set("x")).unwrap();
        apply(&mut form, set("   ")).unwrap();
        assert_eq!(form.response("nick"), FieldResponse::empty());
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut form = form();
        let err = apply(
            &mut form,
            Patch::SetNumber {
                field_id: "name".into(),
                value: Some(1.0),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::TypeMismatch);
    }

    #[rstest]
    #[case("   ")]
    #[case("see {% form %}")]
    #[case("see <!-- this")]
    #[case("see\n```js\nlet x = 1;")]
    #[case("intro\n  ~~~\nbody")]
    fn note_text_that_would_not_parse_back_is_rejected(#[case] text: &str) {
        let mut form = form();
        let err = apply(
            &mut form,
            Patch::AddNote {
                reference: "age".into(),
                role: "agent".into(),
                text: text.into(),
                state: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::InvalidValue);
        assert!(form.notes.is_empty());

        let err = apply(
            &mut form,
            Patch::SkipField {
                field_id: "age".into(),
                role: "agent".into(),
                reason: Some(text.into()),
            },
        );
        // a blank reason just skips without a note
        if text.trim().is_empty() {
            assert!(err.is_ok());
        } else {
            assert_eq!(err.unwrap_err().kind, PatchErrorKind::InvalidValue);
            assert_eq!(form.response("age").state, ResponseState::Empty);
        }
        assert!(form.notes.is_empty());
    }

    #[test]
    fn backticks_inside_a_note_line_are_kept() {
        let mut form = form();
        apply(
            &mut form,
            Patch::AddNote {
                reference: "age".into(),
                role: "agent".into(),
                text: "use `age` in ``` years".into(),
                state: None,
            },
        )
        .unwrap();
        assert_eq!(parse(&crate::formats::serialize(&form).unwrap()).unwrap(), form);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(ResponseState::Answered))]
    #[case(Some(ResponseState::Aborted))]
    fn required_skip_always_fails(#[case] prior: Option<ResponseState>) {
        let mut form = form();
        match prior {
            Some(ResponseState::Answered) => {
                apply(
                    &mut form,
                    Patch::SetString {
                        field_id: "name".into(),
                        value: Some("x".into()),
                    },
                )
                .unwrap();
            }
            Some(ResponseState::Aborted) => {
                apply(
                    &mut form,
                    Patch::AbortField {
                        field_id: "name".into(),
                        role: "agent".into(),
                        reason: None,
                    },
                )
                .unwrap();
            }
            _ => {}
        }
        let before = form.clone();
        let err = apply(
            &mut form,
            Patch::SkipField {
                field_id: "name".into(),
                role: "agent".into(),
                reason: Some("no idea".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::RequiredFieldSkip);
        assert_eq!(form, before);
    }

    #[test]
    fn skip_with_reason_adds_linked_note() {
        let mut form = form();
        let effect = apply(
            &mut form,
            Patch::SkipField {
                field_id: "nick".into(),
                role: "agent".into(),
                reason: Some("Not known".into()),
            },
        )
        .unwrap();
        assert_eq!(effect.note_id.as_deref(), Some("n1"));
        assert_eq!(form.response("nick"), FieldResponse::skipped());
        assert_eq!(form.notes[0].state, Some(NoteState::Skipped));
        assert!(form.contains_id("n1"));
    }

    #[test]
    fn checkbox_patch_merges_over_current_markers() {
        let mut form = form();
        apply(
            &mut form,
            Patch::SetCheckboxes {
                field_id: "tasks".into(),
                values: BTreeMap::from([("one".to_string(), CheckboxState::Done)]),
            },
        )
        .unwrap();
        let states = form.response("tasks").value.unwrap();
        let states = states.as_checkboxes().unwrap();
        assert_eq!(states["one"], CheckboxState::Done);
        assert_eq!(states["two"], CheckboxState::Done);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut form = form();
        let err = apply(
            &mut form,
            Patch::SetSingleSelect {
                field_id: "color".into(),
                selected: Some("green".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::InvalidOption);
        assert!(err.message.contains("red, blue"));
    }

    #[test]
    fn table_rows_are_coerced_per_column() {
        let mut form = form();
        let row = BTreeMap::from([
            ("title".to_string(), CellInput::Text("Heat".into())),
            ("year".to_string(), CellInput::Number(1995.0)),
        ]);
        let skipped = BTreeMap::from([
            ("title".to_string(), CellInput::Text("Ran".into())),
            (
                "year".to_string(),
                CellInput::State {
                    state: CellState::Skipped,
                    reason: Some("unsure".into()),
                },
            ),
        ]);
        apply(
            &mut form,
            Patch::SetTable {
                field_id: "films".into(),
                rows: vec![row, skipped],
            },
        )
        .unwrap();
        let value = form.response("films").value.unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.rows[0]["year"].value, Some(ScalarValue::Year(1995)));
        assert_eq!(table.rows[1]["year"].reason.as_deref(), Some("unsure"));
    }

    #[test]
    fn empty_table_patch_answers_with_zero_rows() {
        let mut form = form();
        apply(
            &mut form,
            Patch::SetTable {
                field_id: "films".into(),
                rows: Vec::new(),
            },
        )
        .unwrap();
        let response = form.response("films");
        assert!(response.is_answered());
        assert_eq!(response.value.unwrap().as_table().map(TableValue::row_count), Some(0));
    }

    #[test]
    fn sentinel_text_is_not_a_value() {
        let mut form = form();
        let err = apply(
            &mut form,
            Patch::SetString {
                field_id: "nick".into(),
                value: Some("%SKIP%".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::InvalidValue);
    }

    #[test]
    fn notes_need_a_known_ref() {
        let mut form = form();
        let add = |reference: &str| Patch::AddNote {
            reference: reference.into(),
            role: "user".into(),
            text: "hello".into(),
            state: None,
        };
        assert_eq!(
            apply(&mut form, add("ghost")).unwrap_err().kind,
            PatchErrorKind::RefNotFound
        );
        let first = apply(&mut form, add("color.red")).unwrap();
        let second = apply(&mut form, add("f")).unwrap();
        assert_eq!(first.note_id.as_deref(), Some("n1"));
        assert_eq!(second.note_id.as_deref(), Some("n2"));
    }

    #[test]
    fn remove_notes_counts_matches() {
        let mut form = form();
        for role in ["user", "agent", "user"] {
            apply(
                &mut form,
                Patch::AddNote {
                    reference: "age".into(),
                    role: role.into(),
                    text: "t".into(),
                    state: None,
                },
            )
            .unwrap();
        }
        let effect = apply(
            &mut form,
            Patch::RemoveNotes {
                reference: "age".into(),
                role: "user".into(),
            },
        )
        .unwrap();
        assert_eq!(effect.removed_notes, vec!["n1", "n3"]);

        let none = apply(
            &mut form,
            Patch::RemoveNotes {
                reference: "nick".into(),
                role: "user".into(),
            },
        )
        .unwrap();
        assert!(none.removed_notes.is_empty());

        let err = apply(
            &mut form,
            Patch::RemoveNote {
                note_id: "n9".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, PatchErrorKind::NoteNotFound);
    }

    #[test]
    fn batch_continues_past_rejections_unless_told_to_stop() {
        let patches = vec![
            Patch::SetNumber {
                field_id: "ghost".into(),
                value: Some(1.0),
            },
            Patch::SetNumber {
                field_id: "age".into(),
                value: Some(42.0),
            },
        ];
        let (next, result) = apply_patches_cloned(&form(), &patches, ApplyOptions::default());
        assert_eq!((result.applied, result.rejected), (1, 1));
        assert!(next.response("age").is_answered());

        let (next, result) =
            apply_patches_cloned(&form(), &patches, ApplyOptions { stop_on_error: true });
        assert_eq!(result.outcomes[1], PatchOutcome::NotApplied);
        assert!(!next.response("age").is_answered());
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn patches_read_from_json() {
        let json = r#"[
            {"op": "set_string", "fieldId": "nick", "value": "Bo"},
            {"op": "skip_field", "fieldId": "age", "reason": "private"},
            {"op": "set_table", "fieldId": "films", "rows": [{"title": "Heat", "year": "1995"}]},
            {"op": "add_note", "ref": "films.title[0]", "text": "check"}
        ]"#;
        let patches: Vec<Patch> = serde_json::from_str(json).unwrap();
        let mut form = form();
        let result = apply_patches(&mut form, &patches, ApplyOptions::default());
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(form.notes.len(), 2);
    }
}
