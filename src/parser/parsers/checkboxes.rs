//! Checkbox-marker fields: checkboxes, single_select, multi_select

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::document::{AstNode, TagNode};
use crate::error::{SerializeResult, ValidationError, ValidationErrorKind, ValidationResult};
use crate::models::{
    is_valid_id, CheckboxMode, CheckboxState, Field, FieldAttrs, FieldOption, FieldResponse,
    FieldSyntax, FieldValue, ResponseState, TagStyle,
};
use crate::parser::interface::{reject_child_tags, resolve_state, unfilled_response, ResponseParser};

static ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<indent>[ \t]*)(?P<bullet>[-*+])[ \t]+\[(?P<mark>[^\]])\][ \t]+(?P<label>\S.*?)(?:[ \t]*(?:\{%[ \t]*#(?P<bid>[A-Za-z0-9_-]+)[ \t]*%\}|<!--[ \t]*#(?P<cid>[A-Za-z0-9_-]+)[ \t]*-->))?[ \t]*$",
    )
    .expect("checkbox item pattern is valid")
});

/// One `- [x] Label {% #id %}` list item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxItem {
    pub indent: String,
    pub bullet: char,
    pub marker: char,
    pub label: String,
    /// Id from the trailing annotation, if any
    pub id: Option<String>,
}

/// Read a checkbox list item
#[must_use]
pub fn scan_item(line: &str) -> Option<CheckboxItem> {
    let caps = ITEM.captures(line)?;
    Some(CheckboxItem {
        indent: caps["indent"].to_string(),
        bullet: caps["bullet"].chars().next()?,
        marker: caps["mark"].chars().next()?,
        label: caps["label"].trim().to_string(),
        id: caps
            .name("bid")
            .or_else(|| caps.name("cid"))
            .map(|m| m.as_str().to_string()),
    })
}

/// Inline id annotation in the given tag syntax
#[must_use]
pub fn id_annotation(id: &str, style: TagStyle) -> String {
    match style {
        TagStyle::Bracket => format!("{{% #{id} %}}"),
        TagStyle::Comment => format!("<!-- #{id} -->"),
    }
}

/// Marker vocabulary of a checkbox-syntax field; selects use `[ ]` / `[x]`
#[must_use]
pub const fn marker_mode(attrs: &FieldAttrs) -> CheckboxMode {
    match attrs {
        FieldAttrs::Checkboxes { mode, .. } => *mode,
        _ => CheckboxMode::Simple,
    }
}

/// Current state of every option, defaults filled in
#[must_use]
pub fn option_states(field: &Field, response: &FieldResponse) -> Vec<(String, CheckboxState)> {
    let mode = marker_mode(&field.attrs);
    let value = response.value.as_ref().filter(|_| response.is_answered());
    field
        .attrs
        .options()
        .iter()
        .map(|option| {
            let state = match value {
                Some(FieldValue::Checkboxes(states)) => states.get(&option.id).copied(),
                Some(FieldValue::SingleSelect(selected)) => {
                    (*selected == option.id).then_some(CheckboxState::Done)
                }
                Some(FieldValue::MultiSelect(selected)) => selected
                    .contains(&option.id)
                    .then_some(CheckboxState::Done),
                _ => None,
            };
            (option.id.clone(), state.unwrap_or_else(|| mode.default_state()))
        })
        .collect()
}

/// Value of a checkbox-syntax field from option states, `None` when nothing is marked
///
/// # Errors
///
/// Returns `InvalidOption` when a single-select field has more than one selection
pub fn value_from_states(
    field: &Field,
    states: &[(String, CheckboxState)],
) -> ValidationResult<Option<FieldValue>> {
    let mode = marker_mode(&field.attrs);
    if states.iter().all(|(_, state)| *state == mode.default_state()) {
        return Ok(None);
    }

    let selected = || {
        states
            .iter()
            .filter(|(_, state)| *state == CheckboxState::Done)
            .map(|(id, _)| id.clone())
    };

    let value = match &field.attrs {
        FieldAttrs::Checkboxes { .. } => FieldValue::Checkboxes(states.iter().cloned().collect()),
        FieldAttrs::SingleSelect { .. } => {
            let chosen: Vec<String> = selected().collect();
            if chosen.len() > 1 {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidOption,
                    &field.id,
                    format!(
                        "Single-select field '{}' has {} selections: {}",
                        field.id,
                        chosen.len(),
                        chosen.join(", ")
                    ),
                ));
            }
            match chosen.into_iter().next() {
                Some(id) => FieldValue::SingleSelect(id),
                None => return Ok(None),
            }
        }
        FieldAttrs::MultiSelect { .. } => FieldValue::MultiSelect(selected().collect()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Parser for fields whose value is a list of marked options
#[derive(Debug)]
pub struct CheckboxParser;

impl ResponseParser for CheckboxParser {
    fn syntax(&self) -> FieldSyntax {
        FieldSyntax::Checkboxes
    }

    fn parse(
        &self,
        node: &TagNode,
        field: &mut Field,
        declared: Option<ResponseState>,
    ) -> ValidationResult<FieldResponse> {
        reject_child_tags(node, &field.id)?;
        let mode = marker_mode(&field.attrs);

        let mut options = Vec::new();
        let mut states = Vec::new();
        let mut seen = HashSet::new();
        for child in &node.children {
            let line = match child {
                AstNode::Text(line) if line.is_blank() => continue,
                AstNode::Text(line) => line,
                AstNode::Fence(fence) => {
                    return Err(ValidationError::unexpected_content(
                        &field.id,
                        format!(
                            "Fence at line {} is not allowed in {} field '{}'",
                            fence.span.start,
                            field.kind(),
                            field.id
                        ),
                    ));
                }
                AstNode::Tag(_) => continue,
            };

            let Some(item) = scan_item(&line.text) else {
                return Err(ValidationError::unexpected_content(
                    &field.id,
                    format!(
                        "Line {} in field '{}' is not a checkbox item: '{}'",
                        line.line,
                        field.id,
                        line.text.trim()
                    ),
                ));
            };
            let Some(id) = item.id else {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingAttribute,
                    &field.id,
                    format!(
                        "Option '{}' at line {} needs an id annotation like {}",
                        item.label,
                        line.line,
                        id_annotation("id", node.style)
                    ),
                ));
            };
            let reference = format!("{}.{id}", field.id);
            if !is_valid_id(&id) {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidId,
                    reference,
                    format!("'{id}' is not a valid option id"),
                ));
            }
            if !seen.insert(id.clone()) {
                return Err(ValidationError::duplicate_id(&reference));
            }
            let state = CheckboxState::from_marker(item.marker, mode).ok_or_else(|| {
                ValidationError::new(
                    ValidationErrorKind::InvalidOption,
                    &reference,
                    format!(
                        "Marker '[{}]' is not valid for {} mode",
                        item.marker,
                        mode.as_str()
                    ),
                )
            })?;

            options.push(FieldOption {
                id: id.clone(),
                label: item.label,
            });
            states.push((id, state));
        }

        if options.is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidOption,
                &field.id,
                format!("{} field '{}' declares no options", field.kind(), field.id),
            ));
        }
        if let FieldAttrs::Checkboxes { options: slot, .. }
        | FieldAttrs::SingleSelect { options: slot }
        | FieldAttrs::MultiSelect { options: slot, .. } = &mut field.attrs
        {
            *slot = options;
        }

        let value = value_from_states(field, &states)?;
        let terminal = resolve_state(field, value.is_some(), declared, None)?;
        Ok(value.map_or_else(|| unfilled_response(terminal), FieldResponse::answered))
    }

    fn render(
        &self,
        field: &Field,
        response: &FieldResponse,
        style: TagStyle,
    ) -> SerializeResult<Vec<String>> {
        let states: BTreeMap<String, CheckboxState> =
            option_states(field, response).into_iter().collect();
        let mode = marker_mode(&field.attrs);

        Ok(field
            .attrs
            .options()
            .iter()
            .map(|option| {
                let state = states
                    .get(&option.id)
                    .copied()
                    .unwrap_or_else(|| mode.default_state());
                format!(
                    "- [{}] {} {}",
                    state.marker(),
                    option.label,
                    id_annotation(&option.id, style)
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Attributes, LineSpan, Position, TextLine};
    use crate::models::{FieldKind, Priority};

    fn field(kind: FieldKind) -> Field {
        Field {
            id: "pick".into(),
            label: "Pick".into(),
            required: false,
            role: "agent".into(),
            priority: Priority::Medium,
            placeholder: None,
            attrs: FieldAttrs::defaults_for(kind),
            group_id: "_default".into(),
            extra: BTreeMap::new(),
        }
    }

    fn node(lines: &[&str]) -> TagNode {
        TagNode {
            name: "field".into(),
            attrs: Attributes::new(),
            children: lines
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    AstNode::Text(TextLine {
                        text: (*text).to_string(),
                        line: i + 2,
                    })
                })
                .collect(),
            style: TagStyle::Bracket,
            position: Position::new(1, 1),
            span: LineSpan::new(1, lines.len() + 2),
        }
    }

    #[test]
    fn scans_both_annotation_styles() {
        let item = scan_item("  * [x] Red apples {% #red %}").unwrap();
        assert_eq!(item.indent, "  ");
        assert_eq!(item.bullet, '*');
        assert_eq!(item.marker, 'x');
        assert_eq!(item.label, "Red apples");
        assert_eq!(item.id.as_deref(), Some("red"));

        let item = scan_item("- [ ] Green <!-- #green -->").unwrap();
        assert_eq!(item.id.as_deref(), Some("green"));

        let item = scan_item("- [/] Plain label").unwrap();
        assert_eq!(item.id, None);
        assert_eq!(item.label, "Plain label");

        assert!(scan_item("- plain bullet").is_none());
        assert!(scan_item("[x] no bullet").is_none());
    }

    #[test]
    fn untouched_options_are_empty() {
        let mut f = field(FieldKind::MultiSelect);
        let response = CheckboxParser
            .parse(
                &node(&["- [ ] A {% #a %}", "- [ ] B {% #b %}"]),
                &mut f,
                None,
            )
            .unwrap();
        assert_eq!(response, FieldResponse::empty());
        assert_eq!(f.attrs.options().len(), 2);
    }

    #[test]
    fn multi_select_collects_marked_options() {
        let mut f = field(FieldKind::MultiSelect);
        let response = CheckboxParser
            .parse(
                &node(&["- [x] A {% #a %}", "- [ ] B {% #b %}", "- [X] C {% #c %}"]),
                &mut f,
                None,
            )
            .unwrap();
        assert_eq!(
            response.value,
            Some(FieldValue::MultiSelect(vec!["a".into(), "c".into()]))
        );
    }

    #[test]
    fn single_select_rejects_two_selections() {
        let mut f = field(FieldKind::SingleSelect);
        let err = CheckboxParser
            .parse(&node(&["- [x] A {% #a %}", "- [x] B {% #b %}"]), &mut f, None)
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidOption);
    }

    #[test]
    fn marked_field_cannot_be_skipped() {
        let mut f = field(FieldKind::Checkboxes);
        let err = CheckboxParser
            .parse(
                &node(&["- [x] A {% #a %}"]),
                &mut f,
                Some(ResponseState::Skipped),
            )
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::StateConflict);
    }

    #[test]
    fn skipped_field_keeps_default_markers() {
        let mut f = field(FieldKind::Checkboxes);
        let response = CheckboxParser
            .parse(
                &node(&["- [ ] A {% #a %}"]),
                &mut f,
                Some(ResponseState::Skipped),
            )
            .unwrap();
        assert_eq!(response, FieldResponse::skipped());
        let lines = CheckboxParser
            .render(&f, &response, TagStyle::Comment)
            .unwrap();
        assert_eq!(lines, vec!["- [ ] A <!-- #a -->"]);
    }

    #[test]
    fn explicit_mode_vocabulary() {
        let mut f = field(FieldKind::Checkboxes);
        f.attrs = FieldAttrs::Checkboxes {
            mode: CheckboxMode::Explicit,
            options: Vec::new(),
        };
        let response = CheckboxParser
            .parse(&node(&["- [y] A {% #a %}", "- [ ] B {% #b %}"]), &mut f, None)
            .unwrap();
        let states = response.value.as_ref().and_then(FieldValue::as_checkboxes).unwrap();
        assert_eq!(states["a"], CheckboxState::Yes);
        assert_eq!(states["b"], CheckboxState::Unfilled);

        let err = CheckboxParser
            .parse(&node(&["- [x] A {% #a %}"]), &mut f, None)
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidOption);
    }

    #[test]
    fn options_need_ids_and_must_be_unique() {
        let mut f = field(FieldKind::Checkboxes);
        let err = CheckboxParser
            .parse(&node(&["- [ ] A"]), &mut f, None)
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::MissingAttribute);

        let err = CheckboxParser
            .parse(&node(&["- [ ] A {% #a %}", "- [ ] A again {% #a %}"]), &mut f, None)
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::DuplicateId);
        assert_eq!(err.reference, "pick.a");
    }
}
