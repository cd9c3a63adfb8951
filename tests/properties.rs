use std::collections::BTreeMap;

use markform::patch::{CellInput, apply_patch};
use markform::{FieldValue, ParsedForm, Patch, compute_progress, parse, serialize, validate};
use proptest::prelude::*;

const FORM: &str = r#"{% form id="p" %}
{% field kind="string" id="name" label="Name" required=true %}{% /field %}
{% field kind="number" id="score" label="Score" %}{% /field %}
{% field kind="string_list" id="tags" label="Tags" %}{% /field %}
{% field kind="single_select" id="size" label="Size" %}
- [ ] Small {% #s %}
- [ ] Large {% #l %}
{% /field %}
{% field kind="table" id="rows" label="Rows" columnIds=["text"] columnTypes=["string"] %}{% /field %}
{% /form %}
"#;

const FIELDS: [&str; 5] = ["name", "score", "tags", "size", "rows"];

fn value_patch(field: &str, seed: u8) -> Patch {
    let field_id = field.to_string();
    match field {
        "name" => Patch::SetString {
            field_id,
            value: Some(format!("name {seed}")),
        },
        "score" => Patch::SetNumber {
            field_id,
            value: Some(f64::from(seed) / 4.0),
        },
        "tags" => Patch::SetStringList {
            field_id,
            items: (0..seed % 3).map(|i| format!("tag{i}")).collect(),
        },
        "size" => Patch::SetSingleSelect {
            field_id,
            selected: Some(if seed % 2 == 0 { "s" } else { "l" }.to_string()),
        },
        _ => Patch::SetTable {
            field_id,
            rows: (0..seed % 3)
                .map(|i| BTreeMap::from([("text".to_string(), CellInput::Text(format!("r{i}")))]))
                .collect(),
        },
    }
}

fn patch_for(op: u8, field: usize, seed: u8) -> Patch {
    let field_id = FIELDS[field].to_string();
    match op {
        0 => value_patch(FIELDS[field], seed),
        1 => Patch::SkipField {
            field_id,
            role: "agent".into(),
            reason: (seed % 2 == 0).then(|| format!("reason {seed}")),
        },
        2 => Patch::AbortField {
            field_id,
            role: "agent".into(),
            reason: None,
        },
        _ => Patch::ClearField { field_id },
    }
}

fn patched(ops: &[(u8, usize, u8)]) -> ParsedForm {
    let mut form = parse(FORM).unwrap();
    for &(op, field, seed) in ops {
        // rejected patches (a required skip) leave the form unchanged
        let _ = apply_patch(&mut form, &patch_for(op, field, seed));
    }
    form
}

fn ops() -> impl Strategy<Value = Vec<(u8, usize, u8)>> {
    prop::collection::vec((0u8..4, 0..FIELDS.len(), any::<u8>()), 0..24)
}

/// Free text with fence markers, tag punctuation and line breaks
const FREE_TEXT: &str = "[a-z `~{}<>!#\\n-]{1,40}";

proptest! {
    #[test]
    fn state_counts_always_sum_to_total(ops in ops()) {
        let form = patched(&ops);
        let counts = compute_progress(&form, &validate(&form)).counts;
        prop_assert_eq!(counts.total, FIELDS.len());
        prop_assert_eq!(
            counts.answered + counts.skipped + counts.aborted + counts.empty,
            counts.total
        );
    }

    #[test]
    fn patched_forms_round_trip(ops in ops()) {
        let form = patched(&ops);
        let text = serialize(&form).unwrap();
        prop_assert_eq!(parse(&text).unwrap(), form);
    }

    #[test]
    fn free_text_in_notes_and_values_round_trips(
        ops in ops(),
        note in FREE_TEXT,
        reason in FREE_TEXT,
        value in FREE_TEXT,
    ) {
        let mut form = patched(&ops);
        // text that could not be written back is rejected and leaves the form unchanged
        let _ = apply_patch(&mut form, &Patch::AddNote {
            reference: "tags".into(),
            role: "agent".into(),
            text: note,
            state: None,
        });
        let _ = apply_patch(&mut form, &Patch::SkipField {
            field_id: "score".into(),
            role: "agent".into(),
            reason: Some(reason),
        });
        apply_patch(&mut form, &Patch::SetString {
            field_id: "name".into(),
            value: Some(value.clone()),
        })
        .unwrap();

        let text = serialize(&form).unwrap();
        let back = parse(&text).unwrap();
        prop_assert_eq!(&back, &form);
        let stored = back.response("name").value;
        let stored = stored.as_ref().and_then(FieldValue::as_string).map_or("", String::as_str);
        prop_assert_eq!(stored, value.trim());
    }

    #[test]
    fn cell_text_survives_escaping(text in "[a-zA-Z0-9|\\\\ ]{0,16}[a-zA-Z0-9|\\\\]") {
        let mut form = parse(FORM).unwrap();
        let patch = Patch::SetTable {
            field_id: "rows".into(),
            rows: vec![BTreeMap::from([("text".to_string(), CellInput::Text(text.clone()))])],
        };
        apply_patch(&mut form, &patch).unwrap();

        let back = parse(&serialize(&form).unwrap()).unwrap();
        let value = back.response("rows").value.unwrap();
        let cell = &value.as_table().unwrap().rows[0]["text"];
        let stored = cell.value.as_ref().map(|v| v.to_text());
        prop_assert_eq!(stored.as_deref(), Some(text.trim()));
    }
}
