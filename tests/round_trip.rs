use markform::formats::{SerializeOptions, serialize_with};
use markform::models::{FieldValue, ResponseState, TagStyle};
use markform::patch::apply_patch;
use markform::{Patch, PatchErrorKind, parse, serialize};

const INTAKE: &str = r#"---
markform:
  spec: MF/0.1
  title: Vendor intake
  roles:
    - agent
    - user
  role_instructions:
    user: Only answer the contact section.
  harness:
    max_issues_per_turn: 5
owner: procurement
---

# Vendor intake

Please keep answers short.

{% form id="intake" title="Vendor intake" %}

{% description %}
Collects what we need before signing a vendor.
{% /description %}

{% field-group id="company" title="Company" %}

{% field kind="string" id="name" label="Legal name" required=true minLength=2 %}
```value
Acme Tools Ltd
```
{% /field %}

{% field kind="url" id="site" label="Website" %}
```value
https://acme.example.com
```
{% /field %}

{% field kind="year" id="founded" label="Founded" min=1900 %}
```value
1987
```
{% /field %}

{% field kind="date" id="audit" label="Last audit" format="DD/MM/YYYY" %}
```value
03/04/2024
```
{% /field %}

{% instructions ref="tags" %}
One tag per line.
{% /instructions %}

{% field kind="string_list" id="tags" label="Tags" maxItems=5 uniqueItems=true %}
```value
hardware
tools
```
{% /field %}

{% /field-group %}

{% field-group id="terms" title="Terms" %}

{% field kind="checkboxes" id="checks" label="Checks" checkboxMode="explicit" %}
- [y] Insured {% #insured %}
- [n] Bonded {% #bonded %}
- [ ] Certified {% #certified %}
{% /field %}

{% field kind="multi_select" id="regions" label="Regions" maxSelections=2 %}
- [x] Europe {% #eu %}
- [ ] Americas {% #am %}
- [x] Asia {% #asia %}
{% /field %}

{% field kind="number" id="discount" label="Discount" role="user" priority="high" state="aborted" %}{% /field %}

{% field kind="table" id="contacts" label="Contacts" columnIds=["who", "email", "since"] columnLabels=["Name", "Email", "Since"] columnTypes=["string", "url", "year"] minRows=1 %}
| Name | Email | Since |
| --- | --- | --- |
| Jo Park | https://acme.example.com/jo | 2019 |
| Sam Lee | %ABORT% (left the company) | %SKIP% |
{% /field %}

{% /field-group %}

{% note id="n1" ref="discount" role="user" state="aborted" %}
Pricing is negotiated separately.
{% /note %}

{% note id="n2" ref="contacts.email[1]" %}
Need a new address.
{% /note %}

{% /form %}

Thanks for filling this in.
"#;

#[test]
fn canonical_output_parses_back_to_the_same_form() {
    let form = parse(INTAKE).unwrap();
    let text = serialize(&form).unwrap();
    assert_eq!(parse(&text).unwrap(), form);
}

#[test]
fn serializing_twice_gives_identical_text() {
    let once = serialize(&parse(INTAKE).unwrap()).unwrap();
    let twice = serialize(&parse(&once).unwrap()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn prose_and_frontmatter_survive() {
    let text = serialize(&parse(INTAKE).unwrap()).unwrap();
    assert!(text.starts_with("---\n"));
    assert!(text.contains("owner: procurement"));
    assert!(text.contains("# Vendor intake\n\nPlease keep answers short."));
    assert!(text.trim_end().ends_with("Thanks for filling this in."));
}

#[test]
fn comment_syntax_parses_like_bracket_syntax() {
    let bracket = parse(INTAKE).unwrap();
    let comment_text =
        serialize_with(&bracket, SerializeOptions { style: Some(TagStyle::Comment) }).unwrap();
    assert!(comment_text.contains("<!-- field kind=\"url\" id=\"site\""));
    assert!(comment_text.contains("- [y] Insured <!-- #insured -->"));

    let comment = parse(&comment_text).unwrap();
    assert_eq!(comment.schema.style, TagStyle::Comment);
    assert_eq!(comment.schema.fields, bracket.schema.fields);
    assert_eq!(comment.schema.body, bracket.schema.body);
    assert_eq!(comment.responses_by_field_id, bracket.responses_by_field_id);
    assert_eq!(comment.notes, bracket.notes);

    // the comment document keeps its own syntax on the way out
    assert_eq!(serialize(&comment).unwrap(), comment_text);
}

#[test]
fn sentinel_fences_are_normalized_to_state_attributes() {
    let text = r#"{% form id="f" %}
{% field kind="string" id="a" label="A" %}
```value
%SKIP%
```
{% /field %}
{% field kind="number" id="b" label="B" %}
```value
%ABORT%
```
{% /field %}
{% /form %}
"#;
    let form = parse(text).unwrap();
    assert_eq!(form.response("a").state, ResponseState::Skipped);
    assert_eq!(form.response("b").state, ResponseState::Aborted);

    let out = serialize(&form).unwrap();
    assert!(!out.contains("%SKIP%"));
    assert!(out.contains(r#"{% field kind="string" id="a" label="A" state="skipped" %}{% /field %}"#));
    assert!(out.contains(r#"{% field kind="number" id="b" label="B" state="aborted" %}{% /field %}"#));
    assert_eq!(parse(&out).unwrap(), form);
}

#[test]
fn values_are_typed() {
    let form = parse(INTAKE).unwrap();
    assert_eq!(form.response("founded").value, Some(FieldValue::Year(1987)));
    assert_eq!(
        form.response("tags").value,
        Some(FieldValue::StringList(vec!["hardware".into(), "tools".into()]))
    );
    assert_eq!(
        form.response("regions").value,
        Some(FieldValue::MultiSelect(vec!["eu".into(), "asia".into()]))
    );
    let table = form.response("contacts").value.unwrap();
    assert_eq!(table.as_table().unwrap().row_count(), 2);
}

#[test]
fn legacy_tags_are_written_as_field_tags() {
    let text = r#"{% form id="f" %}
{% string-field id="a" label="A" %}
```value
hi
```
{% /string-field %}
{% /form %}
"#;
    let form = parse(text).unwrap();
    let out = serialize(&form).unwrap();
    assert!(out.contains(r#"{% field kind="string" id="a" label="A" %}"#));
    assert_eq!(parse(&out).unwrap(), form);
}

#[test]
fn fenced_text_in_notes_is_refused_but_survives_in_values() {
    let mut form = parse(
        r#"{% form id="f" %}
{% field kind="string" id="a" label="A" %}{% /field %}
{% /form %}
"#,
    )
    .unwrap();

    let note: Patch =
        serde_json::from_str(r#"{"op":"add_note","ref":"a","text":"see\n```js\nlet x = 1;"}"#)
            .unwrap();
    let err = apply_patch(&mut form, &note).unwrap_err();
    assert_eq!(err.kind, PatchErrorKind::InvalidValue);
    assert!(form.notes.is_empty());

    // values live in their own fence, which grows past any backtick run
    let value: Patch = serde_json::from_str(
        r#"{"op":"set_string","fieldId":"a","value":"see\n```js\nlet x = 1;\n~~~"}"#,
    )
    .unwrap();
    apply_patch(&mut form, &value).unwrap();
    let text = serialize(&form).unwrap();
    assert!(text.contains("````value\n"));
    assert_eq!(parse(&text).unwrap(), form);
}

#[test]
fn tag_delimiters_inside_quoted_attributes_survive() {
    let form = parse(
        r#"{% form id="f" title="100%} sure" %}
{% field kind="string" id="a" label="50%} off --> now" %}{% /field %}
{% /form %}
"#,
    )
    .unwrap();
    assert_eq!(form.field("a").unwrap().label, "50%} off --> now");

    let bracket = serialize(&form).unwrap();
    assert_eq!(parse(&bracket).unwrap(), form);

    let comment = serialize_with(&form, SerializeOptions { style: Some(TagStyle::Comment) }).unwrap();
    let reparsed = parse(&comment).unwrap();
    assert_eq!(reparsed.schema.fields, form.schema.fields);
    assert_eq!(reparsed.schema.title, form.schema.title);
}
