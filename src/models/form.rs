//! The parsed form aggregate and its frontmatter

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{Field, FieldKind, FieldResponse, FormSchema, Note};

/// Spec version this engine reads and writes
pub const SPEC_VERSION: &str = "MF/0.1";

/// Harness tuning read from frontmatter; the engine stores it but never acts on it
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_issues_per_turn: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fields_per_turn: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_groups_per_turn: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
}

fn default_roles() -> Vec<String> {
    vec!["user".to_string(), "agent".to_string()]
}

fn default_spec() -> String {
    SPEC_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkformSection {
    #[serde(default = "default_spec")]
    pub spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_instructions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harness: Option<HarnessConfig>,
}

impl Default for MarkformSection {
    fn default() -> Self {
        Self {
            spec: default_spec(),
            title: None,
            roles: default_roles(),
            role_instructions: BTreeMap::new(),
            harness: None,
        }
    }
}

/// YAML frontmatter of a form document
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormMetadata {
    #[serde(default)]
    pub markform: MarkformSection,
    /// Keys outside the `markform` section, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// What an indexed id names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Form,
    Group,
    Field,
    Option,
    Column,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEntry {
    pub kind: IdKind,
    /// Kind of the field this id is, or belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_kind: Option<FieldKind>,
    /// Owning element: the group of a field, the field of an option or column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Aggregate root returned by `parse` and mutated only by patch application
///
/// Options and columns are indexed under their qualified `field.child` key; form,
/// group, field and note ids share one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FormMetadata>,
    pub schema: FormSchema,
    pub responses_by_field_id: HashMap<String, FieldResponse>,
    pub notes: Vec<Note>,
    /// Field ids in document order
    pub order_index: Vec<String>,
    pub id_index: HashMap<String, IdEntry>,
    /// Markdown before the form tag, trimmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading: Option<String>,
    /// Markdown after the form tag, trimmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing: Option<String>,
}

impl ParsedForm {
    #[must_use]
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.schema.field(id)
    }

    /// Response of a field; fields without a stored response are empty
    #[must_use]
    pub fn response(&self, field_id: &str) -> FieldResponse {
        self.responses_by_field_id
            .get(field_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// Notes attached to `reference`, in order
    pub fn notes_for<'a>(&'a self, reference: &'a str) -> impl Iterator<Item = &'a Note> + 'a {
        self.notes.iter().filter(move |n| n.reference == reference)
    }

    /// Fields in document order
    pub fn fields_in_order(&self) -> impl Iterator<Item = &Field> + '_ {
        self.order_index.iter().filter_map(|id| self.schema.field(id))
    }

    /// Roles declared in frontmatter, or the default pair
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.metadata.as_ref().map_or_else(default_roles, |m| {
            m.markform.roles.clone()
        })
    }

    /// Harness tuning, if the frontmatter declares any
    #[must_use]
    pub fn harness_config(&self) -> Option<&HarnessConfig> {
        self.metadata.as_ref()?.markform.harness.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults_and_extra_keys() {
        let yaml = "markform:\n  spec: MF/0.1\n  harness:\n    max_turns: 5\nauthor: someone\n";
        let meta: FormMetadata = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(meta.markform.spec, "MF/0.1");
        assert_eq!(meta.markform.roles, vec!["user", "agent"]);
        assert_eq!(
            meta.markform.harness.as_ref().and_then(|h| h.max_turns),
            Some(5)
        );
        assert!(meta.extra.contains_key("author"));
    }

    #[test]
    fn metadata_round_trips_through_yaml() {
        let yaml = "markform:\n  spec: MF/0.1\n  roles: [agent]\n  role_instructions:\n    agent: Fill everything\n";
        let meta: FormMetadata = serde_yaml::from_str(yaml).unwrap();
        let again: FormMetadata =
            serde_yaml::from_str(&serde_yaml::to_string(&meta).unwrap()).unwrap();
        assert_eq!(meta, again);
    }
}
