//! Per-turn issue selection for agent harnesses

use std::collections::HashSet;

use crate::models::{FormSchema, HarnessConfig};
use crate::validate::Issue;

/// Take issues from the front of a sorted list until a per-turn cap is reached
///
/// An issue is kept when it fits under every cap in `config`: the number of issues,
/// the number of distinct fields and the number of distinct groups those fields
/// sit in. Issues not tied to a field only count toward the issue cap. Order is
/// preserved, so the most urgent issues win.
#[must_use]
pub fn filter_issues_for_turn(
    issues: &[Issue],
    schema: &FormSchema,
    config: &HarnessConfig,
) -> Vec<Issue> {
    let mut fields: HashSet<&str> = HashSet::new();
    let mut groups: HashSet<&str> = HashSet::new();
    let mut picked = Vec::new();

    for issue in issues {
        if config.max_issues_per_turn.is_some_and(|max| picked.len() >= max) {
            break;
        }

        if let Some(field_id) = issue.field_id.as_deref() {
            let new_field = !fields.contains(field_id);
            if new_field && config.max_fields_per_turn.is_some_and(|max| fields.len() >= max) {
                continue;
            }

            let group_id = schema.field(field_id).map(|f| f.group_id.as_str());
            if let Some(group_id) = group_id {
                let new_group = !groups.contains(group_id);
                if new_group && config.max_groups_per_turn.is_some_and(|max| groups.len() >= max) {
                    continue;
                }
                groups.insert(group_id);
            }
            fields.insert(field_id);
        }
        picked.push(issue.clone());
    }
    picked
}
