//! Progress counts and the completion predicate

use serde::{Deserialize, Serialize};

use crate::models::{FieldKind, ParsedForm, ResponseState};
use crate::refs::refers_to_field;
use crate::validate::{Issue, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProgress {
    pub field_id: String,
    pub kind: FieldKind,
    pub required: bool,
    pub role: String,
    pub response_state: ResponseState,
    /// Notes attached to the field or to one of its options, columns or cells
    pub has_notes: bool,
    pub note_count: usize,
    pub issue_count: usize,
}

/// Aggregate counts; `answered + skipped + aborted + empty == total`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounts {
    pub total: usize,
    pub required: usize,
    pub answered: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub empty: usize,
    pub total_notes: usize,
}

impl ProgressCounts {
    fn record(&mut self, state: ResponseState, required: bool) {
        self.total += 1;
        if required {
            self.required += 1;
        }
        match state {
            ResponseState::Answered => self.answered += 1,
            ResponseState::Skipped => self.skipped += 1,
            ResponseState::Aborted => self.aborted += 1,
            ResponseState::Empty => self.empty += 1,
        }
    }

    /// Every field is answered or skipped
    #[must_use]
    pub const fn all_accounted_for(&self) -> bool {
        self.answered + self.skipped == self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    Complete,
    Incomplete,
    /// An aborted field or a broken rule; filling more fields will not finish the form
    Invalid,
}

impl FormState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub counts: ProgressCounts,
    pub fields: Vec<FieldProgress>,
    pub form_state: FormState,
    /// Completion over every role
    pub is_complete: bool,
}

/// Summarize the response state of every field
#[must_use]
pub fn compute_progress(form: &ParsedForm, issues: &[Issue]) -> ProgressSummary {
    let mut counts = ProgressCounts {
        total_notes: form.notes.len(),
        ..ProgressCounts::default()
    };
    let fields = form
        .fields_in_order()
        .map(|field| {
            let state = form.response(&field.id).state;
            counts.record(state, field.required);
            let note_count = form
                .notes
                .iter()
                .filter(|n| refers_to_field(&n.reference, &field.id))
                .count();
            FieldProgress {
                field_id: field.id.clone(),
                kind: field.kind(),
                required: field.required,
                role: field.role.clone(),
                response_state: state,
                has_notes: note_count > 0,
                note_count,
                issue_count: issues
                    .iter()
                    .filter(|i| i.field_id.as_deref() == Some(field.id.as_str()))
                    .count(),
            }
        })
        .collect();

    let form_state = if counts.aborted > 0 || issues.iter().any(Issue::is_validation_error) {
        FormState::Invalid
    } else if !counts.all_accounted_for() || issues.iter().any(|i| i.severity == Severity::Required)
    {
        FormState::Incomplete
    } else {
        FormState::Complete
    };

    ProgressSummary {
        counts,
        fields,
        form_state,
        is_complete: is_complete_for(form, issues, None),
    }
}

/// Completion predicate for the fields of the given roles, or all fields
///
/// Complete when every targeted field is answered or skipped, none is aborted and
/// no issue on a targeted field (or on a note) is required.
#[must_use]
pub fn is_complete_for(form: &ParsedForm, issues: &[Issue], roles: Option<&[&str]>) -> bool {
    let targeted = |role: &str| roles.is_none_or(|roles| roles.contains(&role));

    let mut counts = ProgressCounts::default();
    for field in form.fields_in_order().filter(|f| targeted(&f.role)) {
        counts.record(form.response(&field.id).state, field.required);
    }

    let blocking = issues.iter().any(|issue| {
        issue.severity == Severity::Required
            && issue
                .field_id
                .as_deref()
                .and_then(|id| form.field(id))
                .is_none_or(|field| targeted(&field.role))
    });

    counts.all_accounted_for() && counts.aborted == 0 && !blocking
}
