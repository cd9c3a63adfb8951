//! `UniFFI` bindings for the form engine
//!
//! Structured inputs and outputs (patches, issues, apply results, exports) cross
//! the boundary as JSON strings so the binding surface stays small.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::error::MarkformError;
use crate::formats::{WRITER_NAMES, export_schema, serialize, writer_for};
use crate::harness::filter_issues_for_turn;
use crate::models::ParsedForm;
use crate::patch::{ApplyOptions, Patch, apply_patches};
use crate::progress::{compute_progress, is_complete_for};
use crate::validate::validate;

/// Counts and completion state of a form
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProgress {
    pub total: u32,
    pub required: u32,
    pub answered: u32,
    pub skipped: u32,
    pub aborted: u32,
    pub empty: u32,
    pub total_notes: u32,
    pub form_state: String,
    pub is_complete: bool,
}

/// Error type for `MarkformDocument` operations
#[derive(Debug, Error, uniffi::Error)]
pub enum FfiError {
    #[error("Failed to parse form: {0}")]
    Parse(String),
    #[error("Invalid form: {0}")]
    Validation(String),
    #[error("Failed to write form: {0}")]
    Serialize(String),
    #[error("Invalid JSON input: {0}")]
    InvalidJson(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    /// A previous call panicked while holding the form
    #[error("Form state is unavailable after an earlier failure")]
    Poisoned,
}

impl From<MarkformError> for FfiError {
    fn from(err: MarkformError) -> Self {
        match err {
            MarkformError::Parse(e) => Self::Parse(e.to_string()),
            MarkformError::Validation(e) => Self::Validation(e.to_string()),
            MarkformError::Serialize(e) => Self::Serialize(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for FfiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// A parsed form shared with foreign code
#[derive(uniffi::Object)]
pub struct MarkformDocument {
    form: Mutex<ParsedForm>,
}

impl MarkformDocument {
    fn form(&self) -> Result<MutexGuard<'_, ParsedForm>, FfiError> {
        self.form.lock().map_err(|_| FfiError::Poisoned)
    }
}

#[uniffi::export]
impl MarkformDocument {
    /// Parse a form document
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or inconsistent markup
    #[uniffi::constructor]
    pub fn parse(text: &str) -> Result<Self, FfiError> {
        Ok(Self {
            form: Mutex::new(crate::parser::parse(text)?),
        })
    }

    /// Form id
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn id(&self) -> Result<String, FfiError> {
        Ok(self.form()?.schema.id.clone())
    }

    /// Field ids in document order
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn field_ids(&self) -> Result<Vec<String>, FfiError> {
        Ok(self.form()?.order_index.clone())
    }

    /// Write the form back as canonical markup
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be written
    pub fn serialize(&self) -> Result<String, FfiError> {
        let form = self.form()?;
        serialize(&form).map_err(|e| FfiError::Serialize(e.to_string()))
    }

    /// Write the form in a named format, see `writer_names`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format or a value the format cannot hold
    pub fn export(&self, format: String) -> Result<String, FfiError> {
        let writer = writer_for(&format).ok_or(FfiError::UnsupportedFormat(format))?;
        let form = self.form()?;
        writer
            .write(&form)
            .map_err(|e| FfiError::Serialize(e.to_string()))
    }

    /// Field definitions as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn schema_json(&self) -> Result<String, FfiError> {
        let form = self.form()?;
        Ok(serde_json::to_string(&export_schema(&form))?)
    }

    /// Outstanding issues as a JSON array
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn validate_json(&self) -> Result<String, FfiError> {
        let form = self.form()?;
        Ok(serde_json::to_string(&validate(&form))?)
    }

    /// Issues for the next agent turn, capped by the frontmatter harness settings
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn turn_issues_json(&self) -> Result<String, FfiError> {
        let form = self.form()?;
        let issues = validate(&form);
        let issues = match form.harness_config() {
            Some(config) => filter_issues_for_turn(&issues, &form.schema, config),
            None => issues,
        };
        Ok(serde_json::to_string(&issues)?)
    }

    /// Progress counts and completion state
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn progress(&self) -> Result<FfiProgress, FfiError> {
        let form = self.form()?;
        let summary = compute_progress(&form, &validate(&form));
        let counts = summary.counts;
        Ok(FfiProgress {
            total: count(counts.total),
            required: count(counts.required),
            answered: count(counts.answered),
            skipped: count(counts.skipped),
            aborted: count(counts.aborted),
            empty: count(counts.empty),
            total_notes: count(counts.total_notes),
            form_state: summary.form_state.as_str().to_string(),
            is_complete: summary.is_complete,
        })
    }

    /// Completion for the fields owned by one role
    ///
    /// # Errors
    ///
    /// Returns an error if the form state is poisoned
    pub fn is_complete_for_role(&self, role: String) -> Result<bool, FfiError> {
        let form = self.form()?;
        Ok(is_complete_for(&form, &validate(&form), Some(&[role.as_str()])))
    }

    /// Apply a JSON array of patches; returns the JSON apply result
    ///
    /// # Errors
    ///
    /// Returns an error if `patches` is not a valid patch array. Rejected patches are
    /// reported in the result, not as an error.
    pub fn apply_patches_json(
        &self,
        patches: &str,
        stop_on_error: bool,
    ) -> Result<String, FfiError> {
        let patches: Vec<Patch> = serde_json::from_str(patches)?;
        let mut form = self.form()?;
        let result = apply_patches(&mut form, &patches, ApplyOptions { stop_on_error });
        Ok(serde_json::to_string(&result)?)
    }
}

/// Format names accepted by `MarkformDocument::export`
#[uniffi::export]
#[must_use]
pub fn writer_names() -> Vec<String> {
    WRITER_NAMES.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"{% form id="f" %}
{% field kind="number" id="n" label="N" required=true %}{% /field %}
{% /form %}
"#;

    #[test]
    fn patches_cross_as_json() {
        let doc = MarkformDocument::parse(FORM).unwrap();
        assert_eq!(doc.progress().unwrap().form_state, "incomplete");

        let result = doc
            .apply_patches_json(r#"[{"op":"set_number","fieldId":"n","value":3}]"#, false)
            .unwrap();
        let result: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(result["applied"], 1);

        let progress = doc.progress().unwrap();
        assert!(progress.is_complete);
        assert_eq!(progress.form_state, "complete");
        assert!(doc.serialize().unwrap().contains("```value\n3\n```"));
    }

    #[test]
    fn read_only_views_share_the_locked_form() {
        let doc = MarkformDocument::parse(FORM).unwrap();
        assert_eq!(doc.id().unwrap(), "f");
        assert_eq!(doc.field_ids().unwrap(), vec!["n".to_string()]);
        assert!(doc.serialize().unwrap().contains(r#"id="n""#));
        assert!(doc.export("json".into()).unwrap().contains("\"n\""));

        let schema: serde_json::Value = serde_json::from_str(&doc.schema_json().unwrap()).unwrap();
        assert_eq!(schema["id"], "f");
        let issues: serde_json::Value = serde_json::from_str(&doc.validate_json().unwrap()).unwrap();
        assert_eq!(issues.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(matches!(
            MarkformDocument::parse("{% form %}"),
            Err(FfiError::Parse(_) | FfiError::Validation(_))
        ));
        let doc = MarkformDocument::parse(FORM).unwrap();
        assert!(matches!(doc.apply_patches_json("{", false), Err(FfiError::InvalidJson(_))));
        assert!(matches!(
            doc.export("org".into()),
            Err(FfiError::UnsupportedFormat(_))
        ));
    }
}
