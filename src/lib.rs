#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

uniffi::setup_scaffolding!();

pub mod document;
pub mod error;
pub mod ffi;
pub mod formats;
pub mod harness;
pub mod models;
pub mod parser;
pub mod patch;
pub mod progress;
pub mod refs;
pub mod validate;

// Re-export common error types for convenience
pub use error::{
    MarkformError, MarkformResult, ParseError, ParseResult, PatchError, PatchErrorKind,
    PatchResult, SerializeError, SerializeResult, ValidationError, ValidationErrorKind,
    ValidationResult,
};

// The engine entry points
pub use formats::{ExportMode, SerializeOptions, export_schema, export_values, serialize};
pub use harness::filter_issues_for_turn;
pub use models::{FieldKind, FieldResponse, FieldValue, ParsedForm, ResponseState};
pub use parser::parse;
pub use patch::{ApplyOptions, ApplyResult, Patch, PatchOutcome, apply_patches};
pub use progress::{ProgressSummary, compute_progress, is_complete_for};
pub use refs::{ParsedRef, Scope, parse_ref, resolve_ref};
pub use validate::{Issue, validate};
