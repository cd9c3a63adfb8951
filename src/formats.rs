use std::fmt::Debug;

use crate::error::SerializeResult;
use crate::models::{ParsedForm, TagStyle};

pub mod export;
pub mod markform;

pub use export::{ExportEncoding, ExportMode, ValuesWriter, export_schema, export_values, export_yaml};
pub use markform::{MarkformWriter, SerializeOptions, serialize, serialize_with};

/// An output format a parsed form can be written to
pub trait FormWriter: Send + Sync + Debug {
    /// Short name of the format, as accepted by `writer_for`
    fn name(&self) -> &'static str;

    /// Write a form into this format
    ///
    /// # Errors
    ///
    /// Returns an error when some value cannot be represented in the format
    fn write(&self, form: &ParsedForm) -> SerializeResult<String>;
}

/// Names accepted by `writer_for`
pub const WRITER_NAMES: [&str; 7] = [
    "markform",
    "markform-bracket",
    "markform-comment",
    "json",
    "json-friendly",
    "yaml",
    "yaml-friendly",
];

/// Look up a writer by format name
#[must_use]
pub fn writer_for(name: &str) -> Option<Box<dyn FormWriter>> {
    let writer: Box<dyn FormWriter> = match name {
        "markform" => Box::new(MarkformWriter::default()),
        "markform-bracket" => Box::new(MarkformWriter::new(SerializeOptions {
            style: Some(TagStyle::Bracket),
        })),
        "markform-comment" => Box::new(MarkformWriter::new(SerializeOptions {
            style: Some(TagStyle::Comment),
        })),
        "json" => Box::new(ValuesWriter::new(ExportMode::Structured, ExportEncoding::Json)),
        "json-friendly" => Box::new(ValuesWriter::new(ExportMode::Friendly, ExportEncoding::Json)),
        "yaml" => Box::new(ValuesWriter::new(ExportMode::Structured, ExportEncoding::Yaml)),
        "yaml-friendly" => Box::new(ValuesWriter::new(ExportMode::Friendly, ExportEncoding::Yaml)),
        _ => return None,
    };
    Some(writer)
}
