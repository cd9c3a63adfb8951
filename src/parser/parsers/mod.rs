//! Response parsers for the three field syntaxes

pub mod checkboxes;
pub mod table;
pub mod text;

pub use checkboxes::CheckboxParser;
pub use table::TableParser;
pub use text::TextParser;
