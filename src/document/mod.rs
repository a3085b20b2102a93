//! Documents and their fields.

pub mod document;
pub mod field;

pub use self::document::Document;
pub use self::field::{Field, FieldValue};
