//! The document type: a bag of named fields.

use crate::document::field::Field;
use crate::error::{LucernaError, Result};

/// A document, at write time an open bag of fields waiting to be flushed,
/// at read time the decoded stored fields of one indexed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<Field>,
    boost: f32,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document {
            fields: Vec::new(),
            boost: 1.0,
        }
    }

    /// Add a field. Multiple fields may share one name; their tokens are
    /// indexed as if the values were concatenated.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Builder-style [`Document::add_field`].
    pub fn with_field(mut self, field: Field) -> Self {
        self.add_field(field);
        self
    }

    /// Document-level boost folded into every field norm at flush time.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Set the document-level boost.
    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The first field with the given name, if any.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// The first field with the given name, or an invalid-argument error.
    pub fn required_field(&self, name: &str) -> Result<&Field> {
        self.field(name)
            .ok_or_else(|| LucernaError::invalid_argument(format!("no field named {name}")))
    }

    /// Names of all fields, in insertion order, without duplicates.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !names.contains(&field.name.as_str()) {
                names.push(&field.name);
            }
        }
        names
    }

    /// Number of fields (counting duplicates).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_fields() {
        let doc = Document::new()
            .with_field(Field::text("title", "Hello"))
            .with_field(Field::keyword("path", "/tmp"))
            .with_field(Field::text("title", "Again"));

        assert_eq!(doc.len(), 3);
        assert_eq!(doc.field_names(), vec!["title", "path"]);
        assert_eq!(
            doc.field("title").unwrap().value.as_text(),
            Some("Hello")
        );
        assert!(doc.field("missing").is_none());
        assert!(doc.required_field("missing").is_err());
    }

    #[test]
    fn test_document_boost() {
        let mut doc = Document::new();
        assert!((doc.boost() - 1.0).abs() < f32::EPSILON);
        doc.set_boost(3.0);
        assert!((doc.boost() - 3.0).abs() < f32::EPSILON);
    }
}
