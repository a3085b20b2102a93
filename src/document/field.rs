//! Field kinds and values.
//!
//! A field combines a named value with flags describing how it is handled at
//! index time. The constructors cover the usual kinds:
//!
//! | constructor  | stored | indexed | tokenized |
//! |--------------|--------|---------|-----------|
//! | `text`       | yes    | yes     | yes       |
//! | `un_stored`  | no     | yes     | yes       |
//! | `keyword`    | yes    | yes     | no        |
//! | `un_indexed` | yes    | no      | no        |
//! | `binary`     | yes    | no      | no        |

use crate::error::{LucernaError, Result};

/// The value held by a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// A raw byte blob; stored verbatim, never indexed.
    Binary(Vec<u8>),
}

impl FieldValue {
    /// The text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Binary(_) => None,
        }
    }

    /// The binary content, if this is a binary value.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Binary(bytes) => Some(bytes),
            FieldValue::Text(_) => None,
        }
    }
}

/// One named field of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name; case-sensitive, interned per segment at flush time.
    pub name: String,

    /// The field value.
    pub value: FieldValue,

    /// Whether the value is kept in the stored-fields stream.
    pub is_stored: bool,

    /// Whether the value participates in the inverted index.
    pub is_indexed: bool,

    /// Whether the value is run through the analyzer before indexing.
    /// Untokenized indexed fields index their value as a single term.
    pub is_tokenized: bool,

    /// Index-time boost folded into this field's norm byte.
    pub boost: f32,
}

impl Field {
    /// Tokenized, indexed and stored text.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            is_stored: true,
            is_indexed: true,
            is_tokenized: true,
            boost: 1.0,
        }
    }

    /// Tokenized and indexed text that is not stored.
    pub fn un_stored<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            is_stored: false,
            is_indexed: true,
            is_tokenized: true,
            boost: 1.0,
        }
    }

    /// Untokenized but indexed and stored text; the whole value is one term.
    pub fn keyword<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            is_stored: true,
            is_indexed: true,
            is_tokenized: false,
            boost: 1.0,
        }
    }

    /// Stored-only text; never searchable.
    pub fn un_indexed<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            is_stored: true,
            is_indexed: false,
            is_tokenized: false,
            boost: 1.0,
        }
    }

    /// Stored binary blob; never searchable.
    pub fn binary<N: Into<String>>(name: N, value: Vec<u8>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Binary(value),
            is_stored: true,
            is_indexed: false,
            is_tokenized: false,
            boost: 1.0,
        }
    }

    /// Set the index-time boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Whether the value is binary.
    pub fn is_binary(&self) -> bool {
        matches!(self.value, FieldValue::Binary(_))
    }

    /// The text content; an error for binary fields.
    pub fn text_value(&self) -> Result<&str> {
        self.value.as_text().ok_or_else(|| {
            LucernaError::invalid_argument(format!("field {} holds binary data", self.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_kinds() {
        let field = Field::text("title", "Hello");
        assert!(field.is_stored && field.is_indexed && field.is_tokenized);

        let field = Field::un_stored("contents", "body text");
        assert!(!field.is_stored && field.is_indexed && field.is_tokenized);

        let field = Field::keyword("path", "/var/log");
        assert!(field.is_stored && field.is_indexed && !field.is_tokenized);

        let field = Field::un_indexed("note", "not searchable");
        assert!(field.is_stored && !field.is_indexed);

        let field = Field::binary("payload", vec![1, 2, 3]);
        assert!(field.is_binary());
        assert!(!field.is_indexed);
    }

    #[test]
    fn test_text_value_of_binary_field_fails() {
        let field = Field::binary("payload", vec![1]);
        assert!(field.text_value().is_err());
        assert_eq!(field.value.as_binary(), Some(&[1u8][..]));
    }

    #[test]
    fn test_field_boost() {
        let field = Field::text("title", "x").with_boost(2.5);
        assert!((field.boost - 2.5).abs() < f32::EPSILON);
    }
}
