//! The term type: a (field, text) pair.

use std::fmt;

/// A single indexable term.
///
/// Terms order lexicographically by field name, then by text, both over
/// UTF-8 bytes. The derived `Ord` gives exactly that, and every sorted
/// structure in the index (term dictionary, priority-queue merger) relies on
/// it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Term {
    /// The field this term belongs to.
    pub field: String,
    /// The term text.
    pub text: String,
}

impl Term {
    /// Create a new term.
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}
