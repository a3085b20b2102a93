//! Small shared utilities.

pub mod base36;
pub mod levenshtein;

pub use self::base36::{from_base36, to_base36};
pub use self::levenshtein::levenshtein;
