//! The segmented index engine.

pub mod bit_vector;
pub mod field_infos;
#[allow(clippy::module_inception)]
pub mod index;
pub mod postings;
pub mod segment_infos;
pub mod segment_merger;
pub mod segment_reader;
pub mod segment_writer;
pub mod stored_fields;
pub mod term;
pub mod term_dictionary;
pub mod term_info;
pub mod terms_merger;
pub mod writer;

pub use self::bit_vector::BitVector;
pub use self::field_infos::{FieldInfo, FieldInfos};
pub use self::index::Index;
pub use self::segment_infos::{CompoundStatus, SegmentInfos, SegmentMeta};
pub use self::segment_reader::SegmentReader;
pub use self::term::Term;
pub use self::term_info::TermInfo;
pub use self::terms_merger::TermsMerger;
pub use self::writer::IndexWriter;
