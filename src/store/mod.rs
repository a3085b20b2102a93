//! Binary stream codecs and the compound-file container.

pub mod compound;
pub mod stream;

pub use self::compound::{CompoundFileReader, CompoundFileWriter};
pub use self::stream::{InputStream, OutputStream, StreamReader, StreamWriter};
