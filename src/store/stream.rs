//! Seekable binary streams with the Lucene numeric codecs.
//!
//! [`StreamReader`] and [`StreamWriter`] wrap any directory stream and speak
//! the Lucene 2.x wire vocabulary: unsigned bytes, big-endian i32/i64, VInts
//! (7 bits per byte, LSB first, high bit marks continuation), strings as a
//! VInt UTF-16 unit count followed by a modified-UTF-8 body (supplementary
//! characters stored as surrogate-pair pseudo-UTF-8), and binary blobs as a
//! VInt byte length followed by raw bytes.
//!
//! The same wrappers serve filesystem and in-memory streams, so both produce
//! byte-identical files for identical write sequences.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::directory::{FileInput, FileOutput};
use crate::error::{LucernaError, Result};

/// Reader over a boxed directory stream.
pub type InputStream = StreamReader<Box<dyn FileInput>>;
/// Writer over a boxed directory stream.
pub type OutputStream = StreamWriter<Box<dyn FileOutput>>;

/// A reader decoding Lucene binary primitives from an underlying stream.
#[derive(Debug)]
pub struct StreamReader<R: FileInput> {
    reader: R,
    position: u64,
}

impl<R: FileInput> StreamReader<R> {
    /// Wrap an input stream, starting at its current position zero.
    pub fn new(reader: R) -> Self {
        StreamReader {
            reader,
            position: 0,
        }
    }

    /// Current read position in bytes.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Total size of the underlying stream.
    pub fn size(&self) -> Result<u64> {
        self.reader.size()
    }

    /// Seek to an absolute or relative offset.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = self.reader.seek(pos)?;
        Ok(self.position)
    }

    /// Open an independent cursor over the same underlying bytes.
    pub fn clone_stream(&self) -> Result<StreamReader<Box<dyn FileInput>>> {
        Ok(StreamReader::new(self.reader.clone_input()?))
    }

    /// Consume the wrapper, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one unsigned byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; n];
        self.reader.read_exact(&mut bytes)?;
        self.position += n as u64;
        Ok(bytes)
    }

    /// Read a big-endian signed 32-bit integer.
    pub fn read_int(&mut self) -> Result<i32> {
        let value = self.reader.read_i32::<BigEndian>()?;
        self.position += 4;
        Ok(value)
    }

    /// Read a big-endian signed 64-bit integer.
    ///
    /// Full 64-bit precision is kept; generation and deletion-generation
    /// values depend on it.
    pub fn read_long(&mut self) -> Result<i64> {
        let value = self.reader.read_i64::<BigEndian>()?;
        self.position += 8;
        Ok(value)
    }

    /// Read a variable-length unsigned integer (at most five bytes).
    pub fn read_vint(&mut self) -> Result<u32> {
        let mut result = 0u32;
        let mut shift = 0;

        loop {
            let byte = self.read_byte()?;
            if shift >= 35 {
                return Err(LucernaError::invalid_format("VInt is too long"));
            }
            result |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a variable-length unsigned 64-bit integer (at most ten bytes).
    ///
    /// Same wire form as a VInt; used for file pointers and deltas that can
    /// exceed 32 bits.
    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;

        loop {
            let byte = self.read_byte()?;
            if shift >= 70 {
                return Err(LucernaError::invalid_format("VLong is too long"));
            }
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a string record as raw UTF-16 code units.
    ///
    /// The term dictionary needs this form: prefix-compressed suffixes may
    /// start or end inside a surrogate pair and only become valid text once
    /// recombined with the shared prefix.
    pub fn read_string_units(&mut self) -> Result<Vec<u16>> {
        let unit_count = self.read_vint()? as usize;
        let mut units = Vec::with_capacity(unit_count);

        for _ in 0..unit_count {
            let lead = self.read_byte()?;
            let unit = if lead & 0x80 == 0 {
                lead as u16
            } else if lead & 0xE0 == 0xC0 {
                let b1 = self.read_byte()?;
                (((lead & 0x1F) as u16) << 6) | ((b1 & 0x3F) as u16)
            } else if lead & 0xF0 == 0xE0 {
                let b1 = self.read_byte()?;
                let b2 = self.read_byte()?;
                (((lead & 0x0F) as u16) << 12)
                    | (((b1 & 0x3F) as u16) << 6)
                    | ((b2 & 0x3F) as u16)
            } else {
                return Err(LucernaError::invalid_format(format!(
                    "invalid string lead byte 0x{lead:02X}"
                )));
            };
            units.push(unit);
        }

        Ok(units)
    }

    /// Read a string: VInt UTF-16 unit count, then a modified-UTF-8 body.
    ///
    /// Supplementary-plane characters arrive as two 3-byte surrogate
    /// encodings and are recombined here; an unpaired surrogate or a stray
    /// continuation byte is an invalid-format error.
    pub fn read_string(&mut self) -> Result<String> {
        let units = self.read_string_units()?;
        String::from_utf16(&units)
            .map_err(|_| LucernaError::invalid_format("unpaired surrogate in string"))
    }

    /// Read a binary blob: VInt byte length, then raw bytes.
    pub fn read_binary(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vint()? as usize;
        self.read_bytes(len)
    }

    /// Close the underlying stream.
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}

/// A writer encoding Lucene binary primitives onto an underlying stream.
#[derive(Debug)]
pub struct StreamWriter<W: FileOutput> {
    writer: W,
    position: u64,
}

impl<W: FileOutput> StreamWriter<W> {
    /// Wrap an output stream.
    pub fn new(writer: W) -> Self {
        StreamWriter {
            writer,
            position: 0,
        }
    }

    /// Current write position in bytes.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Seek to an absolute or relative offset.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = self.writer.seek(pos)?;
        Ok(self.position)
    }

    /// Write one unsigned byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    /// Write raw bytes without any prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write a big-endian signed 32-bit integer.
    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.writer.write_i32::<BigEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    /// Write a big-endian signed 64-bit integer.
    pub fn write_long(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<BigEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length unsigned integer.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        let mut val = value;
        loop {
            let mut byte = (val & 0x7F) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80;
            }
            self.write_byte(byte)?;
            if val == 0 {
                return Ok(());
            }
        }
    }

    /// Write a variable-length unsigned 64-bit integer.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        let mut val = value;
        loop {
            let mut byte = (val & 0x7F) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80;
            }
            self.write_byte(byte)?;
            if val == 0 {
                return Ok(());
            }
        }
    }

    /// Write a string in the modified-UTF-8 wire form.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.write_string_units(&units)
    }

    /// Write a string record from raw UTF-16 code units.
    pub fn write_string_units(&mut self, units: &[u16]) -> Result<()> {
        self.write_vint(units.len() as u32)?;

        for &unit in units {
            if unit == 0 {
                // U+0000 takes the two-byte form on the wire.
                self.write_byte(0xC0)?;
                self.write_byte(0x80)?;
            } else if unit < 0x80 {
                self.write_byte(unit as u8)?;
            } else if unit < 0x800 {
                self.write_byte(0xC0 | (unit >> 6) as u8)?;
                self.write_byte(0x80 | (unit & 0x3F) as u8)?;
            } else {
                self.write_byte(0xE0 | (unit >> 12) as u8)?;
                self.write_byte(0x80 | ((unit >> 6) & 0x3F) as u8)?;
                self.write_byte(0x80 | (unit & 0x3F) as u8)?;
            }
        }
        Ok(())
    }

    /// Write a binary blob with a VInt byte-length prefix.
    pub fn write_binary(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_vint(bytes.len() as u32)?;
        self.write_bytes(bytes)
    }

    /// Flush buffered bytes.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, sync and close the underlying stream.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }
}

/// Number of bytes [`StreamWriter::write_string`] produces for `value`,
/// including the VInt length prefix.
pub fn encoded_string_len(value: &str) -> u64 {
    let units: Vec<u16> = value.encode_utf16().collect();
    let mut len = encoded_vint_len(units.len() as u32);
    for &unit in &units {
        len += if unit == 0 {
            2
        } else if unit < 0x80 {
            1
        } else if unit < 0x800 {
            2
        } else {
            3
        };
    }
    len
}

/// Number of bytes a VInt encoding of `value` occupies.
pub fn encoded_vint_len(value: u32) -> u64 {
    let mut len = 1;
    let mut val = value >> 7;
    while val != 0 {
        len += 1;
        val >>= 7;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, FsDirectory, RamDirectory};
    use tempfile::TempDir;

    // Mixed ASCII, BMP and supplementary-plane characters.
    const SAMPLE: &str = "search \u{0434}\u{0430} \u{10400}\u{1D11E} end";

    fn write_sequence(dir: &dyn Directory, name: &str) {
        let mut writer = StreamWriter::new(dir.create(name).unwrap());

        writer.write_byte(10).unwrap();
        writer
            .write_bytes(&[0xFF, 0x00, 0xAA, 0x11, 0xBB, 0x44, 0x66, 0x99])
            .unwrap();
        writer.write_int(49_057_123).unwrap();
        writer.write_long(753_823_522).unwrap();
        writer.write_vint(234_586_758).unwrap();
        writer.write_string(SAMPLE).unwrap();
        writer.write_vint(8).unwrap();
        writer
            .write_bytes(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08])
            .unwrap();
        writer.close().unwrap();
    }

    fn read_sequence(dir: &dyn Directory, name: &str) {
        let mut reader = StreamReader::new(dir.open_input(name, false).unwrap());

        assert_eq!(reader.read_byte().unwrap(), 10);
        assert_eq!(
            reader.read_bytes(8).unwrap(),
            vec![0xFF, 0x00, 0xAA, 0x11, 0xBB, 0x44, 0x66, 0x99]
        );
        assert_eq!(reader.read_int().unwrap(), 49_057_123);
        assert_eq!(reader.read_long().unwrap(), 753_823_522);
        assert_eq!(reader.read_vint().unwrap(), 234_586_758);
        assert_eq!(reader.read_string().unwrap(), SAMPLE);
        assert_eq!(reader.read_vint().unwrap(), 8);
        assert_eq!(
            reader.read_bytes(8).unwrap(),
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
        assert_eq!(reader.tell(), reader.size().unwrap());
    }

    #[test]
    fn test_codec_round_trip_ram() {
        let dir = RamDirectory::new();
        write_sequence(&dir, "seq.bin");
        read_sequence(&dir, "seq.bin");
    }

    #[test]
    fn test_codec_round_trip_fs() {
        let temp = TempDir::new().unwrap();
        let dir = FsDirectory::open(temp.path()).unwrap();
        write_sequence(&dir, "seq.bin");
        read_sequence(&dir, "seq.bin");
    }

    #[test]
    fn test_ram_and_fs_streams_are_byte_identical() {
        let ram = RamDirectory::new();
        let temp = TempDir::new().unwrap();
        let fs = FsDirectory::open(temp.path()).unwrap();

        write_sequence(&ram, "seq.bin");
        write_sequence(&fs, "seq.bin");

        assert_eq!(
            ram.read_all("seq.bin").unwrap(),
            fs.read_all("seq.bin").unwrap()
        );
    }

    #[test]
    fn test_vint_boundaries() {
        let dir = RamDirectory::new();
        let values = [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX];

        let mut writer = StreamWriter::new(dir.create("v").unwrap());
        for &value in &values {
            writer.write_vint(value).unwrap();
        }
        writer.close().unwrap();

        let mut reader = StreamReader::new(dir.open_input("v", false).unwrap());
        for &value in &values {
            assert_eq!(reader.read_vint().unwrap(), value);
        }
    }

    #[test]
    fn test_vlong_round_trip() {
        let dir = RamDirectory::new();
        let values = [0u64, 1, 127, 128, 1 << 31, (1 << 40) + 17, u64::MAX];

        let mut writer = StreamWriter::new(dir.create("v").unwrap());
        for &value in &values {
            writer.write_vlong(value).unwrap();
        }
        writer.close().unwrap();

        let mut reader = StreamReader::new(dir.open_input("v", false).unwrap());
        for &value in &values {
            assert_eq!(reader.read_vlong().unwrap(), value);
        }
    }

    #[test]
    fn test_vint_encoded_lengths() {
        assert_eq!(encoded_vint_len(0), 1);
        assert_eq!(encoded_vint_len(127), 1);
        assert_eq!(encoded_vint_len(128), 2);
        assert_eq!(encoded_vint_len(16_383), 2);
        assert_eq!(encoded_vint_len(16_384), 3);
        assert_eq!(encoded_vint_len(u32::MAX), 5);
    }

    #[test]
    fn test_overlong_vint_rejected() {
        let dir = RamDirectory::new();
        dir.create("v")
            .unwrap()
            .write_all(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01])
            .unwrap();

        let mut reader = StreamReader::new(dir.open_input("v", false).unwrap());
        assert!(matches!(
            reader.read_vint(),
            Err(LucernaError::InvalidFileFormat(_))
        ));
    }

    #[test]
    fn test_string_unit_count_is_utf16() {
        // One supplementary character counts as two units on the wire.
        let dir = RamDirectory::new();
        let mut writer = StreamWriter::new(dir.create("s").unwrap());
        writer.write_string("\u{10400}").unwrap();
        writer.close().unwrap();

        let bytes = dir.read_all("s").unwrap();
        // VInt 2, then two 3-byte surrogate encodings.
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes.len(), 7);
        assert_eq!(encoded_string_len("\u{10400}"), 7);

        let mut reader = StreamReader::new(dir.open_input("s", false).unwrap());
        assert_eq!(reader.read_string().unwrap(), "\u{10400}");
    }

    #[test]
    fn test_nul_takes_two_byte_form() {
        let dir = RamDirectory::new();
        let mut writer = StreamWriter::new(dir.create("s").unwrap());
        writer.write_string("a\u{0}b").unwrap();
        writer.close().unwrap();

        let bytes = dir.read_all("s").unwrap();
        assert_eq!(bytes, vec![3, b'a', 0xC0, 0x80, b'b']);

        let mut reader = StreamReader::new(dir.open_input("s", false).unwrap());
        assert_eq!(reader.read_string().unwrap(), "a\u{0}b");
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = RamDirectory::new();
        let blob = vec![0u8, 255, 1, 254, 127];

        let mut writer = StreamWriter::new(dir.create("b").unwrap());
        writer.write_binary(&blob).unwrap();
        writer.close().unwrap();

        let mut reader = StreamReader::new(dir.open_input("b", false).unwrap());
        assert_eq!(reader.read_binary().unwrap(), blob);
    }

    #[test]
    fn test_seek_and_tell() {
        let dir = RamDirectory::new();
        let mut writer = StreamWriter::new(dir.create("f").unwrap());
        writer.write_int(1).unwrap();
        writer.write_int(2).unwrap();
        writer.write_int(3).unwrap();
        writer.close().unwrap();

        let mut reader = StreamReader::new(dir.open_input("f", false).unwrap());
        reader.seek(SeekFrom::Start(8)).unwrap();
        assert_eq!(reader.tell(), 8);
        assert_eq!(reader.read_int().unwrap(), 3);

        reader.seek(SeekFrom::End(-12)).unwrap();
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.tell(), 4);
    }
}
