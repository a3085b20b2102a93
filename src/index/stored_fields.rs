//! The stored-fields stream: `.fdx` pointer file and `.fdt` data file.
//!
//! `.fdx` holds one i64 per document pointing into `.fdt`. Each `.fdt`
//! record is a VInt stored-field count followed by
//! `{ VInt fieldNum, u8 bits, value }` triples, where the value is a string
//! or a VInt-length binary blob depending on the bits.

use std::io::SeekFrom;
use std::sync::Arc;

use crate::directory::{FileInput, FileOutput};
use crate::document::{Document, Field, FieldValue};
use crate::error::{LucernaError, Result};
use crate::index::field_infos::FieldInfos;
use crate::store::stream::{StreamReader, StreamWriter};

const FIELD_IS_TOKENIZED: u8 = 0x01;
const FIELD_IS_BINARY: u8 = 0x02;
const FIELD_IS_COMPRESSED: u8 = 0x04;

/// Reader over one segment's stored fields.
///
/// `offset` supports shared doc stores: a segment whose stored fields live
/// in another segment's files reads them at `offset + local id`.
#[derive(Debug)]
pub struct FieldsReader {
    fdx: StreamReader<Box<dyn FileInput>>,
    fdt: StreamReader<Box<dyn FileInput>>,
    field_infos: Arc<FieldInfos>,
    offset: u32,
    doc_count: u32,
}

impl FieldsReader {
    /// Create a reader over the two streams.
    pub fn new(
        fdx: Box<dyn FileInput>,
        fdt: Box<dyn FileInput>,
        field_infos: Arc<FieldInfos>,
        offset: u32,
        doc_count: u32,
    ) -> Self {
        FieldsReader {
            fdx: StreamReader::new(fdx),
            fdt: StreamReader::new(fdt),
            field_infos,
            offset,
            doc_count,
        }
    }

    /// Fetch the stored fields of one document.
    pub fn doc(&mut self, n: u32) -> Result<Document> {
        if n >= self.doc_count {
            return Err(LucernaError::out_of_range(format!(
                "document {n} is out of range ({} documents)",
                self.doc_count
            )));
        }

        self.fdx
            .seek(SeekFrom::Start((self.offset as u64 + n as u64) * 8))?;
        let pointer = self.fdx.read_long()?;
        if pointer < 0 {
            return Err(LucernaError::invalid_format("negative stored-field pointer"));
        }
        self.fdt.seek(SeekFrom::Start(pointer as u64))?;

        let field_count = self.fdt.read_vint()?;
        let mut document = Document::new();
        for _ in 0..field_count {
            let field_num = self.fdt.read_vint()?;
            let info = self.field_infos.required_by_number(field_num)?;
            let bits = self.fdt.read_byte()?;
            if bits & FIELD_IS_COMPRESSED != 0 {
                return Err(LucernaError::runtime(
                    "Compressed stored fields are not supported",
                ));
            }

            let field = if bits & FIELD_IS_BINARY != 0 {
                Field::binary(&info.name, self.fdt.read_binary()?)
            } else {
                Field {
                    name: info.name.clone(),
                    value: FieldValue::Text(self.fdt.read_string()?),
                    is_stored: true,
                    is_indexed: info.is_indexed,
                    is_tokenized: bits & FIELD_IS_TOKENIZED != 0,
                    boost: 1.0,
                }
            };
            document.add_field(field);
        }
        Ok(document)
    }
}

/// Writer producing a segment's `.fdx`/`.fdt` pair.
pub struct FieldsWriter {
    fdx: StreamWriter<Box<dyn FileOutput>>,
    fdt: StreamWriter<Box<dyn FileOutput>>,
}

impl FieldsWriter {
    /// Wrap the two output streams.
    pub fn new(fdx: Box<dyn FileOutput>, fdt: Box<dyn FileOutput>) -> Self {
        FieldsWriter {
            fdx: StreamWriter::new(fdx),
            fdt: StreamWriter::new(fdt),
        }
    }

    /// Append one document's stored fields.
    pub fn add_document(&mut self, document: &Document, field_infos: &FieldInfos) -> Result<()> {
        self.fdx.write_long(self.fdt.tell() as i64)?;

        let stored: Vec<&Field> = document
            .fields()
            .iter()
            .filter(|field| field.is_stored)
            .collect();
        self.fdt.write_vint(stored.len() as u32)?;

        for field in stored {
            let field_num = field_infos.number_of(&field.name).ok_or_else(|| {
                LucernaError::invalid_argument(format!(
                    "field {} is missing from the field table",
                    field.name
                ))
            })?;
            self.fdt.write_vint(field_num)?;

            let mut bits = 0u8;
            if field.is_tokenized {
                bits |= FIELD_IS_TOKENIZED;
            }
            match &field.value {
                FieldValue::Binary(bytes) => {
                    bits |= FIELD_IS_BINARY;
                    self.fdt.write_byte(bits)?;
                    self.fdt.write_binary(bytes)?;
                }
                FieldValue::Text(text) => {
                    self.fdt.write_byte(bits)?;
                    self.fdt.write_string(text)?;
                }
            }
        }
        Ok(())
    }

    /// Flush and close both streams.
    pub fn close(mut self) -> Result<()> {
        self.fdx.close()?;
        self.fdt.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, RamDirectory};

    fn field_table() -> Arc<FieldInfos> {
        let mut infos = FieldInfos::new();
        infos.add("title", true);
        infos.add("contents", true);
        infos.add("payload", false);
        Arc::new(infos)
    }

    #[test]
    fn test_stored_fields_round_trip() {
        let dir = RamDirectory::new();
        let infos = field_table();

        let first = Document::new()
            .with_field(Field::text("title", "First"))
            .with_field(Field::un_stored("contents", "not stored"))
            .with_field(Field::binary("payload", vec![0, 1, 2]));
        let second = Document::new().with_field(Field::keyword("title", "Second"));

        let mut writer =
            FieldsWriter::new(dir.create("_0.fdx").unwrap(), dir.create("_0.fdt").unwrap());
        writer.add_document(&first, &infos).unwrap();
        writer.add_document(&second, &infos).unwrap();
        writer.close().unwrap();

        let mut reader = FieldsReader::new(
            dir.open_input("_0.fdx", false).unwrap(),
            dir.open_input("_0.fdt", false).unwrap(),
            infos,
            0,
            2,
        );

        // Unstored fields do not come back.
        let doc = reader.doc(0).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.field("title").unwrap().value.as_text(), Some("First"));
        assert!(doc.field("title").unwrap().is_tokenized);
        assert_eq!(
            doc.field("payload").unwrap().value.as_binary(),
            Some(&[0u8, 1, 2][..])
        );
        assert!(doc.field("contents").is_none());

        // Documents are independently addressable in any order.
        let doc = reader.doc(1).unwrap();
        assert_eq!(doc.field("title").unwrap().value.as_text(), Some("Second"));
        assert!(!doc.field("title").unwrap().is_tokenized);
        let doc = reader.doc(0).unwrap();
        assert_eq!(doc.field("title").unwrap().value.as_text(), Some("First"));
    }

    #[test]
    fn test_out_of_range_doc() {
        let dir = RamDirectory::new();
        let infos = field_table();

        let mut writer =
            FieldsWriter::new(dir.create("_0.fdx").unwrap(), dir.create("_0.fdt").unwrap());
        writer
            .add_document(&Document::new().with_field(Field::text("title", "x")), &infos)
            .unwrap();
        writer.close().unwrap();

        let mut reader = FieldsReader::new(
            dir.open_input("_0.fdx", false).unwrap(),
            dir.open_input("_0.fdt", false).unwrap(),
            infos,
            0,
            1,
        );
        assert!(matches!(reader.doc(1), Err(LucernaError::OutOfRange(_))));
    }
}
