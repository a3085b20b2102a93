//! The per-segment field schema table (`.fnm`).
//!
//! Field names are interned per segment: every field mentioned by any
//! document gets a number, and the posting, norm and stored-fields files
//! refer to fields by number. On the wire the table is a VInt field count
//! followed by `{ String name, u8 bits }` records in field-number order.

use ahash::AHashMap;

use crate::directory::{FileInput, FileOutput};
use crate::error::{LucernaError, Result};
use crate::store::stream::{StreamReader, StreamWriter};

const IS_INDEXED: u8 = 0x01;
const STORE_TERM_VECTOR: u8 = 0x02;
const OMIT_NORMS: u8 = 0x10;

/// Schema entry for one field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name, unique within the segment.
    pub name: String,
    /// Field number; index into the table.
    pub number: u32,
    /// Whether any document indexes this field.
    pub is_indexed: bool,
    /// Whether term vectors were stored (read for compatibility, never
    /// written).
    pub store_term_vector: bool,
    /// Whether norms were omitted for this field.
    pub omit_norms: bool,
}

/// The field table of one segment.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    /// Create an empty table.
    pub fn new() -> Self {
        FieldInfos::default()
    }

    /// Intern a field name, returning its number. Re-adding an existing
    /// field upgrades its indexed flag.
    pub fn add(&mut self, name: &str, is_indexed: bool) -> u32 {
        if let Some(&number) = self.by_name.get(name) {
            if is_indexed {
                self.fields[number as usize].is_indexed = true;
            }
            return number;
        }
        let number = self.fields.len() as u32;
        self.fields.push(FieldInfo {
            name: name.to_string(),
            number,
            is_indexed,
            store_term_vector: false,
            omit_norms: false,
        });
        self.by_name.insert(name.to_string(), number);
        number
    }

    /// Look up a field by number.
    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.get(number as usize)
    }

    /// Look up a field by number, failing with an invalid-format error.
    pub fn required_by_number(&self, number: u32) -> Result<&FieldInfo> {
        self.by_number(number).ok_or_else(|| {
            LucernaError::invalid_format(format!("unknown field number {number}"))
        })
    }

    /// Look up a field number by name.
    pub fn number_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Look up a field by name.
    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.number_of(name).and_then(|n| self.by_number(n))
    }

    /// All fields in number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    /// Fields that are indexed, in number order.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|field| field.is_indexed)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a `.fnm` stream.
    pub fn read<R: FileInput>(reader: &mut StreamReader<R>) -> Result<Self> {
        let count = reader.read_vint()? as usize;
        let mut infos = FieldInfos::new();

        for number in 0..count {
            let name = reader.read_string()?;
            let bits = reader.read_byte()?;
            if infos.by_name.contains_key(&name) {
                return Err(LucernaError::invalid_format(format!(
                    "duplicate field {name} in field table"
                )));
            }
            infos.fields.push(FieldInfo {
                name: name.clone(),
                number: number as u32,
                is_indexed: bits & IS_INDEXED != 0,
                store_term_vector: bits & STORE_TERM_VECTOR != 0,
                omit_norms: bits & OMIT_NORMS != 0,
            });
            infos.by_name.insert(name, number as u32);
        }

        Ok(infos)
    }

    /// Emit the table as a `.fnm` stream.
    pub fn write<W: FileOutput>(&self, writer: &mut StreamWriter<W>) -> Result<()> {
        writer.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            let mut bits = 0u8;
            if field.is_indexed {
                bits |= IS_INDEXED;
            }
            if field.store_term_vector {
                bits |= STORE_TERM_VECTOR;
            }
            if field.omit_norms {
                bits |= OMIT_NORMS;
            }
            writer.write_string(&field.name)?;
            writer.write_byte(bits)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, RamDirectory};

    #[test]
    fn test_interning() {
        let mut infos = FieldInfos::new();

        assert_eq!(infos.add("title", true), 0);
        assert_eq!(infos.add("path", false), 1);
        assert_eq!(infos.add("title", true), 0);
        assert_eq!(infos.len(), 2);

        assert_eq!(infos.number_of("path"), Some(1));
        assert_eq!(infos.by_number(0).unwrap().name, "title");
        assert!(infos.number_of("missing").is_none());
    }

    #[test]
    fn test_indexed_flag_upgrade() {
        let mut infos = FieldInfos::new();
        infos.add("f", false);
        assert!(!infos.by_name("f").unwrap().is_indexed);
        infos.add("f", true);
        assert!(infos.by_name("f").unwrap().is_indexed);
    }

    #[test]
    fn test_wire_round_trip() {
        let mut infos = FieldInfos::new();
        infos.add("contents", true);
        infos.add("path", true);
        infos.add("note", false);

        let dir = RamDirectory::new();
        let mut writer = StreamWriter::new(dir.create("_1.fnm").unwrap());
        infos.write(&mut writer).unwrap();
        writer.close().unwrap();

        let mut reader = StreamReader::new(dir.open_input("_1.fnm", false).unwrap());
        let read_back = FieldInfos::read(&mut reader).unwrap();

        assert_eq!(read_back.len(), 3);
        assert_eq!(read_back.by_number(0).unwrap().name, "contents");
        assert!(read_back.by_number(0).unwrap().is_indexed);
        assert_eq!(read_back.by_number(2).unwrap().name, "note");
        assert!(!read_back.by_number(2).unwrap().is_indexed);
        assert_eq!(
            read_back.indexed_fields().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["contents", "path"]
        );
    }
}
