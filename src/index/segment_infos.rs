//! The segment set: `segments_N` files, generations and the witness
//! protocol.
//!
//! A generation is the integer tag of the current segments file. Generation
//! 0 is the plain `segments` file written by pre-2.1 indexes; later
//! generations live in `segments_N` with N in base-36. The `segments.gen`
//! witness file names the current generation twice; readers only trust a
//! generation after seeing both copies agree.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::directory::Directory;
use crate::error::{LucernaError, Result};
use crate::store::stream::{StreamReader, StreamWriter};
use crate::util::base36::to_base36;

/// Marker of pre-2.1 segments files.
pub const FORMAT_PRE_21: i32 = -1; // 0xFFFFFFFF
/// Marker of 2.1 segments files.
pub const FORMAT_21: i32 = -3; // 0xFFFFFFFD
/// Marker of 2.3 segments files.
pub const FORMAT_23: i32 = -4; // 0xFFFFFFFC
/// Marker of the `segments.gen` witness file.
const GEN_FORMAT: i32 = -2; // 0xFFFFFFFE

/// Sentinel doc-store offset for segments with their own stored fields.
pub const NO_DOC_STORE: i32 = -1;

/// Name of the plain generation-0 segments file.
pub const SEGMENTS_NAME: &str = "segments";
/// Name of the generation witness file.
pub const SEGMENTS_GEN_NAME: &str = "segments.gen";

const GEN_RETRIES: usize = 10;
const GEN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Compound-file status of a segment, as stored in the segments file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundStatus {
    /// Segment files are plain (`0xFF`).
    No,
    /// Segment files are packed into a `.cfs` container (`0x01`).
    Yes,
    /// Not recorded (`0x00`); readers probe both layouts.
    Unknown,
}

impl CompoundStatus {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0xFF => Ok(CompoundStatus::No),
            0x01 => Ok(CompoundStatus::Yes),
            0x00 => Ok(CompoundStatus::Unknown),
            other => Err(LucernaError::invalid_format(format!(
                "invalid compound-file status byte 0x{other:02X}"
            ))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            CompoundStatus::No => 0xFF,
            CompoundStatus::Yes => 0x01,
            CompoundStatus::Unknown => 0x00,
        }
    }
}

/// Metadata of one segment as recorded in the segments file.
#[derive(Debug, Clone)]
pub struct SegmentMeta {
    /// Segment name, unique within the index (`_0`, `_1`, ...).
    pub name: String,
    /// Number of documents at creation time, deleted ones included.
    pub doc_count: u32,
    /// Deletion generation: -1 none, 0 legacy `<name>.del`, otherwise the
    /// base-36 suffix of `<name>_<gen>.del`.
    pub del_gen: i64,
    /// Offset into a shared doc store, or [`NO_DOC_STORE`].
    pub doc_store_offset: i32,
    /// Name of the shared doc-store segment, when offset is set.
    pub doc_store_segment: Option<String>,
    /// Whether the shared doc store is compound-packed.
    pub doc_store_is_compound: bool,
    /// Whether norms live in a single `.nrm` file.
    pub has_single_norm_file: bool,
    /// Compound-file status.
    pub compound: CompoundStatus,
}

impl SegmentMeta {
    /// Metadata for a freshly written segment.
    pub fn new(name: &str, doc_count: u32, compound: CompoundStatus) -> Self {
        SegmentMeta {
            name: name.to_string(),
            doc_count,
            del_gen: -1,
            doc_store_offset: NO_DOC_STORE,
            doc_store_segment: None,
            doc_store_is_compound: false,
            has_single_norm_file: true,
            compound,
        }
    }

    /// Whether a deletion bitvector exists for this segment.
    pub fn has_deletions(&self) -> bool {
        self.del_gen >= 0
    }

    /// File name of the current deletion bitvector, if any.
    pub fn del_file_name(&self) -> Option<String> {
        match self.del_gen {
            g if g < 0 => None,
            0 => Some(format!("{}.del", self.name)),
            g => Some(format!("{}_{}.del", self.name, to_base36(g as u64))),
        }
    }

    /// Deletion generation the next materialised bitvector will carry.
    pub fn next_del_gen(&self) -> i64 {
        if self.del_gen < 1 { 1 } else { self.del_gen + 1 }
    }

    /// Every file in the directory belonging to this segment.
    pub fn file_names(&self, directory: &Arc<dyn Directory>) -> Result<Vec<String>> {
        let prefix = format!("{}.", self.name);
        let del_prefix = format!("{}_", self.name);
        let names = directory
            .list()?
            .into_iter()
            .filter(|name| {
                name.starts_with(&prefix)
                    || (name.starts_with(&del_prefix) && name.ends_with(".del"))
            })
            .collect();
        Ok(names)
    }
}

/// The live segment set of one generation, plus the counters persisted
/// alongside it.
#[derive(Debug, Clone)]
pub struct SegmentInfos {
    format: i32,
    version: i64,
    counter: u32,
    generation: i64,
    segments: Vec<SegmentMeta>,
}

impl Default for SegmentInfos {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentInfos {
    /// An empty segment set for a fresh index.
    pub fn new() -> Self {
        SegmentInfos {
            format: FORMAT_23,
            version: 0,
            counter: 0,
            generation: 0,
            segments: Vec::new(),
        }
    }

    /// The format marker this set was read with (or will be written with).
    pub fn format(&self) -> i32 {
        self.format
    }

    /// Pin the output format. Only the 2.1 and 2.3 formats can be written;
    /// the conversion happens at the next commit.
    pub fn set_format(&mut self, format: i32) -> Result<()> {
        if format != FORMAT_21 && format != FORMAT_23 {
            return Err(LucernaError::invalid_argument(format!(
                "unsupported segments output format {format}"
            )));
        }
        self.format = format;
        Ok(())
    }

    /// Version counter, incremented on every write.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Generation this set was read from (0 for a fresh or pre-2.1 index).
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Live segments in order; the order defines global doc-id assignment.
    pub fn segments(&self) -> &[SegmentMeta] {
        &self.segments
    }

    /// Mutable access to the live segments.
    pub fn segments_mut(&mut self) -> &mut Vec<SegmentMeta> {
        &mut self.segments
    }

    /// Total doc count across segments, deleted documents included.
    pub fn total_doc_count(&self) -> u32 {
        self.segments.iter().map(|s| s.doc_count).sum()
    }

    /// Allocate the next segment name from the persisted counter.
    pub fn next_segment_name(&mut self) -> String {
        let name = format!("_{}", to_base36(self.counter as u64));
        self.counter += 1;
        name
    }

    /// Name of the segments file for a generation.
    pub fn segments_file_name(generation: i64) -> String {
        if generation <= 0 {
            SEGMENTS_NAME.to_string()
        } else {
            format!("segments_{}", to_base36(generation as u64))
        }
    }

    /// Run the generation-witness protocol.
    ///
    /// Reads `segments.gen` and returns its generation once both recorded
    /// copies agree, sleeping 50 ms between attempts. When the witness file
    /// is unreadable, falls back to probing the plain `segments` file
    /// (generation 0) and finally to -1, meaning no index.
    pub fn current_generation(directory: &Arc<dyn Directory>) -> Result<i64> {
        for _ in 0..GEN_RETRIES {
            match directory.open_input(SEGMENTS_GEN_NAME, false) {
                Ok(input) => {
                    let mut reader = StreamReader::new(input);
                    let format = reader.read_int()?;
                    if format != GEN_FORMAT {
                        return Err(LucernaError::invalid_format(format!(
                            "unknown segments.gen format {format}"
                        )));
                    }
                    let generation = reader.read_long()?;
                    let repeat = reader.read_long()?;
                    if generation == repeat {
                        return Ok(generation);
                    }
                    thread::sleep(GEN_RETRY_DELAY);
                }
                Err(LucernaError::NotReadable(_)) => {
                    return Ok(if directory.exists(SEGMENTS_NAME) { 0 } else { -1 });
                }
                Err(e) => return Err(e),
            }
        }
        Err(LucernaError::runtime("Index is under processing now"))
    }

    /// Read the segment set of the current generation.
    pub fn read_current(directory: &Arc<dyn Directory>) -> Result<Self> {
        let generation = Self::current_generation(directory)?;
        if generation < 0 {
            return Err(LucernaError::runtime(
                "Index does not exist in the specified directory",
            ));
        }
        Self::read(directory, generation)
    }

    /// Read the segment set of one generation.
    pub fn read(directory: &Arc<dyn Directory>, generation: i64) -> Result<Self> {
        let name = Self::segments_file_name(generation);
        let mut reader = StreamReader::new(directory.open_input(&name, false)?);

        let format = reader.read_int()?;
        if format != FORMAT_PRE_21 && format != FORMAT_21 && format != FORMAT_23 {
            return Err(LucernaError::invalid_format(format!(
                "unknown segments file format {format}"
            )));
        }

        let version = reader.read_long()?;
        let counter = reader.read_int()?;
        if counter < 0 {
            return Err(LucernaError::invalid_format("negative segment counter"));
        }
        let segment_count = reader.read_int()?;
        if segment_count < 0 {
            return Err(LucernaError::invalid_format("negative segment count"));
        }

        let mut segments = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            let seg_name = reader.read_string()?;
            let doc_count = reader.read_int()?;
            if doc_count < 0 {
                return Err(LucernaError::invalid_format("negative segment size"));
            }

            let mut meta = SegmentMeta::new(&seg_name, doc_count as u32, CompoundStatus::Unknown);

            if format <= FORMAT_21 {
                meta.del_gen = reader.read_long()?;
                if format <= FORMAT_23 {
                    meta.doc_store_offset = reader.read_int()?;
                    if meta.doc_store_offset != NO_DOC_STORE {
                        meta.doc_store_segment = Some(reader.read_string()?);
                        meta.doc_store_is_compound = reader.read_byte()? == 1;
                    }
                }
                meta.has_single_norm_file = reader.read_byte()? == 1;
                let num_field = reader.read_int()?;
                if num_field != -1 {
                    return Err(LucernaError::runtime(
                        "Separate norm files are not supported. Optimize index to use it with Lucerna.",
                    ));
                }
                meta.compound = CompoundStatus::from_byte(reader.read_byte()?)?;
            } else {
                // Pre-2.1 segments record only name and size. Deletions live
                // in `<name>.del` when present; layout is probed.
                meta.has_single_norm_file = false;
                meta.del_gen = if directory.exists(&format!("{seg_name}.del")) {
                    0
                } else {
                    -1
                };
            }

            segments.push(meta);
        }

        Ok(SegmentInfos {
            format,
            version,
            counter: counter as u32,
            generation,
            segments,
        })
    }

    /// Write the next generation: emit `segments_{g+1}` and promote it in
    /// `segments.gen`.
    ///
    /// Must run under the write lock. The new generation only becomes
    /// visible once the witness file is rewritten, after the segments file
    /// itself has been fully flushed and synced.
    pub fn write_next(&mut self, directory: &Arc<dyn Directory>) -> Result<()> {
        // Pre-2.1 sets are transparently upgraded on their first write.
        if self.format == FORMAT_PRE_21 {
            self.format = FORMAT_23;
        }

        self.generation = if self.generation < 0 { 1 } else { self.generation + 1 };
        self.version += 1;

        let name = Self::segments_file_name(self.generation);
        let mut writer = StreamWriter::new(directory.create(&name)?);

        writer.write_int(self.format)?;
        writer.write_long(self.version)?;
        writer.write_int(self.counter as i32)?;
        writer.write_int(self.segments.len() as i32)?;

        for meta in &self.segments {
            writer.write_string(&meta.name)?;
            writer.write_int(meta.doc_count as i32)?;
            writer.write_long(meta.del_gen)?;
            if self.format <= FORMAT_23 {
                writer.write_int(meta.doc_store_offset)?;
                if meta.doc_store_offset != NO_DOC_STORE {
                    let doc_store_segment = meta
                        .doc_store_segment
                        .as_deref()
                        .ok_or_else(|| {
                            LucernaError::invalid_argument(
                                "doc-store offset set without a doc-store segment",
                            )
                        })?;
                    writer.write_string(doc_store_segment)?;
                    writer.write_byte(u8::from(meta.doc_store_is_compound))?;
                }
            }
            writer.write_byte(u8::from(meta.has_single_norm_file))?;
            writer.write_int(-1)?;
            writer.write_byte(meta.compound.to_byte())?;
        }

        writer.close()?;
        debug!(
            "wrote {name}: {} segment(s), version {}",
            self.segments.len(),
            self.version
        );

        self.write_gen_file(directory)
    }

    fn write_gen_file(&self, directory: &Arc<dyn Directory>) -> Result<()> {
        let mut writer = StreamWriter::new(directory.create(SEGMENTS_GEN_NAME)?);
        writer.write_int(GEN_FORMAT)?;
        writer.write_long(self.generation)?;
        writer.write_long(self.generation)?;
        writer.close()
    }
}
