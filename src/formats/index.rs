//! BAI index codec.
//!
//! ```text
//! magic[4]          "BAI\1"
//! n_ref[4]          int32
//! for each reference:
//!   n_bin[4]        int32
//!   for each bin:
//!     bin[4]        uint32
//!     n_chunk[4]    int32
//!     chunks        n_chunk × (uint64 chunk_beg, uint64 chunk_end)
//!   n_intv[4]       int32
//!   ioffset         n_intv × uint64
//! n_no_coor[8]      uint64 (optional)
//! ```
//!
//! Bin 37450 is not a genomic bin: samtools stores per-reference metadata in
//! it. It is decoded into [`UnmappedMetadata`] and kept out of the bin map so
//! bin-overlap scans never see it.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

/// BAI magic bytes.
pub const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// Pseudo-bin holding unmapped-read metadata.
pub const METADATA_BIN: u32 = 37450;

/// BGZF virtual file offset.
///
/// Bits 63-16 hold the compressed offset of a BGZF block, bits 15-0 the
/// offset within its decompressed data. Ordering follows file order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub const MIN: Self = Self(0);

    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | uncompressed as u64)
    }

    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the BGZF block in the compressed file.
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Byte offset within the decompressed block.
    pub fn uncompressed(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}

/// Virtual-offset range of records belonging to one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl Chunk {
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// Contents of the metadata pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmappedMetadata {
    pub unmapped_begin: VirtualOffset,
    pub unmapped_end: VirtualOffset,
    pub mapped_count: u64,
    pub unmapped_count: u64,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub bins: BTreeMap<u32, Vec<Chunk>>,
    /// One virtual offset per 16 384 bp tile.
    pub linear_index: Vec<VirtualOffset>,
    pub metadata: Option<UnmappedMetadata>,
    /// Largest chunk end among the regular bins.
    pub mapped_end: VirtualOffset,
}

/// Parsed BAI index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    pub references: Vec<ReferenceIndex>,
    /// Number of unplaced reads, when the trailing field is present.
    pub unplaced_count: Option<u64>,
    /// Largest chunk end over every reference; unplaced reads follow it.
    pub mapped_end: VirtualOffset,
}

impl Index {
    pub fn reference(&self, reference_id: usize) -> Option<&ReferenceIndex> {
        self.references.get(reference_id)
    }
}

/// Little-endian reader over a buffered index that reports truncation offsets.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| {
            Error::Truncated(format!(
                "unexpected EOF reading {} at byte {}",
                what, self.pos
            ))
        })?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.take::<4>(what).map(u32::from_le_bytes)
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        self.take::<8>(what).map(u64::from_le_bytes)
    }

    fn offset(&mut self, what: &str) -> Result<VirtualOffset> {
        self.u64(what).map(VirtualOffset::from_raw)
    }

    /// Read an `int32` count, rejecting negative values.
    fn count(&mut self, what: &str) -> Result<usize> {
        let at = self.pos;
        let value = self.take::<4>(what).map(i32::from_le_bytes)?;
        usize::try_from(value)
            .map_err(|_| Error::Format(format!("negative {} {} at byte {}", what, value, at)))
    }
}

/// Read a BAI index. The whole input is buffered first.
pub fn read_index<R: Read>(reader: &mut R) -> Result<Index> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    decode(&data)
}

/// Decode a BAI index from bytes.
pub fn decode(data: &[u8]) -> Result<Index> {
    let mut reader = ByteReader::new(data);

    let magic = reader
        .take::<4>("magic")
        .map_err(|_| Error::Format("magic number not found".to_string()))?;
    if &magic != BAI_MAGIC {
        return Err(Error::Format("magic number not found".to_string()));
    }

    let n_ref = reader.count("reference count")?;
    let mut references = Vec::with_capacity(n_ref.min(1 << 16));
    let mut mapped_end = VirtualOffset::MIN;

    for _ in 0..n_ref {
        let reference = read_reference(&mut reader)?;
        mapped_end = mapped_end.max(reference.mapped_end);
        references.push(reference);
    }

    // The unplaced count is optional; its absence is not truncation.
    let unplaced_count = if reader.is_empty() {
        None
    } else {
        Some(reader.u64("unplaced read count")?)
    };

    Ok(Index {
        references,
        unplaced_count,
        mapped_end,
    })
}

fn read_reference(reader: &mut ByteReader<'_>) -> Result<ReferenceIndex> {
    let mut reference = ReferenceIndex::default();

    let n_bin = reader.count("bin count")?;
    for _ in 0..n_bin {
        let at = reader.pos;
        let bin = reader.u32("bin id")?;
        let n_chunk = reader.count("chunk count")?;

        let mut chunks = Vec::with_capacity(n_chunk.min(1 << 16));
        for _ in 0..n_chunk {
            let start = reader.offset("chunk start")?;
            let end = reader.offset("chunk end")?;
            chunks.push(Chunk::new(start, end));
        }

        if bin == METADATA_BIN {
            if chunks.len() != 2 {
                return Err(Error::Format(format!(
                    "metadata bin at byte {} has {} chunks, expected 2",
                    at,
                    chunks.len()
                )));
            }
            reference.metadata = Some(UnmappedMetadata {
                unmapped_begin: chunks[0].start,
                unmapped_end: chunks[0].end,
                mapped_count: chunks[1].start.as_raw(),
                unmapped_count: chunks[1].end.as_raw(),
            });
            continue;
        }

        if let Some(end) = chunks.iter().map(|c| c.end).max() {
            reference.mapped_end = reference.mapped_end.max(end);
        }
        reference.bins.entry(bin).or_default().extend(chunks);
    }

    let n_intv = reader.count("linear index count")?;
    reference.linear_index.reserve(n_intv.min(1 << 20));
    for _ in 0..n_intv {
        reference
            .linear_index
            .push(reader.offset("linear index offset")?);
    }

    Ok(reference)
}
