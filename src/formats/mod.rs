//! Binary codecs for the BAM family of formats.
//!
//! This module provides the decoders and encoders the slicing engine is built on.
//! Nothing here performs I/O beyond the [`Read`]/[`Write`] handles it is given, so
//! every codec works the same over local files, HTTP range responses or memory.
//!
//! # Codecs
//!
//! - [`header`] - BAM header (magic, SAM text, reference dictionary)
//! - [`index`] - BAI index (bins, chunks, linear index, unmapped metadata)
//! - [`record`] - single alignment records and their reference span
//! - [`bgzf`] - block-compressed writer producing BGZF output
//!
//! # Virtual Offsets
//!
//! BAI chunks address records through 64-bit virtual offsets: the compressed
//! offset of a BGZF block in the high 48 bits and the offset inside the
//! decompressed block in the low 16 bits. See [`index::VirtualOffset`].

pub mod bgzf;
pub mod header;
pub mod index;
pub mod record;

pub use bgzf::BgzfWriter;
pub use header::{Header, ReferenceSequence, TagRecord};
pub use index::{Chunk, Index, ReferenceIndex, UnmappedMetadata, VirtualOffset};
pub use record::{AlignmentFields, Record, Records};

use std::io::{self, Read};

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
///
/// Unlike [`Read::read_exact`] a short read is not an error here; the codecs
/// distinguish a clean end of input from truncation themselves.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Discard `n` bytes, returning how many were actually available.
pub(crate) fn skip_bytes<R: Read + ?Sized>(reader: &mut R, n: u64) -> io::Result<u64> {
    io::copy(&mut reader.take(n), &mut io::sink())
}
