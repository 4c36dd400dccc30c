//! BGZF block writer.
//!
//! Every block is a complete gzip member carrying the `BC` extra subfield:
//!
//! ```text
//! ID1 ID2 CM FLG  MTIME  XFL OS  XLEN  SI1 SI2 SLEN BSIZE  CDATA  CRC32 ISIZE
//! 1f  8b  08 04   0000   00  ff  0600  42  43  0200 u16    ...    u32   u32
//! ```
//!
//! `BSIZE` is the total block length minus one. A stream ends with the fixed
//! 28-byte empty block [`EOF_BLOCK`].

use super::index::VirtualOffset;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Write};

/// Largest uncompressed payload per block; keeps the compressed block under 64 KiB.
pub const MAX_BLOCK_SIZE: usize = 0xff00;

pub const DEFAULT_BLOCK_SIZE: usize = MAX_BLOCK_SIZE;

/// Upper bound on a compressed block imposed by the 16-bit `BSIZE` field.
const MAX_COMPRESSED_SIZE: usize = 1 << 16;

/// Header (18 bytes) plus CRC32 and ISIZE trailer (8 bytes).
const BLOCK_OVERHEAD: usize = 26;

/// Empty block marking the end of a BGZF stream.
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Streaming BGZF writer.
///
/// Data is buffered until a block fills, then compressed and written to the
/// inner writer. [`BgzfWriter::write_unit`] with `pack = false` keeps a unit
/// that fits in one block from straddling a block boundary, which is how
/// the slicer keeps each alignment record inside a single block.
pub struct BgzfWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    block_size: usize,
    compressed_offset: u64,
}

impl<W: Write> BgzfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(DEFAULT_BLOCK_SIZE),
            block_size: DEFAULT_BLOCK_SIZE,
            compressed_offset: 0,
        }
    }

    /// Create a writer emitting blocks of at most `block_size` uncompressed bytes.
    pub fn with_block_size(inner: W, block_size: usize) -> io::Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "block size must be between 1 and {}, got {}",
                    MAX_BLOCK_SIZE, block_size
                ),
            ));
        }
        Ok(Self {
            inner,
            buf: Vec::with_capacity(block_size),
            block_size,
            compressed_offset: 0,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutable access to the sink, e.g. to drain compressed bytes.
    ///
    /// Virtual positions are tracked independently of the sink's contents.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Virtual offset at which the next written byte will land.
    pub fn virtual_position(&self) -> VirtualOffset {
        VirtualOffset::new(self.compressed_offset, self.buf.len() as u16)
    }

    /// Buffer `data`.
    ///
    /// With `pack = false`, data no larger than a block that would not fit
    /// into the current block starts a new one instead. Larger data is
    /// always split across blocks.
    pub fn write_unit(&mut self, data: &[u8], pack: bool) -> io::Result<()> {
        if !pack && data.len() <= self.block_size && data.len() > self.remaining() {
            self.flush_block()?;
        }

        let mut rest = data;
        while !rest.is_empty() {
            let n = rest.len().min(self.remaining());
            self.buf.extend_from_slice(&rest[..n]);
            rest = &rest[n..];

            if self.buf.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Compress and emit any buffered data as one block. No-op when empty.
    pub fn flush_block(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let block = compress_block(&self.buf)?;
        self.inner.write_all(&block)?;
        self.compressed_offset += block.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Flush remaining data, append the EOF block and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_block()?;
        self.inner.write_all(&EOF_BLOCK)?;
        self.compressed_offset += EOF_BLOCK.len() as u64;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn remaining(&self) -> usize {
        self.block_size - self.buf.len()
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_unit(buf, true)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner.flush()
    }
}

/// Compress `data` into one BGZF block.
fn compress_block(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut cdata = deflate(data, Compression::default())?;
    if cdata.len() + BLOCK_OVERHEAD > MAX_COMPRESSED_SIZE {
        // Incompressible input; stored blocks always fit.
        cdata = deflate(data, Compression::none())?;
    }

    let total = cdata.len() + BLOCK_OVERHEAD;
    let bsize = u16::try_from(total - 1).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("compressed block of {} bytes exceeds BGZF limit", total),
        )
    })?;

    let mut block = Vec::with_capacity(total);
    block.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04]);
    block.extend_from_slice(&[0, 0, 0, 0]); // MTIME
    block.push(0); // XFL
    block.push(0xff); // OS
    block.extend_from_slice(&6u16.to_le_bytes());
    block.extend_from_slice(b"BC");
    block.extend_from_slice(&2u16.to_le_bytes());
    block.extend_from_slice(&bsize.to_le_bytes());
    block.extend_from_slice(&cdata);
    block.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    block.extend_from_slice(&(data.len() as u32).to_le_bytes());
    Ok(block)
}

fn deflate(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    encoder.finish()
}
