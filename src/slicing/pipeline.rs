//! End-to-end slicing: header, index, plan, fetch, recompress.

use super::fetch::FetchRecords;
use super::region::{Region, normalize, sort_and_merge};
use crate::formats::bgzf::DEFAULT_BLOCK_SIZE;
use crate::formats::header::{self, read_header};
use crate::formats::index::read_index;
use crate::formats::{BgzfWriter, Header, Index};
use crate::storage::ByteSource;
use crate::{Error, Result};
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

/// Slices one BAM file with its BAI index.
#[derive(Clone)]
pub struct Slicer {
    bam: Arc<dyn ByteSource>,
    bai: Arc<dyn ByteSource>,
    block_size: usize,
    pack_records: bool,
}

impl Slicer {
    pub fn new(bam: Arc<dyn ByteSource>, bai: Arc<dyn ByteSource>) -> Self {
        Self {
            bam,
            bai,
            block_size: DEFAULT_BLOCK_SIZE,
            pack_records: false,
        }
    }

    /// Uncompressed bytes per output block.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Allow records to straddle output blocks. Off by default, so every
    /// record that fits in a block is written to a single block.
    pub fn with_record_packing(mut self, pack: bool) -> Self {
        self.pack_records = pack;
        self
    }

    /// Parse the BAM header. Also returns its uncompressed length.
    pub fn read_header(&self) -> Result<(Header, u64)> {
        let raw = self.bam.open_at(0)?;
        let mut reader = MultiGzDecoder::new(raw);
        read_header(&mut reader)
            .map_err(classify)
            .map_err(|e| e.context("bam header"))
    }

    pub fn read_index(&self) -> Result<Index> {
        let mut raw = self.bai.open_at(0)?;
        read_index(&mut raw).map_err(|e| e.context("bai"))
    }

    /// Start a slice of `regions`, plus unplaced reads if `include_unmapped`.
    ///
    /// Header and index are parsed before returning, so malformed input is
    /// reported here rather than partway through the stream.
    pub fn slice(&self, regions: &[Region], include_unmapped: bool) -> Result<SliceStream> {
        let (header, header_len) = self.read_header()?;
        let index = self.read_index()?;

        let plan = sort_and_merge(normalize(&header, regions));
        info!(
            requested = regions.len(),
            planned = plan.len(),
            include_unmapped,
            "slicing"
        );

        let mut writer = BgzfWriter::with_block_size(Vec::new(), self.block_size)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        writer.write_unit(&header::encode(&header), true)?;
        writer.flush_block()?;

        let records = FetchRecords::new(
            self.bam.clone(),
            Arc::new(index),
            plan,
            include_unmapped,
            header_len,
        );

        Ok(SliceStream {
            writer: Some(writer),
            records,
            pack_records: self.pack_records,
            record_count: 0,
        })
    }
}

/// Map inflater failures to the input errors they stand for.
fn classify(e: Error) -> Error {
    match e {
        Error::Io(e) if matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData) => {
            Error::Format(format!("corrupt BGZF data: {}", e))
        }
        Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Error::Truncated(format!("BGZF stream ended early: {}", e))
        }
        other => other,
    }
}

/// Compressed output of a slice.
///
/// Yields the header block first, then chunks of complete BGZF blocks as
/// they fill, and finally the remaining data with the EOF marker. After an
/// error the stream ends without the EOF marker.
pub struct SliceStream {
    writer: Option<BgzfWriter<Vec<u8>>>,
    records: FetchRecords,
    pack_records: bool,
    record_count: u64,
}

impl SliceStream {
    /// Records written so far.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    fn fail(&mut self, e: Error) -> Error {
        self.writer = None;
        let e = classify(e);
        warn!(records = self.record_count, error = %e, "slice aborted");
        e
    }
}

impl Iterator for SliceStream {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let writer = self.writer.as_mut()?;
            if !writer.get_ref().is_empty() {
                return Some(Ok(Bytes::from(std::mem::take(writer.get_mut()))));
            }

            match self.records.next() {
                Some(Ok(record)) => {
                    if let Err(e) = writer.write_unit(record.as_bytes(), self.pack_records) {
                        return Some(Err(self.fail(e.into())));
                    }
                    self.record_count += 1;
                }
                Some(Err(e)) => return Some(Err(self.fail(e))),
                None => {
                    let writer = self.writer.take()?;
                    return match writer.finish() {
                        Ok(tail) => {
                            info!(records = self.record_count, "slice complete");
                            Some(Ok(Bytes::from(tail)))
                        }
                        Err(e) => Some(Err(self.fail(e.into()))),
                    };
                }
            }
        }
    }
}
