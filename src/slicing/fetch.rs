//! Index-driven record retrieval.
//!
//! For every merged region the index gives a virtual start offset. The BAM
//! source is opened at the compressed part, inflated, advanced past the
//! in-block part, and records are decoded until one starts past the region.

use super::binning::region_start_offset;
use super::region::ResolvedRegion;
use crate::formats::{Index, Record, Records, VirtualOffset, skip_bytes};
use crate::storage::ByteSource;
use crate::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::io::{BufReader, Read};
use std::sync::Arc;
use tracing::debug;

type RecordReader = Records<Box<dyn Read + Send>>;

/// Open `source` at a virtual offset and decode records from there.
///
/// `skip` is added to the in-block offset; it lets the caller start past the
/// header when no index position is available.
pub fn open_records(
    source: &dyn ByteSource,
    offset: VirtualOffset,
    skip: u64,
) -> Result<RecordReader> {
    let raw = source.open_at(offset.compressed())?;
    let mut reader: Box<dyn Read + Send> = Box::new(BufReader::new(MultiGzDecoder::new(raw)));

    let skip = offset.uncompressed() as u64 + skip;
    let skipped = skip_bytes(&mut reader, skip)?;
    if skipped < skip {
        return Err(Error::Truncated(format!(
            "virtual offset {} lies past the end of its block",
            offset
        )));
    }
    Ok(Records::new(reader))
}

/// What to do with a decoded record for the current region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Emit,
    Skip,
    Stop,
}

fn place(record: &Record, region: &ResolvedRegion, previous: Option<&ResolvedRegion>) -> Placement {
    let reference_id = record.reference_id();
    let (start, end) = record.span();
    let current = region.reference_id as i64;

    // Unplaced reads sort after every reference.
    if reference_id < 0 {
        return Placement::Stop;
    }
    let reference_id = reference_id as i64;

    if reference_id > current || (reference_id == current && start >= region.end as i64) {
        return Placement::Stop;
    }

    if let Some(prev) = previous {
        if reference_id == prev.reference_id as i64 && start < prev.end as i64 {
            return Placement::Skip;
        }
    }

    if reference_id < current || end <= region.begin as i64 {
        return Placement::Skip;
    }
    Placement::Emit
}

enum State {
    Pending,
    Region {
        region: ResolvedRegion,
        records: RecordReader,
    },
    Unmapped(RecordReader),
    Done,
}

/// Lazy iterator over the records of a set of sorted, merged regions.
///
/// Each record is yielded at most once. With `include_unmapped`, unplaced
/// reads following the last mapped chunk are yielded after all regions.
/// The iterator ends after the first error.
pub struct FetchRecords {
    source: Arc<dyn ByteSource>,
    index: Arc<Index>,
    regions: std::vec::IntoIter<ResolvedRegion>,
    include_unmapped: bool,
    header_len: u64,
    previous: Option<ResolvedRegion>,
    state: State,
}

impl FetchRecords {
    /// `header_len` is the uncompressed size of the BAM header, used to find
    /// the first record when the index holds no mapped data.
    pub fn new(
        source: Arc<dyn ByteSource>,
        index: Arc<Index>,
        regions: Vec<ResolvedRegion>,
        include_unmapped: bool,
        header_len: u64,
    ) -> Self {
        Self {
            source,
            index,
            regions: regions.into_iter(),
            include_unmapped,
            header_len,
            previous: None,
            state: State::Pending,
        }
    }

    /// Advance to the next region that has an index entry, or to the
    /// unmapped tail.
    fn advance(&mut self) -> Result<State> {
        for region in self.regions.by_ref() {
            let Some(offset) =
                region_start_offset(&self.index, region.reference_id, region.begin, region.end)
            else {
                debug!(?region, "region not indexed");
                continue;
            };

            debug!(?region, %offset, "fetching region");
            let records = open_records(self.source.as_ref(), offset, 0)?;
            return Ok(State::Region { region, records });
        }

        if self.include_unmapped {
            self.include_unmapped = false;
            let records = if self.index.mapped_end == VirtualOffset::MIN {
                debug!("index has no mapped data, reading unplaced reads after header");
                open_records(self.source.as_ref(), VirtualOffset::MIN, self.header_len)?
            } else {
                debug!(offset = %self.index.mapped_end, "fetching unplaced reads");
                open_records(self.source.as_ref(), self.index.mapped_end, 0)?
            };
            return Ok(State::Unmapped(records));
        }

        Ok(State::Done)
    }
}

impl Iterator for FetchRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Done => return None,
                State::Pending => match self.advance() {
                    Ok(state) => self.state = state,
                    Err(e) => {
                        self.state = State::Done;
                        return Some(Err(e));
                    }
                },
                State::Region { region, records } => match records.next() {
                    Some(Ok(record)) => match place(&record, region, self.previous.as_ref()) {
                        Placement::Emit => return Some(Ok(record)),
                        Placement::Skip => continue,
                        Placement::Stop => {
                            self.previous = Some(*region);
                            self.state = State::Pending;
                        }
                    },
                    Some(Err(e)) => {
                        self.state = State::Done;
                        return Some(Err(e));
                    }
                    None => {
                        self.previous = Some(*region);
                        self.state = State::Pending;
                    }
                },
                State::Unmapped(records) => match records.next() {
                    Some(Ok(record)) if record.reference_id() < 0 => return Some(Ok(record)),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.state = State::Done;
                        return Some(Err(e));
                    }
                    None => self.state = State::Done,
                },
            }
        }
    }
}
