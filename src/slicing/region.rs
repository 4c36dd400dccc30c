//! Region parsing, normalization and merging.
//!
//! Requests name regions as `ref`, `ref:beg` or `ref:beg-end` with 1-based
//! closed coordinates. Internally every region is 0-based half-open.

use crate::formats::Header;
use crate::{Error, Result};
use noodles::core::Region as CoordinateRange;
use std::fmt;
use tracing::{debug, warn};

/// Token requesting unplaced reads.
pub const UNMAPPED: &str = "unmapped";

/// A region as requested, before it is resolved against a header.
///
/// A missing `end` means the end of the reference. A missing `begin` with an
/// `end` selects the last `end` bases of the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub reference_name: String,
    pub begin: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn new(reference_name: impl Into<String>, begin: Option<u64>, end: Option<u64>) -> Self {
        Self {
            reference_name: reference_name.into(),
            begin,
            end,
        }
    }

    /// The whole of a reference sequence.
    pub fn whole(reference_name: impl Into<String>) -> Self {
        Self::new(reference_name, None, None)
    }

    /// An explicit 0-based half-open range.
    pub fn span(reference_name: impl Into<String>, begin: u64, end: u64) -> Self {
        Self::new(reference_name, Some(begin), Some(end))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference_name)?;
        match (self.begin, self.end) {
            (Some(begin), Some(end)) => write!(f, ":{}-{}", begin + 1, end),
            (Some(begin), None) => write!(f, ":{}", begin + 1),
            (None, Some(end)) => write!(f, ":-{}", end),
            (None, None) => Ok(()),
        }
    }
}

/// A region resolved to a reference index with explicit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedRegion {
    pub reference_id: usize,
    pub begin: u64,
    pub end: u64,
}

impl ResolvedRegion {
    pub fn new(reference_id: usize, begin: u64, end: u64) -> Self {
        Self {
            reference_id,
            begin,
            end,
        }
    }
}

/// Parse a `ref[:beg[-end]]` coordinate string.
pub fn parse_region(s: &str) -> Result<Region> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidInput("empty coordinate range".to_string()));
    }

    check_interval(s)?;

    let range: CoordinateRange = s
        .parse()
        .map_err(|e| Error::InvalidInput(format!("malformed coordinate range: {}: {}", s, e)))?;

    let reference_name = String::from_utf8(range.name().to_vec())
        .map_err(|_| Error::InvalidInput(format!("malformed coordinate range: {}", s)))?;

    let interval = range.interval();
    let begin = interval.start().map(|p| usize::from(p) as u64 - 1);
    let end = interval.end().map(|p| usize::from(p) as u64);

    Ok(Region::new(reference_name, begin, end))
}

/// Validate the `beg[-end]` suffix: positive integers, end not before begin.
fn check_interval(s: &str) -> Result<()> {
    let Some((_, interval)) = s.rsplit_once(':') else {
        return Ok(());
    };
    let (begin, end) = match interval.split_once('-') {
        Some((begin, end)) => (begin, Some(end)),
        None => (interval, None),
    };

    let position = |p: &str| match p.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidInput(format!(
            "malformed coordinate range: {}",
            s
        ))),
    };

    let begin = position(begin)?;
    if let Some(end) = end {
        if position(end)? < begin {
            return Err(Error::InvalidRange(s.to_string()));
        }
    }
    Ok(())
}

/// Parse request region strings. The `unmapped` token sets the returned flag
/// instead of producing a region.
pub fn parse_regions<I, S>(items: I) -> Result<(Vec<Region>, bool)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut regions = Vec::new();
    let mut include_unmapped = false;

    for item in items {
        let item = item.as_ref().trim();
        if item == UNMAPPED {
            include_unmapped = true;
        } else {
            regions.push(parse_region(item)?);
        }
    }

    Ok((regions, include_unmapped))
}

/// Resolve regions against the header's reference sequences.
///
/// Unknown reference names and empty ranges are dropped.
pub fn normalize(header: &Header, regions: &[Region]) -> Vec<ResolvedRegion> {
    regions
        .iter()
        .filter_map(|region| {
            let Some(reference_id) = header.reference_id(&region.reference_name) else {
                warn!(region = %region, "dropping region on unknown reference");
                return None;
            };
            let length = header.reference_sequences[reference_id].length;

            let (begin, end) = match (region.begin, region.end) {
                (None, Some(end)) => (length.saturating_sub(end), length),
                (begin, end) => (begin.unwrap_or(0), end.unwrap_or(length).min(length)),
            };

            if begin >= end {
                debug!(region = %region, "dropping empty region");
                return None;
            }
            Some(ResolvedRegion::new(reference_id, begin, end))
        })
        .collect()
}

/// Sort regions and coalesce those that overlap or touch on one reference.
pub fn sort_and_merge(mut regions: Vec<ResolvedRegion>) -> Vec<ResolvedRegion> {
    regions.sort();

    let mut merged: Vec<ResolvedRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(prev) if prev.reference_id == region.reference_id && region.begin <= prev.end => {
                prev.end = prev.end.max(region.end);
            }
            _ => merged.push(region),
        }
    }
    merged
}
