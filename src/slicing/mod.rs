//! Coordinate slicing of BAM files.
//!
//! A slice request goes through these stages:
//!
//! 1. [`region`] parses coordinate strings, resolves them against the header
//!    and merges overlapping ranges
//! 2. [`binning`] maps each range to a starting virtual offset via the index
//! 3. [`fetch`] decodes records from that offset and filters them by position
//! 4. [`pipeline`] writes the header and selected records as a new BGZF stream
//!
//! [`gencode`] expands gene names into regions before stage 1.

pub mod binning;
pub mod fetch;
pub mod gencode;
pub mod pipeline;
pub mod region;

pub use fetch::FetchRecords;
pub use gencode::GencodeMap;
pub use pipeline::{SliceStream, Slicer};
pub use region::{Region, ResolvedRegion, parse_region, parse_regions};
