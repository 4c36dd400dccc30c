//! BAM coordinate slicing.
//!
//! Given a BAM file, its BAI index and a set of genomic regions, produce a new
//! BAM stream holding the original header and exactly the alignment records
//! overlapping those regions, each at most once, optionally followed by the
//! unplaced reads. Inputs are read through [`storage::ByteSource`] handles, so
//! the same engine serves local files and remote objects.
//!
//! ```no_run
//! use htslice::slicing::{Region, Slicer};
//! use htslice::storage::FileSource;
//! use std::sync::Arc;
//!
//! # fn run() -> htslice::Result<()> {
//! let slicer = Slicer::new(
//!     Arc::new(FileSource::new("sample.bam")),
//!     Arc::new(FileSource::new("sample.bam.bai")),
//! );
//! for chunk in slicer.slice(&[Region::span("chr1", 0, 100_000)], false)? {
//!     let bytes = chunk?;
//!     // write `bytes` somewhere
//! #   let _ = bytes;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod slicing;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
