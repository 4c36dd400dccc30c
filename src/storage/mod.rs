//! Storage backends for BAM and BAI files.
//!
//! The slicer reads its inputs through [`ByteSource`]: a handle that can open
//! a fresh reader at any byte offset. Backends resolve a file id to sources
//! and answer existence and metadata queries.
//!
//! # Implementations
//!
//! - [`LocalStorage`] - files under a local data directory
//! - [`HttpStorage`] - remote files fetched with HTTP range requests (feature `http`)
//!
//! # Example
//!
//! ```no_run
//! use htslice::storage::{LocalStorage, Storage};
//! use std::path::PathBuf;
//!
//! # async fn run() -> htslice::Result<()> {
//! let storage = LocalStorage::new(PathBuf::from("./data"));
//! let bam = storage.bam_source("sample").await?;
//! let bai = storage.index_source("sample", None).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "http")]
mod http;
mod local;

#[cfg(feature = "http")]
pub use http::{HttpSource, HttpStorage};
pub use local::{FileSource, LocalStorage};

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// Random-access byte input.
///
/// Each call opens an independent reader positioned at `offset`. Readers are
/// consumed sequentially; the slicer never holds two at once.
pub trait ByteSource: Send + Sync {
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send>>;
}

impl<F> ByteSource for F
where
    F: Fn(u64) -> io::Result<Box<dyn Read + Send>> + Send + Sync,
{
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        self(offset)
    }
}

/// In-memory byte source.
#[derive(Debug, Clone)]
pub struct MemorySource(Bytes);

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }
}

impl ByteSource for MemorySource {
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.0.len());
        Ok(Box::new(io::Cursor::new(self.0.slice(start..))))
    }
}

/// Open-ended or bounded byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn starting_at(start: u64) -> Self {
        Self { start, end: None }
    }
}

/// Formats as an HTTP `Range` header value.
impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "bytes={}-{}", self.start, end),
            None => write!(f, "bytes={}-", self.start),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Byte source over the BAM file.
    async fn bam_source(&self, id: &str) -> Result<Arc<dyn ByteSource>>;

    /// Byte source over the BAI index.
    ///
    /// `explicit` names the index file directly; otherwise `<id>.bam.bai` and
    /// `<id>.bai` are tried in that order.
    async fn index_source(&self, id: &str, explicit: Option<&str>)
    -> Result<Arc<dyn ByteSource>>;
}

/// Reject ids that could escape the storage root.
pub fn validate_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id.starts_with('/')
        || id.contains('\\')
        || id.contains('\0')
        || id.split('/').any(|part| part == ".." || part.is_empty());

    if invalid {
        return Err(Error::InvalidInput(format!("invalid file id: {:?}", id)));
    }
    Ok(())
}
