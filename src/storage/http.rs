//! HTTP/HTTPS storage backend.
//!
//! BAM and BAI files are read directly from a remote server with `Range`
//! requests. Requests are blocking: sources are only read from the slicing
//! worker thread, and async trait methods hop onto the blocking pool.

use super::{ByteRange, ByteSource, Storage, validate_id};
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;
use ureq::Agent;
use url::Url;

/// Byte source over a remote file.
#[derive(Clone)]
pub struct HttpSource {
    agent: Agent,
    url: String,
}

impl HttpSource {
    pub fn new(agent: Agent, url: impl Into<String>) -> Self {
        Self {
            agent,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ByteSource for HttpSource {
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        let range = ByteRange::starting_at(offset);
        debug!(url = %self.url, range = %range, "opening remote range");

        let response = self
            .agent
            .get(&self.url)
            .header("Range", range.to_string())
            .call()
            .map_err(io::Error::other)?;

        // A plain 200 means the server ignored the range.
        let status = response.status().as_u16();
        if offset > 0 && status != 206 {
            return Err(io::Error::other(format!(
                "range request to {} returned status {}",
                self.url, status
            )));
        }

        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Storage backed by a remote HTTP server.
pub struct HttpStorage {
    agent: Agent,
    base_url: String,
    index_base_url: Option<String>,
}

impl HttpStorage {
    /// * `base_url` - base URL for BAM files (e.g. `https://example.com/data/`)
    /// * `index_base_url` - optional separate base URL for index files
    pub fn new(base_url: &str, index_base_url: Option<&str>) -> Result<Self> {
        let base_url = parse_base(base_url)?;
        let index_base_url = index_base_url.map(parse_base).transpose()?;

        Ok(Self {
            agent: Agent::new_with_defaults(),
            base_url,
            index_base_url,
        })
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/{}.bam", self.base_url, id)
    }

    fn index_url(&self, name: &str) -> String {
        let base = self.index_base_url.as_ref().unwrap_or(&self.base_url);
        format!("{}/{}", base, name)
    }

    /// HEAD `url`; a 404 means the file does not exist.
    async fn url_exists(&self, url: String) -> Result<bool> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || match agent.head(&url).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(e) => Err(Error::Internal(format!("HTTP HEAD {} failed: {}", url, e))),
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
    }

    async fn find_index(&self, id: &str) -> Result<Option<String>> {
        for name in [format!("{}.bam.bai", id), format!("{}.bai", id)] {
            let url = self.index_url(&name);
            if self.url_exists(url.clone()).await? {
                return Ok(Some(url));
            }
        }
        Ok(None)
    }

    fn source(&self, url: String) -> Arc<dyn ByteSource> {
        Arc::new(HttpSource::new(self.agent.clone(), url))
    }
}

fn parse_base(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::InvalidInput(format!("invalid base URL {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[async_trait]
impl Storage for HttpStorage {
    async fn bam_source(&self, id: &str) -> Result<Arc<dyn ByteSource>> {
        validate_id(id)?;
        let url = self.file_url(id);
        if !self.url_exists(url.clone()).await? {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(self.source(url))
    }

    async fn index_source(
        &self,
        id: &str,
        explicit: Option<&str>,
    ) -> Result<Arc<dyn ByteSource>> {
        validate_id(id)?;
        let url = match explicit {
            Some(index_id) => {
                validate_id(index_id)?;
                let url = self.index_url(index_id);
                if !self.url_exists(url.clone()).await? {
                    return Err(Error::NotFound(format!("index {}", index_id)));
                }
                url
            }
            None => self
                .find_index(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("index for {}", id)))?,
        };
        Ok(self.source(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url() {
        let storage = HttpStorage::new("https://example.com/data/", None).unwrap();
        assert_eq!(storage.file_url("sample1"), "https://example.com/data/sample1.bam");
    }

    #[test]
    fn test_index_url() {
        let storage = HttpStorage::new("https://example.com/data", None).unwrap();
        assert_eq!(
            storage.index_url("sample1.bam.bai"),
            "https://example.com/data/sample1.bam.bai"
        );

        let storage =
            HttpStorage::new("https://example.com/data", Some("https://idx.example.com/")).unwrap();
        assert_eq!(
            storage.index_url("sample1.bai"),
            "https://idx.example.com/sample1.bai"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpStorage::new("not a url", None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            HttpStorage::new("ftp://example.com", None),
            Err(Error::InvalidInput(_))
        ));
    }
}
