use super::{ByteSource, Storage, validate_id};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Byte source over a local file. Every open gets its own file handle.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

pub struct LocalStorage {
    data_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn bam_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.bam", id))
    }

    /// Locate the index, checking both appended (`x.bam.bai`) and replaced
    /// (`x.bai`) conventions.
    async fn find_index(&self, id: &str) -> Option<PathBuf> {
        let appended = self.data_dir.join(format!("{}.bam.bai", id));
        if is_file(&appended).await {
            return Some(appended);
        }

        let replaced = self.data_dir.join(format!("{}.bai", id));
        if is_file(&replaced).await {
            return Some(replaced);
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl Storage for LocalStorage {
    async fn bam_source(&self, id: &str) -> Result<Arc<dyn ByteSource>> {
        validate_id(id)?;
        let path = self.bam_path(id);
        if !is_file(&path).await {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(Arc::new(FileSource::new(path)))
    }

    async fn index_source(
        &self,
        id: &str,
        explicit: Option<&str>,
    ) -> Result<Arc<dyn ByteSource>> {
        validate_id(id)?;
        let path = match explicit {
            Some(index_id) => {
                validate_id(index_id)?;
                let path = self.data_dir.join(index_id);
                if !is_file(&path).await {
                    return Err(Error::NotFound(format!("index {}", index_id)));
                }
                path
            }
            None => self
                .find_index(id)
                .await
                .ok_or_else(|| Error::NotFound(format!("index for {}", id)))?,
        };
        Ok(Arc::new(FileSource::new(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &dyn ByteSource, offset: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        source.open_at(offset).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_file_source_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let source = FileSource::new(&path);
        assert_eq!(read_all(&source, 0), b"hello world");
        assert_eq!(read_all(&source, 6), b"world");
    }

    #[test]
    fn test_file_source_missing() {
        let source = FileSource::new("/nonexistent/file.bam");
        assert!(source.open_at(0).is_err());
    }

    #[tokio::test]
    async fn test_index_conventions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bam"), b"").unwrap();
        std::fs::write(dir.path().join("a.bai"), b"replaced").unwrap();
        std::fs::write(dir.path().join("b.bam"), b"").unwrap();
        std::fs::write(dir.path().join("b.bam.bai"), b"appended").unwrap();
        std::fs::write(dir.path().join("b.bai"), b"replaced").unwrap();

        let storage = LocalStorage::new(dir.path().to_path_buf());

        let source = storage.index_source("a", None).await.unwrap();
        assert_eq!(read_all(source.as_ref(), 0), b"replaced");

        let source = storage.index_source("b", None).await.unwrap();
        assert_eq!(read_all(source.as_ref(), 0), b"appended");

        let source = storage.index_source("a", Some("b.bam.bai")).await.unwrap();
        assert_eq!(read_all(source.as_ref(), 0), b"appended");
    }

    #[tokio::test]
    async fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("noindex.bam"), b"").unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());

        assert!(matches!(
            storage.bam_source("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            storage.index_source("noindex", None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.bam_source("../secret").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            storage.index_source("a", Some("../x.bai")).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
