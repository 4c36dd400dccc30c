use crate::formats::bgzf::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "htslice")]
#[command(about = "BAM coordinate slicing server")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HTSLICE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "HTSLICE_PORT", default_value = "8080")]
    pub port: u16,

    /// Directory containing BAM and BAI files
    #[arg(long, env = "HTSLICE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Serve files from this HTTP(S) base URL instead of the data directory
    #[arg(long, env = "HTSLICE_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Separate base URL for index files on the remote server
    #[arg(long, env = "HTSLICE_REMOTE_INDEX_URL")]
    pub remote_index_url: Option<String>,

    /// JSON file mapping gencode gene names to regions
    #[arg(long, env = "HTSLICE_GENCODE")]
    pub gencode: Option<PathBuf>,

    /// Enable CORS for all origins
    #[arg(long, env = "HTSLICE_CORS", default_value = "true")]
    pub cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Uncompressed bytes per output BGZF block
    #[arg(long, env = "HTSLICE_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(format!(
                "block size must be between 1 and {}, got {}",
                MAX_BLOCK_SIZE, self.block_size
            ));
        }
        if self.remote_index_url.is_some() && self.remote_url.is_none() {
            return Err("a remote index URL requires a remote URL".to_string());
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            remote_url: None,
            remote_index_url: None,
            gencode: None,
            cors: true,
            log_level: "info".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_block_size_bounds() {
        let mut config = config();
        config.block_size = 0;
        assert!(config.validate().is_err());

        config.block_size = MAX_BLOCK_SIZE + 1;
        assert!(config.validate().is_err());

        config.block_size = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_index_url_needs_remote() {
        let mut config = config();
        config.remote_index_url = Some("https://idx.example.com".to_string());
        assert!(config.validate().is_err());

        config.remote_url = Some("https://example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let mut config = config();
        config.host = "localhost".to_string();
        config.port = 3000;
        assert_eq!(config.bind_address(), "localhost:3000");
    }

    #[test]
    fn test_parse_args() {
        let config = Config::try_parse_from([
            "htslice",
            "--port",
            "9000",
            "--data-dir",
            "/srv/bam",
            "--block-size",
            "4096",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, PathBuf::from("/srv/bam"));
        assert_eq!(config.block_size, 4096);
    }
}
