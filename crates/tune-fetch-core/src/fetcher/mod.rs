//! Media fetch service
//!
//! Resolving a link and downloading+transcoding one item are delegated to an
//! external service. The coordinator only sees the [`FetchService`] trait.

mod ytdlp;

pub use ytdlp::YtDlpFetcher;

use crate::error::{Error, Result};
use crate::formats::OutputFormat;
use crate::types::{Item, Manifest};
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

/// Where and how one session writes its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub directory: PathBuf,
    pub format: &'static OutputFormat,
}

impl OutputSpec {
    pub fn new(directory: impl Into<PathBuf>, format: &'static OutputFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    /// Final path of a file with the given (already sanitized) stem
    pub fn file_path(&self, stem: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", stem, self.format.file_extension))
    }
}

#[async_trait]
pub trait FetchService: Send + Sync {
    /// Backend name, for logging
    fn name(&self) -> &str;

    /// Resolve a link into a manifest without downloading media
    async fn resolve(&self, url: &str) -> Result<Manifest>;

    /// Download and transcode one item, returning the written file
    async fn fetch_one(&self, item: &Item, spec: &OutputSpec) -> Result<PathBuf>;
}

/// Accept only absolute http(s) links
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| Error::Resolution(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        scheme => Err(Error::Resolution(format!(
            "Unsupported URL scheme '{}': {}",
            scheme, url
        ))),
    }
}
