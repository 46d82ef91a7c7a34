//! Terrarium tile download functionality.
//!
//! This module provides [`HttpTileSource`], which fetches tiles from a remote
//! server. It is only available when the `download` feature is enabled.
//!
//! # Data Sources
//!
//! The public Terrarium dataset is hosted on AWS Open Data:
//!
//! - **AWS elevation-tiles-prod**: `https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png`
//!
//! Any server following the same `{z}/{x}/{y}` layout can be configured
//! through a URL template.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::coords::TileId;
use crate::error::{Result, TerrainError};
use crate::source::{tile_path, CancelToken, TileSource};

/// Public Terrarium tile endpoint on AWS.
pub const AWS_TERRARIUM_URL: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for downloading Terrarium tiles.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retry attempts on failure.
    pub max_retries: u32,
    /// Optional `{dir}/{z}/{x}/{y}.png` mirror, read first and written after a download.
    pub cache_dir: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url_template: AWS_TERRARIUM_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            cache_dir: None,
        }
    }
}

impl DownloadConfig {
    /// Create a new download configuration with a custom URL template.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use slopeshade::download::DownloadConfig;
    ///
    /// let config = DownloadConfig::with_url_template(
    ///     "https://tiles.example.com/terrarium/{z}/{x}/{y}.png",
    /// );
    /// ```
    pub fn with_url_template(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            ..Default::default()
        }
    }

    /// Configuration for the public AWS Terrarium dataset.
    pub fn aws_terrarium() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Mirror downloaded tiles into `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Tile source backed by an HTTP server.
pub struct HttpTileSource {
    client: Client,
    config: DownloadConfig,
    cancel: CancelToken,
}

impl HttpTileSource {
    /// Create a new source with the given configuration.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TerrainError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Attach a cancellation token checked before every request.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Build the download URL for a tile.
    pub fn build_url(&self, id: TileId) -> Result<String> {
        if self.config.url_template.is_empty() {
            return Err(TerrainError::DownloadFailed {
                id,
                reason: "No download URL template configured".to_string(),
            });
        }
        Ok(self
            .config
            .url_template
            .replace("{z}", &id.z.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &id.y.to_string()))
    }

    fn do_download(&self, id: TileId, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(TerrainError::DownloadFailed {
                id,
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(response.bytes()?.to_vec())
    }

    fn read_mirror(&self, id: TileId) -> Option<Vec<u8>> {
        let dir = self.config.cache_dir.as_ref()?;
        fs::read(tile_path(dir, id)).ok()
    }

    fn write_mirror(&self, id: TileId, bytes: &[u8]) {
        let Some(dir) = self.config.cache_dir.as_ref() else {
            return;
        };
        let path = tile_path(dir, id);
        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&path, bytes));
        if let Err(e) = written {
            tracing::warn!(tile = %id, path = %path.display(), error = %e, "failed to mirror tile");
        }
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, id: TileId) -> Result<Vec<u8>> {
        self.cancel.check()?;

        if let Some(bytes) = self.read_mirror(id) {
            tracing::debug!(tile = %id, "tile read from mirror");
            return Ok(bytes);
        }

        let url = self.build_url(id)?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.cancel.check()?;
                std::thread::sleep(Duration::from_millis(500 * attempt as u64));
            }

            tracing::debug!(tile = %id, %url, attempt, "downloading tile");
            match self.do_download(id, &url) {
                Ok(bytes) => {
                    self.write_mirror(id, &bytes);
                    return Ok(bytes);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| TerrainError::DownloadFailed {
            id,
            reason: "Unknown error".to_string(),
        }))
    }

    fn describe(&self) -> String {
        format!("http:{}", self.config.url_template)
    }
}
