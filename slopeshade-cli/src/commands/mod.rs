pub mod batch;
pub mod info;
pub mod list;
pub mod query;
pub mod route;
pub mod shadow;
pub mod tile;

use anyhow::{Context, Result};
use slopeshade::{download::AWS_TERRARIUM_URL, TerrainService, TerrainServiceBuilder, TileId};
use std::path::PathBuf;

/// Tile source flags shared by every command.
pub struct SourceOptions {
    pub tile_dir: Option<PathBuf>,
    pub tile_url: Option<String>,
    pub auto_download: bool,
    pub cache_size: u64,
    pub timeout_secs: u64,
}

impl SourceOptions {
    /// Value of a `SLOPESHADE_*` variable as resolved from the flags.
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "SLOPESHADE_TILE_DIR" => self
                .tile_dir
                .as_ref()
                .map(|dir| dir.to_string_lossy().into_owned()),
            "SLOPESHADE_TILE_URL" => self.tile_url.clone().or_else(|| {
                self.auto_download
                    .then(|| AWS_TERRARIUM_URL.to_string())
            }),
            "SLOPESHADE_CACHE_SIZE" => Some(self.cache_size.to_string()),
            "SLOPESHADE_TIMEOUT_SECS" => Some(self.timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Build the tile service.
    ///
    /// Without `--tile-url` or `--auto-download` tiles are read from
    /// `--tile-dir` only.
    pub fn build_service(&self) -> Result<TerrainService> {
        if self.tile_dir.is_none() && self.tile_url.is_none() && !self.auto_download {
            anyhow::bail!(
                "No tile source. Use --tile-dir, --tile-url, --auto-download or set SLOPESHADE_TILE_DIR"
            );
        }

        let builder = TerrainServiceBuilder::from_lookup(|key| self.lookup(key))
            .context("Failed to configure tile source")?;
        Ok(builder.build())
    }
}

/// Parse a `z/x/y` tile address.
pub fn parse_tile_id(tile: &str) -> Result<TileId> {
    tile.parse()
        .with_context(|| format!("Invalid tile address '{}', expected z/x/y", tile))
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
