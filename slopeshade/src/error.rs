//! Error types for the slopeshade library.

use std::path::PathBuf;
use thiserror::Error;

use crate::coords::TileId;

/// Errors that can occur when loading tiles or generating terrain layers.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// IO error when reading or writing tile files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile image could not be decoded or encoded.
    #[error("Image error: {0}")]
    Decode(#[from] image::ImageError),

    /// Decoded image does not have the fixed Terrarium dimensions.
    #[error("Invalid tile size: {width}x{height} (expected 256x256)")]
    InvalidTileSize { width: u32, height: u32 },

    /// A `z/x/y` tile address could not be parsed or is outside the world grid.
    #[error("Invalid tile id: {0}")]
    InvalidTileId(String),

    /// The tile file is missing from a local mirror.
    #[error("Tile file not found: {path}")]
    TileNotFound { path: PathBuf },

    /// The tile failed to load earlier in this session and is cached as unavailable.
    #[error("Elevation tile {id} is unavailable")]
    TileUnavailable { id: TileId },

    /// Failed to download a tile from the remote source.
    #[error("Failed to download tile {id}: {reason}")]
    DownloadFailed { id: TileId, reason: String },

    /// HTTP client error.
    #[cfg(feature = "download")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The operation was cancelled through a [`CancelToken`](crate::CancelToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// The sun position provider could not produce a value.
    #[error("Sun position unavailable: {0}")]
    SunUnavailable(String),

    /// No elevation tile backing the requested layer could be loaded.
    #[error("Layer unavailable: all {tiles} backing tiles failed to load")]
    LayerUnavailable { tiles: u64 },

    /// No renderer is registered under the requested name.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// No elevation data at the requested point.
    #[error("No elevation data at lat={lat}, lon={lon}")]
    NoData { lat: f64, lon: f64 },

    /// Invalid coordinate format.
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    /// Bounding box is empty or inverted.
    #[error("Invalid bounds: north={north}, south={south}, east={east}, west={west}")]
    InvalidBounds {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    /// Track input could not be parsed.
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// An area needs more tiles than one request may load.
    #[error("Area too large: needs {tiles} tiles, at most {max} allowed")]
    AreaTooLarge { tiles: u64, max: u64 },

    /// Configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using [`TerrainError`].
pub type Result<T> = std::result::Result<T, TerrainError>;
