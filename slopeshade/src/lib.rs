//! # slopeshade - Terrain analysis on Terrarium elevation tiles
//!
//! Library for decoding Terrarium-encoded elevation tiles and deriving
//! terrain layers from them: slope classes, slope aspect and cast shadows.
//!
//! ## Features
//!
//! - **Tile cache**: Bounded, load-coalescing cache of decoded tiles
//! - **Slope and aspect**: Per-pixel gradients at the native tile resolution
//! - **Shadows**: Ray-cast terrain shadows for any time of day
//! - **Route statistics**: Slope and aspect exposure of recorded tracks
//!
//! ## Quick Start
//!
//! ```ignore
//! use slopeshade::{DirTileSource, LayerRegistry, TerrainService, TileId};
//!
//! let service = TerrainService::new(DirTileSource::new("/data/terrarium"));
//! let registry = LayerRegistry::with_defaults();
//!
//! let png = registry.render_tile(&service, "slope", TileId::new(13, 4362, 2866))?;
//! std::fs::write("slope.png", png)?;
//! ```
//!
//! ## Terrarium Data Format
//!
//! Each tile is a 256×256 PNG in the Web Mercator `z/x/y` scheme. Elevation
//! is packed into the RGB channels:
//!
//! ```text
//! elevation = (R * 256 + G + B / 256) - 32768
//! ```
//!
//! ## Data Sources
//!
//! Terrarium tiles are served publicly from AWS:
//! - <https://registry.opendata.aws/terrain-tiles/>

pub mod coords;
#[cfg(feature = "download")]
pub mod download;
pub mod error;
#[cfg(feature = "geojson")]
pub mod geojson;
#[cfg(feature = "gpx")]
pub mod gpx;
pub mod registry;
pub mod render;
pub mod route;
pub mod service;
pub mod shadow;
pub mod source;
pub mod sun;
pub mod terrain;
pub mod tile;

// Re-export main types at crate root for convenience
pub use coords::{BoundingBox, TileId, MAX_ZOOM};
#[cfg(feature = "download")]
pub use download::{DownloadConfig, HttpTileSource};
pub use error::{Result, TerrainError};
pub use registry::LayerRegistry;
pub use render::{SlopeAspectRenderer, SlopeRenderer, TileRenderer};
pub use route::{analyze_track, RouteStats, TrackPoint};
pub use service::{
    CacheStats, ElevationField, PinnedTiles, PointTerrain, PreloadStats, TerrainService,
    TerrainServiceBuilder, MAX_PRELOAD_TILES,
};
pub use shadow::{ShadowCaster, ShadowLayer, ShadowLayerGenerator};
pub use source::{CancelToken, DirTileSource, TileSource};
pub use sun::{FixedSun, SpaSun, SunPosition, SunProvider};
pub use terrain::{AspectBucket, TerrainSample};
pub use tile::ElevationTile;
