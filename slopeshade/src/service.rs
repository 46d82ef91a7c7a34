//! Elevation tile service with bounded caching.
//!
//! This module provides [`TerrainService`], a high-level interface for
//! loading Terrarium tiles and querying elevation at arbitrary coordinates.
//!
//! Tiles are fetched through a [`TileSource`] and decoded once. Both decoded
//! tiles and failures are cached: a tile that failed to load is not retried
//! until it is invalidated.
//!
//! ```ignore
//! use slopeshade::{BoundingBox, TerrainServiceBuilder};
//!
//! let service = TerrainServiceBuilder::from_env()?.cache_size(256).build();
//!
//! let bounds = BoundingBox::new(47.50, 47.40, 11.80, 11.60);
//! let stats = service.preload_area(&bounds, 13);
//! println!("Loaded {} tiles in {}ms", stats.tiles_loaded, stats.elapsed_ms);
//!
//! if let Some(elevation) = service.elevation_at(47.45, 11.70, 13) {
//!     println!("Elevation: {:.1}m", elevation);
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use moka::sync::Cache;
use rayon::prelude::*;
use serde::Serialize;

use crate::coords::{clamp_zoom, meters_per_pixel, tile_fraction, BoundingBox, TileCoords, TileId};
use crate::error::{Result, TerrainError};
use crate::source::{CancelToken, DirTileSource, TileSource};
use crate::terrain::{slope_aspect, AspectBucket};
use crate::tile::{ElevationTile, TILE_SIZE};

/// Default maximum number of decoded tiles kept in memory.
pub const DEFAULT_CACHE_SIZE: u64 = 512;

/// Number of extra tiles loaded around a preload area on every side.
pub const PRELOAD_TILE_BUFFER: i64 = 1;

/// Most tiles a single layer request may preload, buffer included.
pub const MAX_PRELOAD_TILES: u64 = 512;

/// Something that can answer point elevation queries without blocking.
pub trait ElevationField: Send + Sync {
    /// Elevation in meters, or `None` when no data is available.
    fn elevation_at(&self, lat: f64, lon: f64, zoom: u8) -> Option<f64>;
}

/// Cached outcome of a tile load.
#[derive(Debug, Clone)]
pub enum TileEntry {
    /// The tile was fetched and decoded.
    Ready(Arc<ElevationTile>),
    /// The fetch or decode failed.
    Unavailable,
}

impl TileEntry {
    /// The decoded tile, if the load succeeded.
    pub fn tile(&self) -> Option<&Arc<ElevationTile>> {
        match self {
            TileEntry::Ready(tile) => Some(tile),
            TileEntry::Unavailable => None,
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses.
    pub miss_count: u64,
    /// Number of fetches issued to the tile source.
    pub fetch_count: u64,
    /// Number of fetches that ended with the tile marked unavailable.
    pub unavailable_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Statistics from a preload operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreloadStats {
    /// Number of tiles successfully loaded into cache.
    pub tiles_loaded: u64,
    /// Number of tiles that were already in cache.
    pub tiles_already_cached: u64,
    /// Number of tiles that failed to load.
    pub tiles_failed: u64,
    /// Number of tiles covering the area, buffer included.
    pub tiles_matched: u64,
    /// More tiles matched than the cache holds, so some loaded tiles may
    /// already have been evicted.
    pub exceeds_capacity: bool,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

impl PreloadStats {
    /// Whether every matched tile failed.
    pub fn all_failed(&self) -> bool {
        self.tiles_matched > 0 && self.tiles_failed == self.tiles_matched
    }
}

/// Elevation tile service with a bounded, load-coalescing cache.
///
/// Concurrent requests for the same tile share one fetch. Terminal
/// fetch or decode errors are logged and remembered as
/// [`TileEntry::Unavailable`]; cancellation is not cached.
pub struct TerrainService {
    source: Box<dyn TileSource>,
    tile_cache: Cache<TileId, TileEntry>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    fetch_count: AtomicU64,
    unavailable_count: AtomicU64,
}

impl TerrainService {
    /// Create a service reading from `source` with the default cache size.
    pub fn new(source: impl TileSource + 'static) -> Self {
        TerrainServiceBuilder::new(source).build()
    }

    /// Create a builder for more configuration options.
    pub fn builder(source: impl TileSource + 'static) -> TerrainServiceBuilder {
        TerrainServiceBuilder::new(source)
    }

    /// Load a tile, fetching it on first use.
    ///
    /// Returns `None` if the tile is unavailable. Repeated and concurrent
    /// calls for the same id perform at most one fetch.
    pub fn load_tile(&self, id: TileId) -> Option<Arc<ElevationTile>> {
        self.load_tile_with_cancel(id, &CancelToken::new()).ok()
    }

    /// Like [`load_tile`](Self::load_tile) but reporting why a tile is missing.
    ///
    /// # Errors
    ///
    /// [`TerrainError::TileUnavailable`] for a failed tile, or
    /// [`TerrainError::Cancelled`] if `cancel` fired before the fetch.
    pub fn load_tile_with_cancel(
        &self,
        id: TileId,
        cancel: &CancelToken,
    ) -> Result<Arc<ElevationTile>> {
        let entry = match self.tile_cache.get(&id) {
            Some(entry) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                entry
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                self.tile_cache
                    .try_get_with(id, || self.fetch_entry(id, cancel))
                    .map_err(|_| TerrainError::Cancelled)?
            }
        };

        match entry {
            TileEntry::Ready(tile) => Ok(tile),
            TileEntry::Unavailable => Err(TerrainError::TileUnavailable { id }),
        }
    }

    /// Fetch and decode one tile. Only cancellation is returned as an error.
    fn fetch_entry(&self, id: TileId, cancel: &CancelToken) -> Result<TileEntry> {
        cancel.check()?;
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tile = %id, source = %self.source.describe(), "fetching tile");

        let decoded = self
            .source
            .fetch(id)
            .and_then(|bytes| ElevationTile::from_png(id, &bytes));

        match decoded {
            Ok(tile) => Ok(TileEntry::Ready(Arc::new(tile))),
            Err(TerrainError::Cancelled) => Err(TerrainError::Cancelled),
            Err(e) => {
                self.unavailable_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(tile = %id, error = %e, "elevation tile unavailable");
                Ok(TileEntry::Unavailable)
            }
        }
    }

    /// Load every tile covering `bounds` at `zoom`, plus a one-tile buffer.
    ///
    /// Tiles load concurrently; the call returns once all loads settled.
    pub fn preload_area(&self, bounds: &BoundingBox, zoom: u8) -> PreloadStats {
        self.preload_area_with_cancel(bounds, zoom, &CancelToken::new())
    }

    /// [`preload_area`](Self::preload_area) with a cancellation token.
    ///
    /// Tiles skipped because of cancellation count as failed.
    pub fn preload_area_with_cancel(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        cancel: &CancelToken,
    ) -> PreloadStats {
        self.pin_area_with_cancel(bounds, zoom, cancel).0
    }

    /// Preload an area and keep its tiles alive for the caller.
    ///
    /// The returned [`PinnedTiles`] hold every tile that loaded, whether or
    /// not the cache has since evicted it.
    pub fn pin_area_with_cancel(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        cancel: &CancelToken,
    ) -> (PreloadStats, PinnedTiles) {
        let start = Instant::now();
        let zoom = clamp_zoom(zoom);
        let tiles = bounds.tile_range(zoom, PRELOAD_TILE_BUFFER);

        let mut stats = PreloadStats {
            tiles_matched: tiles.len() as u64,
            exceeds_capacity: tiles.len() as u64 > self.cache_capacity(),
            ..Default::default()
        };

        let outcomes: Vec<(TileId, bool, Option<Arc<ElevationTile>>)> = tiles
            .par_iter()
            .map(|&id| {
                let cached = self.is_cached(id);
                (id, cached, self.load_tile_with_cancel(id, cancel).ok())
            })
            .collect();

        let mut pinned = HashMap::with_capacity(outcomes.len());
        for (id, cached, tile) in outcomes {
            match (cached, tile) {
                (_, None) => stats.tiles_failed += 1,
                (true, Some(tile)) => {
                    stats.tiles_already_cached += 1;
                    pinned.insert(id, tile);
                }
                (false, Some(tile)) => {
                    stats.tiles_loaded += 1;
                    pinned.insert(id, tile);
                }
            }
        }

        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        if stats.exceeds_capacity {
            tracing::warn!(
                matched = stats.tiles_matched,
                capacity = self.cache_capacity(),
                "preload area exceeds cache capacity"
            );
        }
        tracing::info!(
            zoom,
            matched = stats.tiles_matched,
            loaded = stats.tiles_loaded,
            cached = stats.tiles_already_cached,
            failed = stats.tiles_failed,
            elapsed_ms = stats.elapsed_ms,
            "preload finished"
        );
        (stats, PinnedTiles { tiles: pinned })
    }

    /// Elevation at a coordinate from already cached tiles.
    ///
    /// Never fetches. Returns `None` when the backing tile is not cached,
    /// is unavailable, or the coordinate lies outside the Mercator world.
    pub fn elevation_at(&self, lat: f64, lon: f64, zoom: u8) -> Option<f64> {
        let (id, row, col) = pixel_for(lat, lon, zoom)?;
        let entry = self.tile_cache.get(&id)?;
        entry.tile().map(|tile| tile.get(row, col))
    }

    /// Elevation at a coordinate, loading the backing tile first if needed.
    pub fn elevation_at_loading(&self, lat: f64, lon: f64, zoom: u8) -> Option<f64> {
        let (id, row, col) = pixel_for(lat, lon, zoom)?;
        self.load_tile(id).map(|tile| tile.get(row, col))
    }

    /// Elevation, slope and aspect of the pixel under a coordinate.
    ///
    /// Loads the backing tile if needed. Gradients are computed at the
    /// tile's native resolution.
    pub fn terrain_at_loading(&self, lat: f64, lon: f64, zoom: u8) -> Option<PointTerrain> {
        let (id, row, col) = pixel_for(lat, lon, zoom)?;
        let tile = self.load_tile(id)?;
        let sample = slope_aspect(&tile, row, col, meters_per_pixel(id.z, id.y));
        Some(PointTerrain {
            tile: id,
            elevation: tile.get(row, col),
            slope_degrees: sample.slope_degrees,
            aspect_degrees: sample.aspect_degrees,
            aspect: sample.bucket(),
        })
    }

    /// Whether a tile (ready or unavailable) is in the cache.
    pub fn is_cached(&self, id: TileId) -> bool {
        self.tile_cache.contains_key(&id)
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.tile_cache.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            fetch_count: self.fetch_count.load(Ordering::Relaxed),
            unavailable_count: self.unavailable_count.load(Ordering::Relaxed),
        }
    }

    /// Get the maximum cache size.
    pub fn cache_capacity(&self) -> u64 {
        self.tile_cache.policy().max_capacity().unwrap_or(0)
    }

    /// Description of the configured tile source.
    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    /// Remove a tile from the cache so the next load fetches it again.
    pub fn invalidate_tile(&self, id: TileId) {
        self.tile_cache.invalidate(&id);
    }

    /// Clear all tiles from the cache.
    pub fn clear_cache(&self) {
        self.tile_cache.invalidate_all();
    }
}

impl ElevationField for TerrainService {
    fn elevation_at(&self, lat: f64, lon: f64, zoom: u8) -> Option<f64> {
        TerrainService::elevation_at(self, lat, lon, zoom)
    }
}

/// Decoded tiles held outside the cache for one computation.
#[derive(Debug, Default)]
pub struct PinnedTiles {
    tiles: HashMap<TileId, Arc<ElevationTile>>,
}

impl PinnedTiles {
    /// Number of held tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, id: TileId) -> Option<&Arc<ElevationTile>> {
        self.tiles.get(&id)
    }
}

impl ElevationField for PinnedTiles {
    fn elevation_at(&self, lat: f64, lon: f64, zoom: u8) -> Option<f64> {
        let (id, row, col) = pixel_for(lat, lon, zoom)?;
        self.tiles.get(&id).map(|tile| tile.get(row, col))
    }
}

/// Terrain values of a single pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointTerrain {
    /// Tile the pixel was read from.
    pub tile: TileId,
    pub elevation: f64,
    pub slope_degrees: f64,
    pub aspect_degrees: f64,
    pub aspect: AspectBucket,
}

/// Tile and pixel addressed by a coordinate.
fn pixel_for(lat: f64, lon: f64, zoom: u8) -> Option<(TileId, usize, usize)> {
    let z = clamp_zoom(zoom);
    let (fx, fy) = tile_fraction(lat, lon, z);
    if !fx.is_finite() || !fy.is_finite() {
        return None;
    }
    let coords = TileCoords {
        x: fx.floor() as i64,
        y: fy.floor() as i64,
        z,
        scale: (1u64 << z) as f64,
    };
    let id = coords.tile_id()?;

    let max = (TILE_SIZE - 1) as f64;
    let col = ((fx - fx.floor()) * TILE_SIZE as f64).floor().clamp(0.0, max) as usize;
    let row = ((fy - fy.floor()) * TILE_SIZE as f64).floor().clamp(0.0, max) as usize;
    Some((id, row, col))
}

/// Builder for creating [`TerrainService`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use slopeshade::{DirTileSource, TerrainServiceBuilder};
///
/// let service = TerrainServiceBuilder::new(DirTileSource::new("/data/terrarium"))
///     .cache_size(128)
///     .build();
/// ```
pub struct TerrainServiceBuilder {
    source: Box<dyn TileSource>,
    cache_size: u64,
}

impl TerrainServiceBuilder {
    /// Create a new builder reading tiles from `source`.
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SLOPESHADE_TILE_URL` | URL template with `{z}/{x}/{y}`* | AWS Terrarium* |
    /// | `SLOPESHADE_TILE_DIR` | Local `{z}/{x}/{y}.png` mirror | None |
    /// | `SLOPESHADE_CACHE_SIZE` | Maximum tiles in cache | 512 |
    /// | `SLOPESHADE_TIMEOUT_SECS` | HTTP timeout* | 30 |
    ///
    /// *Only used when the `download` feature is enabled. With both a URL and
    /// a directory set, the directory acts as the download mirror.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if a value is malformed, or if no
    /// tile source can be configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let cache_size = match lookup("SLOPESHADE_CACHE_SIZE") {
            Some(v) => v.trim().parse().map_err(|_| {
                TerrainError::Config(format!("SLOPESHADE_CACHE_SIZE is not a number: {}", v))
            })?,
            None => DEFAULT_CACHE_SIZE,
        };

        let dir = lookup("SLOPESHADE_TILE_DIR").map(PathBuf::from);
        let url = lookup("SLOPESHADE_TILE_URL");

        let source = Self::source_from(url, dir, &lookup)?;
        Ok(Self { source, cache_size })
    }

    #[cfg(feature = "download")]
    fn source_from(
        url: Option<String>,
        dir: Option<PathBuf>,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn TileSource>> {
        use crate::download::{DownloadConfig, HttpTileSource, DEFAULT_TIMEOUT_SECS};

        if url.is_none() {
            if let Some(dir) = dir {
                return Ok(Box::new(DirTileSource::new(dir)));
            }
        }

        let timeout = match lookup("SLOPESHADE_TIMEOUT_SECS") {
            Some(v) => v.trim().parse().map_err(|_| {
                TerrainError::Config(format!("SLOPESHADE_TIMEOUT_SECS is not a number: {}", v))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut config = match url {
            Some(template) => DownloadConfig::with_url_template(template),
            None => DownloadConfig::aws_terrarium(),
        }
        .with_timeout(timeout);
        if let Some(dir) = dir {
            config = config.with_cache_dir(dir);
        }
        Ok(Box::new(HttpTileSource::new(config)?))
    }

    #[cfg(not(feature = "download"))]
    fn source_from(
        url: Option<String>,
        dir: Option<PathBuf>,
        _lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn TileSource>> {
        match (url, dir) {
            (Some(_), _) => Err(TerrainError::Config(
                "SLOPESHADE_TILE_URL requires the `download` feature".to_string(),
            )),
            (None, Some(dir)) => Ok(Box::new(DirTileSource::new(dir))),
            (None, None) => Err(TerrainError::Config(
                "SLOPESHADE_TILE_DIR environment variable not set".to_string(),
            )),
        }
    }

    /// Set the maximum number of tiles to keep in cache.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    /// Replace the tile source.
    pub fn source(mut self, source: impl TileSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Build the [`TerrainService`].
    pub fn build(self) -> TerrainService {
        TerrainService {
            source: self.source,
            tile_cache: Cache::builder().max_capacity(self.cache_size).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            fetch_count: AtomicU64::new(0),
            unavailable_count: AtomicU64::new(0),
        }
    }
}
