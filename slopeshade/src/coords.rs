//! Slippy-map tile coordinate utilities.
//!
//! This module converts between WGS84 coordinates and the `(z, x, y)`
//! addressing scheme used by the Terrarium elevation tiles.
//!
//! # Tile Coordinate System
//!
//! - `z` is the zoom level (0-15, limited by the dataset resolution)
//! - `x` is the column (0 to 2^z - 1, from west to east)
//! - `y` is the row (0 to 2^z - 1, from north to south)
//!
//! Every tile is a 256×256 pixel raster.

use std::f64::consts::PI;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::tile::TILE_SIZE;

/// Maximum zoom level served by the Terrarium dataset.
pub const MAX_ZOOM: u8 = 15;

/// Equatorial circumference of the earth in meters (Web Mercator sphere).
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Clamp a requested zoom level to the dataset maximum.
pub fn clamp_zoom(zoom: u8) -> u8 {
    zoom.min(MAX_ZOOM)
}

/// Address of a single elevation tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    /// Zoom level.
    pub z: u8,
    /// Column, 0 at 180°W, increasing eastward.
    pub x: u32,
    /// Row, 0 at ~85.05°N, increasing southward.
    pub y: u32,
}

impl TileId {
    /// Create a tile id without range checks.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn scale(&self) -> u64 {
        1u64 << self.z
    }

    /// Whether `x` and `y` fall inside the `2^z × 2^z` world grid.
    pub fn is_valid(&self) -> bool {
        self.z <= 31 && (self.x as u64) < self.scale() && (self.y as u64) < self.scale()
    }

    /// The same tile with its zoom clamped to [`MAX_ZOOM`].
    ///
    /// Tiles deeper than the dataset are mapped to their ancestor.
    pub fn clamped(&self) -> Self {
        if self.z <= MAX_ZOOM {
            return *self;
        }
        let shift = self.z - MAX_ZOOM;
        Self {
            z: MAX_ZOOM,
            x: self.x >> shift,
            y: self.y >> shift,
        }
    }

    /// Geographic bounds of this tile.
    pub fn bounds(&self) -> BoundingBox {
        let n = self.scale() as f64;
        let west = self.x as f64 / n * 360.0 - 180.0;
        let east = (self.x + 1) as f64 / n * 360.0 - 180.0;
        let north = mercator_row_to_lat(self.y as f64, n);
        let south = mercator_row_to_lat((self.y + 1) as f64, n);
        BoundingBox::new(north, south, east, west)
    }

    /// Latitude/longitude of the tile center.
    pub fn center(&self) -> (f64, f64) {
        let n = self.scale() as f64;
        let lat = mercator_row_to_lat(self.y as f64 + 0.5, n);
        let lon = (self.x as f64 + 0.5) / n * 360.0 - 180.0;
        (lat, lon)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = TerrainError;

    /// Parse a `z/x/y` address. A trailing `.png` on `y` is accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use slopeshade::TileId;
    ///
    /// let id: TileId = "11/1090/716".parse().unwrap();
    /// assert_eq!(id, TileId::new(11, 1090, 716));
    /// assert!("11/1090".parse::<TileId>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TerrainError::InvalidTileId(s.to_string());
        let mut parts = s.trim().trim_matches('/').split('/');
        let z: u8 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let x: u32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let y_str = parts.next().ok_or_else(invalid)?;
        let y: u32 = y_str
            .strip_suffix(".png")
            .unwrap_or(y_str)
            .parse()
            .map_err(|_| invalid())?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        let id = TileId::new(z, x, y);
        if !id.is_valid() {
            return Err(invalid());
        }
        Ok(id)
    }
}

/// Result of projecting a coordinate into the tile grid.
///
/// `x` and `y` are signed so that coordinates outside the Mercator world
/// can be represented and filtered by callers instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileCoords {
    /// Tile column.
    pub x: i64,
    /// Tile row.
    pub y: i64,
    /// Zoom level after clamping.
    pub z: u8,
    /// Number of tiles along one axis (`2^z`).
    pub scale: f64,
}

impl TileCoords {
    /// Convert to a [`TileId`] if the coordinates lie inside the world grid.
    pub fn tile_id(&self) -> Option<TileId> {
        let max = self.scale as i64;
        if (0..max).contains(&self.x) && (0..max).contains(&self.y) {
            Some(TileId::new(self.z, self.x as u32, self.y as u32))
        } else {
            None
        }
    }
}

/// Fractional Web Mercator position in tile units at zoom `z`.
///
/// Returns `(fx, fy)`; `floor(fx), floor(fy)` is the tile column/row and the
/// fractional part is the position inside that tile.
pub fn tile_fraction(lat: f64, lon: f64, z: u8) -> (f64, f64) {
    let scale = (1u64 << z) as f64;
    let lat_rad = lat.to_radians();
    let fx = (lon + 180.0) / 360.0 * scale;
    let fy = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * scale;
    (fx, fy)
}

/// Project a coordinate to slippy tile coordinates.
///
/// The zoom level is clamped to [`MAX_ZOOM`].
///
/// # Examples
///
/// ```
/// use slopeshade::coords::tile_coords;
///
/// let c = tile_coords(0.0, 0.0, 12);
/// assert_eq!((c.x, c.y, c.z), (2048, 2048, 12));
///
/// // Zoom is clamped to the dataset limit
/// assert_eq!(tile_coords(47.0, 11.0, 18).z, 15);
/// ```
pub fn tile_coords(lat: f64, lon: f64, zoom: u8) -> TileCoords {
    let z = clamp_zoom(zoom);
    let (fx, fy) = tile_fraction(lat, lon, z);
    TileCoords {
        x: fx.floor() as i64,
        y: fy.floor() as i64,
        z,
        scale: (1u64 << z) as f64,
    }
}

/// Latitude of the center of tile row `y` at zoom `z`.
pub fn tile_center_latitude(z: u8, y: u32) -> f64 {
    let n = (1u64 << z) as f64;
    mercator_row_to_lat(y as f64 + 0.5, n)
}

/// Ground resolution of a tile row, in meters per pixel.
///
/// Uses the latitude of the tile center for the whole tile.
pub fn meters_per_pixel(z: u8, y: u32) -> f64 {
    let lat_rad = tile_center_latitude(z, y).to_radians();
    let n = (1u64 << z) as f64;
    EARTH_CIRCUMFERENCE_M * lat_rad.cos() / (n * TILE_SIZE as f64)
}

/// Inverse Mercator: fractional tile row to latitude in degrees.
fn mercator_row_to_lat(row: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * row / n)).sinh().atan().to_degrees()
}

/// A geographic bounding box in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern boundary latitude.
    pub north: f64,
    /// Southern boundary latitude.
    pub south: f64,
    /// Eastern boundary longitude.
    pub east: f64,
    /// Western boundary longitude.
    pub west: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Check that the box is finite and not inverted.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.north < self.south || self.east < self.west {
            return Err(TerrainError::InvalidBounds {
                north: self.north,
                south: self.south,
                east: self.east,
                west: self.west,
            });
        }
        Ok(())
    }

    /// Grow the box by `margin` degrees on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            north: self.north + margin,
            south: self.south - margin,
            east: self.east + margin,
            west: self.west - margin,
        }
    }

    /// Center point as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    /// Whether the point lies inside the box (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// All tiles covering this box at `zoom`, plus `buffer` tiles on each side.
    ///
    /// Indices outside the world grid are skipped.
    pub fn tile_range(&self, zoom: u8, buffer: i64) -> Vec<TileId> {
        let (xs, ys, z) = self.index_ranges(zoom, buffer);
        let mut tiles = Vec::new();
        for x in xs {
            for y in ys.clone() {
                tiles.push(TileId::new(z, x as u32, y as u32));
            }
        }
        tiles
    }

    /// Number of tiles [`tile_range`](Self::tile_range) would return.
    pub fn tile_count(&self, zoom: u8, buffer: i64) -> u64 {
        let (xs, ys, _) = self.index_ranges(zoom, buffer);
        let span = |r: RangeInclusive<i64>| (r.end() - r.start() + 1).max(0) as u64;
        span(xs) * span(ys)
    }

    /// Column and row ranges clipped to the world grid.
    fn index_ranges(
        &self,
        zoom: u8,
        buffer: i64,
    ) -> (RangeInclusive<i64>, RangeInclusive<i64>, u8) {
        let nw = tile_coords(self.north, self.west, zoom);
        let se = tile_coords(self.south, self.east, zoom);
        let max = nw.scale as i64 - 1;

        let xs = nw.x.saturating_sub(buffer).max(0)..=se.x.saturating_add(buffer).min(max);
        let ys = nw.y.saturating_sub(buffer).max(0)..=se.y.saturating_add(buffer).min(max);
        (xs, ys, nw.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tile_coords_equator() {
        let c = tile_coords(0.0, 0.0, 12);
        assert_eq!(c.x, 2048);
        assert_eq!(c.y, 2048);
        assert_eq!(c.scale, 4096.0);
    }

    #[test]
    fn test_tile_coords_alps() {
        // Karwendel, inside the 11/1090/716 reference tile
        let c = tile_coords(47.45, 11.70, 11);
        assert_eq!((c.x, c.y, c.z), (1090, 716, 11));

        let id = c.tile_id().unwrap();
        let bounds = id.bounds();
        assert!(bounds.contains(47.45, 11.70));
    }

    #[test]
    fn test_zoom_clamped() {
        let c = tile_coords(47.0, 11.0, 20);
        assert_eq!(c.z, MAX_ZOOM);
        assert_eq!(clamp_zoom(3), 3);
    }

    #[test]
    fn test_tile_roundtrip_contains_point() {
        let points = [
            (47.6062, -122.3321),
            (46.5586, 7.9869),
            (-33.8688, 151.2093),
            (0.0, 0.0),
        ];
        for (lat, lon) in points {
            let id = tile_coords(lat, lon, 13).tile_id().unwrap();
            let b = id.bounds();
            assert!(b.contains(lat, lon), "{lat},{lon} not in {id}: {b:?}");
        }
    }

    #[test]
    fn test_tile_id_parse_and_display() {
        let id: TileId = "11/1090/716.png".parse().unwrap();
        assert_eq!(id, TileId::new(11, 1090, 716));
        assert_eq!(id.to_string(), "11/1090/716");

        assert!("a/b/c".parse::<TileId>().is_err());
        assert!("2/4/0".parse::<TileId>().is_err()); // x out of range at z=2
        assert!("1/0/0/0".parse::<TileId>().is_err());
    }

    #[test]
    fn test_tile_id_clamped() {
        let id = TileId::new(17, 4000, 3000);
        let c = id.clamped();
        assert_eq!(c, TileId::new(15, 1000, 750));
        assert_eq!(TileId::new(11, 5, 5).clamped(), TileId::new(11, 5, 5));
    }

    #[test]
    fn test_meters_per_pixel_equator() {
        // At z=0 the single tile row is centered on the equator
        let mpp = meters_per_pixel(0, 0);
        assert_relative_eq!(mpp, EARTH_CIRCUMFERENCE_M / 256.0, max_relative = 1e-12);
    }

    #[test]
    fn test_meters_per_pixel_shrinks_with_latitude() {
        // Rows further north cover fewer meters per pixel
        let z = 11;
        let equator = meters_per_pixel(z, 1024);
        let alps = meters_per_pixel(z, 716);
        assert!(alps < equator);
        let expected = EARTH_CIRCUMFERENCE_M * tile_center_latitude(z, 716).to_radians().cos()
            / (2048.0 * 256.0);
        assert_relative_eq!(alps, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_tile_range_has_buffer() {
        let id = TileId::new(11, 1090, 716);
        let (lat, lon) = id.center();
        let bbox = BoundingBox::new(lat + 0.001, lat - 0.001, lon + 0.001, lon - 0.001);

        let tiles = bbox.tile_range(11, 1);
        assert_eq!(tiles.len(), 9);
        assert!(tiles.contains(&TileId::new(11, 1089, 715)));
        assert!(tiles.contains(&TileId::new(11, 1091, 717)));

        assert_eq!(bbox.tile_range(11, 0), vec![id]);
    }

    #[test]
    fn test_tile_range_skips_outside_world() {
        // Top-left corner of the world: the buffer would go negative
        let bbox = BoundingBox::new(85.0, 84.9, -179.9, -180.0);
        let tiles = bbox.tile_range(2, 1);
        assert!(tiles.iter().all(|t| t.is_valid()));
        assert_eq!(tiles.len(), 4); // x in 0..=1, y in 0..=1
    }

    #[test]
    fn test_tile_count_matches_range() {
        let bbox = BoundingBox::new(47.55, 47.35, 11.85, 11.65);
        assert_eq!(bbox.tile_count(15, 1), bbox.tile_range(15, 1).len() as u64);
        assert_eq!(bbox.tile_count(11, 1), 20);

        let corner = BoundingBox::new(85.0, 84.9, -179.9, -180.0);
        assert_eq!(corner.tile_count(2, 1), 4);
    }

    #[test]
    fn test_tile_count_large_area_without_allocating() {
        let bbox = BoundingBox::new(60.0, 30.0, 30.0, 0.0);
        assert!(bbox.tile_count(15, 1) > 10_000_000);
        // Whole world at zoom 2
        let world = BoundingBox::new(85.0, -85.0, 179.9, -180.0);
        assert_eq!(world.tile_count(2, 1), 16);
    }

    #[test]
    fn test_bounding_box_validate() {
        assert!(BoundingBox::new(47.5, 47.3, 10.4, 10.2).validate().is_ok());
        assert!(BoundingBox::new(47.3, 47.5, 10.4, 10.2).validate().is_err());
        assert!(BoundingBox::new(f64::NAN, 47.5, 10.4, 10.2)
            .validate()
            .is_err());
    }

    #[test]
    fn test_bounding_box_expand_and_center() {
        let bbox = BoundingBox::new(47.5, 47.3, 10.4, 10.2).expand(0.05);
        assert_relative_eq!(bbox.north, 47.55);
        assert_relative_eq!(bbox.west, 10.15);
        let (lat, lon) = bbox.center();
        assert_relative_eq!(lat, 47.4);
        assert_relative_eq!(lon, 10.3);
    }
}
