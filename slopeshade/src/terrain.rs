//! Slope and aspect estimation.
//!
//! Gradients use forward differences to the east and south neighbor inside
//! a single tile. On the right and bottom edge the neighbor is clamped to the
//! pixel itself, so the gradient along that axis is zero. No cross-tile
//! lookups are performed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coords::meters_per_pixel;
use crate::tile::{ElevationTile, TILE_SIZE};

/// Slope and aspect of one terrain pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainSample {
    /// Slope in degrees from horizontal, `>= 0`.
    pub slope_degrees: f64,
    /// Compass bearing of the downhill direction in `[0, 360)`, 0 = north.
    pub aspect_degrees: f64,
}

impl TerrainSample {
    /// Compass sector of the aspect.
    pub fn bucket(&self) -> AspectBucket {
        AspectBucket::from_degrees(self.aspect_degrees)
    }
}

/// Slope and aspect from elevation differences to the east and south neighbor.
///
/// `dz_east` is `east - center`, `dz_south` is `south - center`, both in meters.
#[inline]
pub fn slope_aspect_from_deltas(
    dz_east: f64,
    dz_south: f64,
    meters_per_pixel: f64,
) -> TerrainSample {
    let dzdx = dz_east / meters_per_pixel;
    let dzdy = dz_south / meters_per_pixel;

    let slope_degrees = (dzdx * dzdx + dzdy * dzdy).sqrt().atan().to_degrees();

    let mut aspect_degrees = 90.0 - dzdy.atan2(dzdx).to_degrees();
    if aspect_degrees < 0.0 {
        aspect_degrees += 360.0;
    }
    if aspect_degrees >= 360.0 {
        aspect_degrees -= 360.0;
    }

    TerrainSample {
        slope_degrees,
        aspect_degrees,
    }
}

/// Slope and aspect at `(row, col)` of a decoded tile.
#[inline]
pub fn slope_aspect(
    tile: &ElevationTile,
    row: usize,
    col: usize,
    meters_per_pixel: f64,
) -> TerrainSample {
    let center = tile.get(row, col);
    let east = if col < TILE_SIZE - 1 {
        tile.get(row, col + 1)
    } else {
        center
    };
    let south = if row < TILE_SIZE - 1 {
        tile.get(row + 1, col)
    } else {
        center
    };
    slope_aspect_from_deltas(east - center, south - center, meters_per_pixel)
}

/// Slope and aspect for every pixel of a tile, row-major.
pub fn slope_grid(tile: &ElevationTile) -> Vec<TerrainSample> {
    let id = tile.id();
    let mpp = meters_per_pixel(id.z, id.y);
    let mut out = Vec::with_capacity(TILE_SIZE * TILE_SIZE);
    for row in 0..TILE_SIZE {
        for col in 0..TILE_SIZE {
            out.push(slope_aspect(tile, row, col, mpp));
        }
    }
    out
}

/// One of the eight 45° compass sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectBucket {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl AspectBucket {
    /// All buckets in clockwise order starting at north.
    pub const ALL: [AspectBucket; 8] = [
        AspectBucket::N,
        AspectBucket::NE,
        AspectBucket::E,
        AspectBucket::SE,
        AspectBucket::S,
        AspectBucket::SW,
        AspectBucket::W,
        AspectBucket::NW,
    ];

    /// Classify a compass bearing.
    ///
    /// Sectors are 45° wide and centered on each direction; north covers
    /// `[337.5, 360) ∪ [0, 22.5)`. A bearing exactly on a boundary belongs to
    /// the sector that starts there.
    ///
    /// # Examples
    ///
    /// ```
    /// use slopeshade::AspectBucket;
    ///
    /// assert_eq!(AspectBucket::from_degrees(0.0), AspectBucket::N);
    /// assert_eq!(AspectBucket::from_degrees(22.5), AspectBucket::NE);
    /// assert_eq!(AspectBucket::from_degrees(337.5), AspectBucket::N);
    /// ```
    pub fn from_degrees(bearing: f64) -> Self {
        if bearing >= 337.5 || bearing < 22.5 {
            AspectBucket::N
        } else if bearing < 67.5 {
            AspectBucket::NE
        } else if bearing < 112.5 {
            AspectBucket::E
        } else if bearing < 157.5 {
            AspectBucket::SE
        } else if bearing < 202.5 {
            AspectBucket::S
        } else if bearing < 247.5 {
            AspectBucket::SW
        } else if bearing < 292.5 {
            AspectBucket::W
        } else {
            AspectBucket::NW
        }
    }

    /// Position in [`AspectBucket::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short compass name.
    pub fn as_str(self) -> &'static str {
        match self {
            AspectBucket::N => "N",
            AspectBucket::NE => "NE",
            AspectBucket::E => "E",
            AspectBucket::SE => "SE",
            AspectBucket::S => "S",
            AspectBucket::SW => "SW",
            AspectBucket::W => "W",
            AspectBucket::NW => "NW",
        }
    }
}

impl fmt::Display for AspectBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectBucket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AspectBucket::ALL
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown aspect '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::TileId;
    use approx::assert_relative_eq;

    fn tile_from_fn(f: impl Fn(usize, usize) -> f32) -> ElevationTile {
        let mut samples = Vec::with_capacity(TILE_SIZE * TILE_SIZE);
        for row in 0..TILE_SIZE {
            for col in 0..TILE_SIZE {
                samples.push(f(row, col));
            }
        }
        ElevationTile::from_elevations(TileId::new(11, 1090, 716), samples).unwrap()
    }

    #[test]
    fn test_flat_terrain() {
        let tile = tile_from_fn(|_, _| 1200.0);
        let s = slope_aspect(&tile, 100, 100, 30.0);
        assert_eq!(s.slope_degrees, 0.0);
        // atan2(0, 0) = 0 → bearing 90
        assert_eq!(s.aspect_degrees, 90.0);
    }

    #[test]
    fn test_known_slope_50m_25m() {
        // 25 m of relief over a 50 m pixel
        let s = slope_aspect_from_deltas(25.0, 0.0, 50.0);
        assert_relative_eq!(s.slope_degrees, 26.565051177077986, epsilon = 1e-9);
        assert_relative_eq!(s.slope_degrees, (25.0f64 / 50.0).atan().to_degrees());
    }

    #[test]
    fn test_slope_monotonic_in_gradient() {
        let gentle = tile_from_fn(|_, col| col as f32 * 5.0);
        let steep = tile_from_fn(|_, col| col as f32 * 12.0);
        let mpp = 40.0;
        for &(row, col) in &[(0, 0), (50, 120), (200, 254)] {
            let a = slope_aspect(&gentle, row, col, mpp).slope_degrees;
            let b = slope_aspect(&steep, row, col, mpp).slope_degrees;
            assert!(b >= a, "steeper tile reported smaller slope at ({row},{col})");
        }
    }

    #[test]
    fn test_aspect_conventions() {
        // Elevation increasing eastward: dzdx > 0 → atan2(0, +) = 0 → 90
        let s = slope_aspect_from_deltas(10.0, 0.0, 30.0);
        assert_relative_eq!(s.aspect_degrees, 90.0);

        // Elevation increasing southward: dzdy > 0 → atan2(+, 0) = 90 → 0
        let s = slope_aspect_from_deltas(0.0, 10.0, 30.0);
        assert_relative_eq!(s.aspect_degrees, 0.0);

        // Elevation decreasing eastward: atan2(0, -) = 180 → -90 → 270
        let s = slope_aspect_from_deltas(-10.0, 0.0, 30.0);
        assert_relative_eq!(s.aspect_degrees, 270.0);

        // Elevation decreasing southward: atan2(-, 0) = -90 → 180
        let s = slope_aspect_from_deltas(0.0, -10.0, 30.0);
        assert_relative_eq!(s.aspect_degrees, 180.0);
    }

    #[test]
    fn test_aspect_always_in_range() {
        for i in 0..64 {
            let angle = i as f64 / 64.0 * std::f64::consts::TAU;
            let s = slope_aspect_from_deltas(angle.cos() * 7.0, angle.sin() * 7.0, 20.0);
            assert!((0.0..360.0).contains(&s.aspect_degrees), "{}", s.aspect_degrees);
        }
    }

    #[test]
    fn test_edge_clamping() {
        // Plane rising both east and south
        let tile = tile_from_fn(|row, col| (row * 3 + col * 4) as f32);
        let mpp = 10.0;

        // Interior pixel uses both neighbors
        let inner = slope_aspect(&tile, 10, 10, mpp);
        assert_relative_eq!(inner.slope_degrees, (0.5f64).atan().to_degrees(), epsilon = 1e-9);

        // Right edge: east neighbor clamped, only the south gradient remains
        let right = slope_aspect(&tile, 10, 255, mpp);
        assert_relative_eq!(right.slope_degrees, (0.3f64).atan().to_degrees(), epsilon = 1e-9);
        assert_relative_eq!(right.aspect_degrees, 0.0);

        // Bottom edge: south neighbor clamped
        let bottom = slope_aspect(&tile, 255, 10, mpp);
        assert_relative_eq!(bottom.slope_degrees, (0.4f64).atan().to_degrees(), epsilon = 1e-9);
        assert_relative_eq!(bottom.aspect_degrees, 90.0);

        // Corner: both clamped, flat
        assert_eq!(slope_aspect(&tile, 255, 255, mpp).slope_degrees, 0.0);
    }

    #[test]
    fn test_bucket_boundaries() {
        let cases = [
            (0.0, AspectBucket::N),
            (22.4999, AspectBucket::N),
            (22.5, AspectBucket::NE),
            (67.5, AspectBucket::E),
            (112.5, AspectBucket::SE),
            (157.5, AspectBucket::S),
            (202.5, AspectBucket::SW),
            (247.5, AspectBucket::W),
            (292.5, AspectBucket::NW),
            (337.4999, AspectBucket::NW),
            (337.5, AspectBucket::N),
            (359.9, AspectBucket::N),
        ];
        for (deg, expected) in cases {
            assert_eq!(AspectBucket::from_degrees(deg), expected, "bearing {deg}");
        }
    }

    #[test]
    fn test_bucket_names() {
        for (i, b) in AspectBucket::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
            assert_eq!(b.as_str().parse::<AspectBucket>().unwrap(), *b);
        }
        assert_eq!("sw".parse::<AspectBucket>().unwrap(), AspectBucket::SW);
        assert!("up".parse::<AspectBucket>().is_err());
        assert_eq!(serde_json::to_string(&AspectBucket::NE).unwrap(), "\"NE\"");
    }

    #[test]
    fn test_slope_grid_len() {
        let tile = tile_from_fn(|_, col| col as f32);
        let grid = slope_grid(&tile);
        assert_eq!(grid.len(), TILE_SIZE * TILE_SIZE);
        assert!(grid[0].slope_degrees > 0.0);
    }
}
