//! Raster compositing of slope and aspect tiles.
//!
//! Each output pixel depends only on its source pixel and that pixel's east
//! and south neighbors, so rows are rendered in parallel.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, RgbaImage};
use rayon::prelude::*;

use crate::coords::meters_per_pixel;
use crate::error::Result;
use crate::terrain::{slope_aspect, AspectBucket, TerrainSample};
use crate::tile::{ElevationTile, TILE_SIZE};

/// Alpha of every colored slope and aspect pixel.
pub const OVERLAY_ALPHA: u8 = 204;

/// Minimum slope, in degrees, that the aspect layer colors.
pub const ASPECT_MIN_SLOPE: f64 = 20.0;

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Avalanche-style slope classes: `(min slope, rgb)`, steepest first.
const SLOPE_CLASSES: [(f64, [u8; 3]); 5] = [
    (45.0, [26, 0, 51]),
    (40.0, [153, 0, 0]),
    (35.0, [255, 0, 0]),
    (30.0, [255, 128, 0]),
    (27.0, [255, 255, 0]),
];

/// Color of a slope in degrees.
pub fn slope_color(slope_degrees: f64) -> [u8; 4] {
    SLOPE_CLASSES
        .iter()
        .find(|(min, _)| slope_degrees >= *min)
        .map_or(TRANSPARENT, |(_, [r, g, b])| [*r, *g, *b, OVERLAY_ALPHA])
}

/// Color of an aspect bucket.
pub fn aspect_color(bucket: AspectBucket) -> [u8; 4] {
    let [r, g, b] = match bucket {
        AspectBucket::N => [59, 130, 246],
        AspectBucket::NE => [34, 211, 238],
        AspectBucket::E => [34, 197, 94],
        AspectBucket::SE => [163, 230, 53],
        AspectBucket::S => [239, 68, 68],
        AspectBucket::SW => [251, 146, 60],
        AspectBucket::W => [250, 204, 21],
        AspectBucket::NW => [168, 85, 247],
    };
    [r, g, b, OVERLAY_ALPHA]
}

/// Color of a terrain sample in the slope-aspect layer.
pub fn slope_aspect_color(sample: &TerrainSample) -> [u8; 4] {
    if sample.slope_degrees >= ASPECT_MIN_SLOPE {
        aspect_color(sample.bucket())
    } else {
        TRANSPARENT
    }
}

/// Render a tile by mapping every terrain sample through `color`.
fn render_with(
    tile: &ElevationTile,
    color: impl Fn(&TerrainSample) -> [u8; 4] + Sync,
) -> RgbaImage {
    let id = tile.id();
    let mpp = meters_per_pixel(id.z, id.y);

    let mut image = RgbaImage::new(TILE_SIZE as u32, TILE_SIZE as u32);
    let buf: &mut [u8] = &mut image;
    buf.par_chunks_mut(TILE_SIZE * 4)
        .enumerate()
        .for_each(|(row, out)| {
            for (col, px) in out.chunks_exact_mut(4).enumerate() {
                let sample = slope_aspect(tile, row, col, mpp);
                px.copy_from_slice(&color(&sample));
            }
        });
    image
}

/// Slope classes overlay for one tile.
pub fn render_slope(tile: &ElevationTile) -> RgbaImage {
    render_with(tile, |s| slope_color(s.slope_degrees))
}

/// Aspect overlay for one tile, limited to slopes of at least 20°.
pub fn render_slope_aspect(tile: &ElevationTile) -> RgbaImage {
    render_with(tile, slope_aspect_color)
}

/// Encode an RGBA raster as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut bytes, CompressionType::Fast, FilterType::Adaptive);
    encoder.write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8.into())?;
    Ok(bytes)
}

/// A named per-tile raster layer.
pub trait TileRenderer: Send + Sync {
    /// Layer name used in tile URLs.
    fn name(&self) -> &str;

    /// Render one elevation tile.
    fn render(&self, tile: &ElevationTile) -> RgbaImage;
}

/// The `slope` layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlopeRenderer;

impl TileRenderer for SlopeRenderer {
    fn name(&self) -> &str {
        "slope"
    }

    fn render(&self, tile: &ElevationTile) -> RgbaImage {
        render_slope(tile)
    }
}

/// The `slope-aspect` layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlopeAspectRenderer;

impl TileRenderer for SlopeAspectRenderer {
    fn name(&self) -> &str {
        "slope-aspect"
    }

    fn render(&self, tile: &ElevationTile) -> RgbaImage {
        render_slope_aspect(tile)
    }
}
