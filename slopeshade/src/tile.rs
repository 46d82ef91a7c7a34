//! Terrarium tile decoding.
//!
//! This module provides the [`ElevationTile`] struct, a decoded 256×256
//! height field built from a Terrarium-encoded PNG.
//!
//! # Terrarium Encoding
//!
//! Each pixel stores elevation in its RGB channels:
//!
//! ```text
//! elevation = (R * 256 + G + B / 256) - 32768
//! ```
//!
//! The alpha channel (if any) is ignored. The formula is applied to every
//! pixel without range checks.

use image::ImageFormat;

use crate::coords::TileId;
use crate::error::{Result, TerrainError};

/// Width and height of a Terrarium tile, in pixels.
pub const TILE_SIZE: usize = 256;

/// Number of samples in a tile.
const TILE_SAMPLES: usize = TILE_SIZE * TILE_SIZE;

/// Decode a single Terrarium pixel to meters.
///
/// # Examples
///
/// ```
/// use slopeshade::tile::decode_terrarium;
///
/// assert_eq!(decode_terrarium(128, 0, 0), 0.0);
/// assert_eq!(decode_terrarium(136, 112, 128), 2160.5);
/// ```
#[inline]
pub fn decode_terrarium(r: u8, g: u8, b: u8) -> f64 {
    (r as f64 * 256.0 + g as f64 + b as f64 / 256.0) - 32768.0
}

/// A decoded elevation tile.
///
/// Samples are stored row-major with row 0 at the top (north) edge. The
/// Terrarium encoding carries 24 bits of precision, so `f32` storage is exact.
#[derive(Debug, Clone)]
pub struct ElevationTile {
    id: TileId,
    samples: Vec<f32>,
}

impl ElevationTile {
    /// Decode a Terrarium PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid PNG, or the image is not
    /// 256×256.
    pub fn from_png(id: TileId, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
        if image.width() as usize != TILE_SIZE || image.height() as usize != TILE_SIZE {
            return Err(TerrainError::InvalidTileSize {
                width: image.width(),
                height: image.height(),
            });
        }
        let rgb = image.to_rgb8();
        Self::from_rgb(id, rgb.as_raw())
    }

    /// Decode a flat RGB8 buffer (`256 * 256 * 3` bytes).
    pub fn from_rgb(id: TileId, data: &[u8]) -> Result<Self> {
        Self::from_pixels(id, data, 3)
    }

    /// Decode a flat RGBA8 buffer (`256 * 256 * 4` bytes), ignoring alpha.
    pub fn from_rgba(id: TileId, data: &[u8]) -> Result<Self> {
        Self::from_pixels(id, data, 4)
    }

    fn from_pixels(id: TileId, data: &[u8], channels: usize) -> Result<Self> {
        if data.len() != TILE_SAMPLES * channels {
            return Err(TerrainError::InvalidTileSize {
                width: (data.len() / channels / TILE_SIZE) as u32,
                height: TILE_SIZE as u32,
            });
        }
        let samples = data
            .chunks_exact(channels)
            .map(|px| decode_terrarium(px[0], px[1], px[2]) as f32)
            .collect();
        Ok(Self { id, samples })
    }

    /// Build a tile from elevation samples in meters.
    ///
    /// Useful for synthetic terrain in tests and benchmarks.
    pub fn from_elevations(id: TileId, samples: Vec<f32>) -> Result<Self> {
        if samples.len() != TILE_SAMPLES {
            return Err(TerrainError::InvalidTileSize {
                width: (samples.len() / TILE_SIZE) as u32,
                height: TILE_SIZE as u32,
            });
        }
        Ok(Self { id, samples })
    }

    /// Tile address.
    pub fn id(&self) -> TileId {
        self.id
    }

    /// Elevation at a pixel, in meters.
    ///
    /// Row and column are clamped to `[0, 255]`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let row = row.min(TILE_SIZE - 1);
        let col = col.min(TILE_SIZE - 1);
        self.samples[row * TILE_SIZE + col] as f64
    }

    /// Raw samples, row-major.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Lowest and highest elevation in the tile.
    pub fn min_max(&self) -> (f64, f64) {
        let (min, max) = self
            .samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        (min as f64, max as f64)
    }
}

/// Encode an elevation to the Terrarium RGB triple nearest to it.
///
/// Used to build reference tiles; values are truncated to the encoding's
/// 1/256 m resolution.
#[cfg(test)]
pub(crate) fn encode_terrarium(elevation: f64) -> [u8; 3] {
    let v = ((elevation + 32768.0) * 256.0).floor() as u32;
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}

/// PNG whose pixels encode `elevation(row, col)`.
#[cfg(test)]
pub(crate) fn terrarium_png(elevation: impl Fn(u32, u32) -> f64) -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(256, 256, |col, row| {
        image::Rgb(encode_terrarium(elevation(row, col)))
    });
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// 11/1090/716 stored as raw RGB: sea level except `(136, 112, 128)` at the
/// center pixel.
#[cfg(test)]
pub(crate) fn reference_png() -> Vec<u8> {
    let mut img = image::RgbImage::from_pixel(256, 256, image::Rgb([128, 0, 0]));
    img.put_pixel(128, 128, image::Rgb([136, 112, 128]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn test_id() -> TileId {
        TileId::new(11, 1090, 716)
    }

    #[test]
    fn test_decode_formula() {
        assert_eq!(decode_terrarium(0, 0, 0), -32768.0);
        assert_eq!(decode_terrarium(128, 0, 0), 0.0);
        assert_eq!(decode_terrarium(255, 255, 255), 32767.0 + 255.0 / 256.0);
        // Zugspitze summit, ~2962 m
        assert_eq!(decode_terrarium(139, 146, 0), 2962.0);
    }

    #[test]
    fn test_decode_reference_triples() {
        // Triples built from the formula decode back exactly
        for &elevation in &[-412.5, 0.0, 1.25, 476.0, 2962.0, 4807.75, 8848.0] {
            let [r, g, b] = encode_terrarium(elevation);
            assert_eq!(decode_terrarium(r, g, b), elevation);
        }
    }

    #[test]
    fn test_from_png() {
        let png = terrarium_png(|row, col| 1000.0 + row as f64 + col as f64 / 4.0);
        let tile = ElevationTile::from_png(test_id(), &png).unwrap();

        assert_eq!(tile.id(), test_id());
        assert_eq!(tile.get(0, 0), 1000.0);
        assert_eq!(tile.get(10, 0), 1010.0);
        assert_eq!(tile.get(0, 2), 1000.5);
        assert_eq!(tile.get(255, 255), 1000.0 + 255.0 + 63.75);
    }

    #[test]
    fn test_reference_center_pixel() {
        let tile = ElevationTile::from_png(test_id(), &reference_png()).unwrap();
        // 136 * 256 + 112 + 128 / 256 - 32768
        assert_eq!(tile.get(128, 128), 2160.5);
        assert_eq!(tile.get(0, 0), 0.0);
        assert_eq!(tile.get(128, 129), 0.0);
    }

    #[test]
    fn test_center_pixel_matches_formula() {
        let png = terrarium_png(|row, col| if row == 128 && col == 128 { 2160.5 } else { 0.0 });
        let tile = ElevationTile::from_png(test_id(), &png).unwrap();
        assert_eq!(tile.get(128, 128), decode_terrarium(136, 112, 128));
    }

    #[test]
    fn test_from_png_rgba_ignores_alpha() {
        let img = ImageBuffer::from_fn(256, 256, |_, _| {
            let [r, g, b] = encode_terrarium(1500.0);
            Rgba([r, g, b, 7])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let tile = ElevationTile::from_png(test_id(), &bytes).unwrap();
        assert_eq!(tile.get(100, 100), 1500.0);
    }

    #[test]
    fn test_invalid_size() {
        let img: ImageBuffer<Rgb<u8>, _> = ImageBuffer::new(512, 512);
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        match ElevationTile::from_png(test_id(), &bytes) {
            Err(TerrainError::InvalidTileSize { width, height }) => {
                assert_eq!((width, height), (512, 512));
            }
            other => panic!("Expected InvalidTileSize, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_png() {
        let result = ElevationTile::from_png(test_id(), b"not a png");
        assert!(matches!(result, Err(TerrainError::Decode(_))));
    }

    #[test]
    fn test_get_clamps() {
        let tile =
            ElevationTile::from_elevations(test_id(), (0..TILE_SAMPLES).map(|i| i as f32).collect())
                .unwrap();
        assert_eq!(tile.get(300, 0), tile.get(255, 0));
        assert_eq!(tile.get(0, 999), tile.get(0, 255));
    }

    #[test]
    fn test_min_max() {
        let mut samples = vec![800.0f32; TILE_SAMPLES];
        samples[42] = 650.0;
        samples[9000] = 2100.5;
        let tile = ElevationTile::from_elevations(test_id(), samples).unwrap();
        assert_eq!(tile.min_max(), (650.0, 2100.5));
    }

    #[test]
    fn test_from_elevations_wrong_len() {
        assert!(ElevationTile::from_elevations(test_id(), vec![0.0; 10]).is_err());
        assert!(ElevationTile::from_rgb(test_id(), &[0u8; 30]).is_err());
    }
}
