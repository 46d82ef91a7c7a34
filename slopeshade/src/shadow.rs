//! Terrain shadow ray-casting.
//!
//! A point is shadowed when terrain along the ray toward the sun rises above
//! the sun's line of sight. The ray is marched in fixed angular steps on a
//! flat-earth approximation: one degree of latitude is taken as
//! [`METERS_PER_DEGREE`] meters and longitude steps are widened by
//! `1 / cos(lat)` at the origin latitude.

use chrono::{DateTime, Utc};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::coords::{clamp_zoom, BoundingBox};
use crate::error::{Result, TerrainError};
use crate::render::encode_png;
use crate::service::{ElevationField, TerrainService, MAX_PRELOAD_TILES, PRELOAD_TILE_BUFFER};
use crate::source::CancelToken;
use crate::sun::{SunPosition, SunProvider};

/// Angular length of one ray step (~50 m).
pub const STEP_DEGREES: f64 = 0.0005;

/// Steps are taken for `1..MAX_STEPS` (~5 km of look-ahead).
pub const MAX_STEPS: u32 = 100;

/// Ground distance of one degree.
///
/// Used for the full ray length whatever its direction. Longitude steps are
/// already widened by `1 / cos(lat)`, so the ray distance is measured in
/// degrees of latitude and this constant applies unchanged.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Margin added around the rendered area when preloading tiles.
pub const PRELOAD_MARGIN_DEGREES: f64 = 0.05;

/// Default width and height of a shadow raster.
pub const DEFAULT_RESOLUTION: u32 = 64;

/// Color of a shadowed pixel.
pub const SHADOW_RGBA: [u8; 4] = [0, 0, 40, 160];

/// Ray-caster over any [`ElevationField`].
pub struct ShadowCaster<'a, F: ElevationField + ?Sized> {
    field: &'a F,
}

impl<'a, F: ElevationField + ?Sized> ShadowCaster<'a, F> {
    /// Cast rays against `field`.
    pub fn new(field: &'a F) -> Self {
        Self { field }
    }

    /// Whether `(lat, lon)` is shadowed by terrain for the given sun.
    ///
    /// A sun at or below the horizon shadows everything without any
    /// elevation lookup. A point without elevation data is reported as lit.
    /// Ray samples without data are skipped.
    pub fn is_in_shadow(&self, lat: f64, lon: f64, sun: &SunPosition, zoom: u8) -> bool {
        if sun.altitude <= 0.0 {
            return true;
        }

        let Some(origin) = self.field.elevation_at(lat, lon, zoom) else {
            return false;
        };

        let (sin_az, cos_az) = sun.azimuth.sin_cos();
        let lon_scale = 1.0 / lat.to_radians().cos();
        let tan_alt = sun.altitude.tan();

        for step in 1..MAX_STEPS {
            let distance = step as f64 * STEP_DEGREES;
            let ray_lat = lat + distance * cos_az;
            let ray_lon = lon + distance * sin_az * lon_scale;

            let Some(terrain) = self.field.elevation_at(ray_lat, ray_lon, zoom) else {
                continue;
            };

            let required = origin + distance * METERS_PER_DEGREE * tan_alt;
            if terrain > required {
                return true;
            }
        }
        false
    }

    /// Render a `resolution × resolution` shadow raster over `bounds`.
    ///
    /// Pixel `(x, y)` samples `lat = north - y * (north - south) / resolution`
    /// and `lon = west + x * (east - west) / resolution`. Rows are computed in
    /// parallel and each row checks `cancel` before starting.
    pub fn render(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        sun: &SunPosition,
        resolution: u32,
        cancel: &CancelToken,
    ) -> Result<ShadowLayer> {
        let res = resolution.max(1);
        let lat_step = (bounds.north - bounds.south) / res as f64;
        let lon_step = (bounds.east - bounds.west) / res as f64;
        let row_bytes = res as usize * 4;

        let mut pixels = RgbaImage::new(res, res);
        let buf: &mut [u8] = &mut pixels;
        buf.par_chunks_mut(row_bytes)
            .enumerate()
            .try_for_each(|(y, row)| {
                cancel.check()?;
                let lat = bounds.north - y as f64 * lat_step;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let lon = bounds.west + x as f64 * lon_step;
                    if self.is_in_shadow(lat, lon, sun, zoom) {
                        px.copy_from_slice(&SHADOW_RGBA);
                    }
                }
                Ok::<(), TerrainError>(())
            })?;

        Ok(ShadowLayer {
            width: res,
            height: res,
            bounds: *bounds,
            sun: *sun,
            pixels,
        })
    }
}

/// A rendered shadow overlay.
#[derive(Debug, Clone)]
pub struct ShadowLayer {
    pub width: u32,
    pub height: u32,
    /// Area covered by the raster.
    pub bounds: BoundingBox,
    /// Sun position the raster was computed for.
    pub sun: SunPosition,
    /// RGBA pixels, [`SHADOW_RGBA`] or fully transparent.
    pub pixels: RgbaImage,
}

impl ShadowLayer {
    /// Whether pixel `(x, y)` is shadowed.
    pub fn is_shadowed(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y) == &Rgba(SHADOW_RGBA)
    }

    /// Share of shadowed pixels, `0.0..=1.0`.
    pub fn shadowed_fraction(&self) -> f64 {
        let total = self.width as usize * self.height as usize;
        if total == 0 {
            return 0.0;
        }
        let dark = self.pixels.pixels().filter(|p| p.0[3] != 0).count();
        dark as f64 / total as f64
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.pixels)
    }
}

/// Produces shadow overlays for a map view.
pub struct ShadowLayerGenerator<'a> {
    service: &'a TerrainService,
    sun: &'a dyn SunProvider,
}

impl<'a> ShadowLayerGenerator<'a> {
    pub fn new(service: &'a TerrainService, sun: &'a dyn SunProvider) -> Self {
        Self { service, sun }
    }

    /// Generate the shadow overlay for `bounds` at time `at`.
    ///
    /// One sun position is computed for the center of the box. When the sun
    /// is below the horizon the result is fully shadowed and no tiles are
    /// loaded. Otherwise the box plus [`PRELOAD_MARGIN_DEGREES`] is preloaded
    /// first and rays are cast against the preloaded tiles only, so cache
    /// evictions during the pass do not change the result.
    ///
    /// # Errors
    ///
    /// - [`TerrainError::InvalidBounds`] for an inverted box
    /// - [`TerrainError::AreaTooLarge`] when the preload would exceed
    ///   [`MAX_PRELOAD_TILES`]
    /// - [`TerrainError::SunUnavailable`] from the sun provider
    /// - [`TerrainError::LayerUnavailable`] when every backing tile failed
    /// - [`TerrainError::Cancelled`] when `cancel` fires
    pub fn generate(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        at: DateTime<Utc>,
        resolution: u32,
        cancel: &CancelToken,
    ) -> Result<ShadowLayer> {
        bounds.validate()?;
        let zoom = clamp_zoom(zoom);

        let area = bounds.expand(PRELOAD_MARGIN_DEGREES);
        let tiles = area.tile_count(zoom, PRELOAD_TILE_BUFFER);
        if tiles > MAX_PRELOAD_TILES {
            return Err(TerrainError::AreaTooLarge {
                tiles,
                max: MAX_PRELOAD_TILES,
            });
        }

        let (lat, lon) = bounds.center();
        let sun = self.sun.position(at, lat, lon)?;

        if !sun.is_above_horizon() {
            tracing::debug!(
                altitude = sun.altitude_degrees(),
                "sun below horizon, skipping preload"
            );
            return ShadowCaster::new(self.service).render(bounds, zoom, &sun, resolution, cancel);
        }

        let (stats, pinned) = self.service.pin_area_with_cancel(&area, zoom, cancel);
        cancel.check()?;
        if stats.all_failed() {
            return Err(TerrainError::LayerUnavailable {
                tiles: stats.tiles_matched,
            });
        }

        ShadowCaster::new(&pinned).render(bounds, zoom, &sun, resolution, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::TileId;
    use crate::service::testing::MemorySource;
    use crate::sun::FixedSun;
    use crate::tile::terrarium_png;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct FnField<G: Fn(f64, f64) -> Option<f64> + Send + Sync> {
        f: G,
        lookups: AtomicU64,
    }

    impl<G: Fn(f64, f64) -> Option<f64> + Send + Sync> FnField<G> {
        fn new(f: G) -> Self {
            Self {
                f,
                lookups: AtomicU64::new(0),
            }
        }

        fn lookups(&self) -> u64 {
            self.lookups.load(Ordering::Relaxed)
        }
    }

    impl<G: Fn(f64, f64) -> Option<f64> + Send + Sync> ElevationField for FnField<G> {
        fn elevation_at(&self, lat: f64, lon: f64, _zoom: u8) -> Option<f64> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            (self.f)(lat, lon)
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 11, 23, 0).unwrap()
    }

    #[test]
    fn test_below_horizon_no_lookups() {
        let field = FnField::new(|_, _| Some(1000.0));
        let caster = ShadowCaster::new(&field);

        for alt in [0.0, -0.1, -45.0] {
            let sun = SunPosition::from_degrees(180.0, alt);
            assert!(caster.is_in_shadow(47.4, 11.7, &sun, 12));
        }
        assert_eq!(field.lookups(), 0);
    }

    #[test]
    fn test_missing_origin_is_lit() {
        let field = FnField::new(|_, _| None);
        let caster = ShadowCaster::new(&field);
        let sun = SunPosition::from_degrees(180.0, 30.0);
        assert!(!caster.is_in_shadow(47.4, 11.7, &sun, 12));
        assert_eq!(field.lookups(), 1);
    }

    #[test]
    fn test_ridge_toward_sun_casts_shadow() {
        // 2000 m ridge ~1.1 km north of the origin on a 1000 m plain
        let field = FnField::new(|lat, _| {
            Some(if (47.409..47.411).contains(&lat) { 2000.0 } else { 1000.0 })
        });
        let caster = ShadowCaster::new(&field);

        let from_north = SunPosition::from_degrees(0.0, 10.0);
        assert!(caster.is_in_shadow(47.4, 11.7, &from_north, 12));

        // Ray toward a southern sun never crosses the ridge
        let from_south = SunPosition::from_degrees(180.0, 10.0);
        assert!(!caster.is_in_shadow(47.4, 11.7, &from_south, 12));

        // A sun high enough clears the ridge: required at 1.1 km is 1000 + 1110·tan(60°)
        let high = SunPosition::from_degrees(0.0, 60.0);
        assert!(!caster.is_in_shadow(47.4, 11.7, &high, 12));
    }

    #[test]
    fn test_flat_terrain_is_lit() {
        let field = FnField::new(|_, _| Some(1500.0));
        let caster = ShadowCaster::new(&field);
        let sun = SunPosition::from_degrees(135.0, 5.0);
        assert!(!caster.is_in_shadow(47.4, 11.7, &sun, 12));
        // Origin plus steps 1..99
        assert_eq!(field.lookups(), MAX_STEPS as u64);
    }

    #[test]
    fn test_missing_ray_samples_skipped() {
        // Everything north of the origin lacks data except a wall far away
        let field = FnField::new(|lat, _| {
            if lat <= 47.4 {
                Some(1000.0)
            } else if lat > 47.44 {
                Some(3000.0)
            } else {
                None
            }
        });
        let caster = ShadowCaster::new(&field);
        let sun = SunPosition::from_degrees(0.0, 10.0);
        assert!(caster.is_in_shadow(47.4, 11.7, &sun, 12));
    }

    #[test]
    fn test_render_pixel_mapping() {
        // Plateau at 5000 m north of 47.305, sea level south of it
        let field = FnField::new(|lat, _| Some(if lat > 47.305 { 5000.0 } else { 0.0 }));
        let caster = ShadowCaster::new(&field);
        let bounds = BoundingBox::new(47.35, 47.25, 11.8, 11.7);
        let sun = SunPosition::from_degrees(0.0, 5.0);

        let layer = caster
            .render(&bounds, 12, &sun, 10, &CancelToken::new())
            .unwrap();
        assert_eq!((layer.width, layer.height), (10, 10));
        for x in 0..10 {
            for y in 0..5 {
                assert!(!layer.is_shadowed(x, y), "({x},{y}) on plateau should be lit");
            }
            for y in 5..10 {
                assert!(layer.is_shadowed(x, y), "({x},{y}) below plateau should be dark");
            }
        }
        assert!((layer.shadowed_fraction() - 0.5).abs() < 1e-12);
        assert_eq!(layer.pixels.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_render_cancelled() {
        let field = FnField::new(|_, _| Some(0.0));
        let caster = ShadowCaster::new(&field);
        let token = CancelToken::new();
        token.cancel();
        let bounds = BoundingBox::new(47.35, 47.25, 11.8, 11.7);
        let result = caster.render(&bounds, 12, &SunPosition::from_degrees(0.0, 10.0), 8, &token);
        assert!(matches!(result, Err(TerrainError::Cancelled)));
    }

    #[test]
    fn test_generate_night_all_shadow_without_fetch() {
        let source = Arc::new(MemorySource::new());
        let service = TerrainService::new(source.clone());
        let sun = FixedSun(SunPosition::from_degrees(200.0, -0.1));
        let generator = ShadowLayerGenerator::new(&service, &sun);

        let bounds = BoundingBox::new(47.45, 47.40, 11.75, 11.65);
        let layer = generator
            .generate(&bounds, 13, noon(), DEFAULT_RESOLUTION, &CancelToken::new())
            .unwrap();

        assert_eq!(layer.width, 64);
        assert!(layer.pixels.pixels().all(|p| p.0 == SHADOW_RGBA));
        assert_eq!(source.total_fetches(), 0);
    }

    #[test]
    fn test_generate_all_tiles_failed() {
        let service = TerrainService::new(MemorySource::new());
        let sun = FixedSun(SunPosition::from_degrees(180.0, 40.0));
        let generator = ShadowLayerGenerator::new(&service, &sun);

        let bounds = BoundingBox::new(47.45, 47.40, 11.75, 11.65);
        let result = generator.generate(&bounds, 11, noon(), 16, &CancelToken::new());
        assert!(matches!(result, Err(TerrainError::LayerUnavailable { .. })));
    }

    #[test]
    fn test_generate_preloads_and_renders() {
        // Every tile around the area is flat, so nothing is shadowed
        let bounds = BoundingBox::new(47.46, 47.44, 11.71, 11.69);
        let mut source = MemorySource::new();
        for id in bounds.expand(PRELOAD_MARGIN_DEGREES).tile_range(11, 1) {
            source = source.with_tile(id, terrarium_png(|_, _| 800.0));
        }
        let source = Arc::new(source);
        let service = TerrainService::new(source.clone());
        let sun = FixedSun(SunPosition::from_degrees(180.0, 30.0));
        let generator = ShadowLayerGenerator::new(&service, &sun);

        let layer = generator
            .generate(&bounds, 11, noon(), 8, &CancelToken::new())
            .unwrap();
        assert_eq!(layer.shadowed_fraction(), 0.0);
        assert!(service.is_cached(TileId::new(11, 1090, 716)));
        assert!(source.total_fetches() > 0);
        assert!(!layer.to_png().unwrap().is_empty());
    }

    #[test]
    fn test_generate_unaffected_by_cache_capacity() {
        // Tiles north of 47.5172 (rows <= 715) are a 3000 m wall
        let bounds = BoundingBox::new(47.515, 47.435, 11.70, 11.68);
        let mut source = MemorySource::new();
        for id in bounds.expand(PRELOAD_MARGIN_DEGREES).tile_range(11, 1) {
            let height = if id.y <= 715 { 3000.0 } else { 1000.0 };
            source = source.with_tile(id, terrarium_png(move |_, _| height));
        }
        let source = Arc::new(source);
        let service = TerrainService::builder(source.clone()).cache_size(2).build();
        let sun = FixedSun(SunPosition::from_degrees(0.0, 5.0));
        let generator = ShadowLayerGenerator::new(&service, &sun);

        let layer = generator
            .generate(&bounds, 11, noon(), 8, &CancelToken::new())
            .unwrap();

        // Rows within 0.0495° of the wall are shadowed, the rest are lit
        for y in 0..8 {
            assert_eq!(layer.is_shadowed(0, y), y < 5, "row {y}");
        }
        assert_eq!(layer.shadowed_fraction(), 5.0 / 8.0);
        // Rendering never went back to the source
        let expected = bounds.expand(PRELOAD_MARGIN_DEGREES).tile_count(11, 1);
        assert_eq!(source.total_fetches(), expected);
    }

    #[test]
    fn test_generate_rejects_oversized_area() {
        let source = Arc::new(MemorySource::new());
        let service = TerrainService::new(source.clone());
        let sun = FixedSun(SunPosition::from_degrees(180.0, 40.0));
        let generator = ShadowLayerGenerator::new(&service, &sun);

        let bounds = BoundingBox::new(60.0, 30.0, 30.0, 0.0);
        let result = generator.generate(&bounds, 15, noon(), 16, &CancelToken::new());
        match result {
            Err(TerrainError::AreaTooLarge { tiles, max }) => {
                assert!(tiles > 10_000_000);
                assert_eq!(max, MAX_PRELOAD_TILES);
            }
            other => panic!("expected AreaTooLarge, got {:?}", other.map(|l| l.width)),
        }
        assert_eq!(source.total_fetches(), 0);
    }

    #[test]
    fn test_generate_rejects_inverted_bounds() {
        let service = TerrainService::new(MemorySource::new());
        let sun = FixedSun(SunPosition::from_degrees(180.0, 40.0));
        let generator = ShadowLayerGenerator::new(&service, &sun);
        let bounds = BoundingBox::new(47.40, 47.45, 11.75, 11.65);
        let result = generator.generate(&bounds, 11, noon(), 16, &CancelToken::new());
        assert!(matches!(result, Err(TerrainError::InvalidBounds { .. })));
    }
}
