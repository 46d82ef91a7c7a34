//! Named raster layers.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::coords::TileId;
use crate::error::{Result, TerrainError};
use crate::render::{encode_png, SlopeAspectRenderer, SlopeRenderer, TileRenderer};
use crate::service::TerrainService;
use crate::source::CancelToken;
use crate::tile::TILE_SIZE;

/// Registry of tile renderers, keyed by layer name.
///
/// Registration is idempotent: the first renderer registered under a name
/// stays in place.
#[derive(Default)]
pub struct LayerRegistry {
    layers: RwLock<BTreeMap<String, Arc<dyn TileRenderer>>>,
}

impl LayerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `slope` and `slope-aspect` layers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(SlopeRenderer);
        registry.register(SlopeAspectRenderer);
        registry
    }

    /// Register `renderer` under its own name.
    ///
    /// Returns `false` and leaves the registry unchanged if the name is taken.
    pub fn register(&self, renderer: impl TileRenderer + 'static) -> bool {
        let name = renderer.name().to_string();
        let mut layers = match self.layers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if layers.contains_key(&name) {
            tracing::debug!(layer = %name, "layer already registered");
            return false;
        }
        layers.insert(name, Arc::new(renderer));
        true
    }

    /// Look up a renderer.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TileRenderer>> {
        let layers = match self.layers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        layers.get(name).cloned()
    }

    /// Registered layer names, sorted.
    pub fn names(&self) -> Vec<String> {
        let layers = match self.layers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        layers.keys().cloned().collect()
    }

    /// Render layer `name` for tile `id` and encode it as PNG.
    ///
    /// Tiles deeper than the dataset are cut from the matching part of
    /// their ancestor at the maximum zoom and scaled up to full size.
    pub fn render_tile(
        &self,
        service: &TerrainService,
        name: &str,
        id: TileId,
    ) -> Result<Vec<u8>> {
        self.render_tile_with_cancel(service, name, id, &CancelToken::new())
    }

    /// [`render_tile`](Self::render_tile) with a cancellation token.
    pub fn render_tile_with_cancel(
        &self,
        service: &TerrainService,
        name: &str,
        id: TileId,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let renderer = self
            .get(name)
            .ok_or_else(|| TerrainError::UnknownLayer(name.to_string()))?;
        if !id.is_valid() {
            return Err(TerrainError::InvalidTileId(id.to_string()));
        }

        let ancestor = id.clamped();
        let tile = service.load_tile_with_cancel(ancestor, cancel)?;
        cancel.check()?;
        let mut image = renderer.render(&tile);
        if id.z > ancestor.z {
            image = overzoom(&image, id, ancestor);
        }
        encode_png(&image)
    }
}

/// The part of `image` (rendered for `ancestor`) covered by `id`, scaled to
/// a full tile with nearest-neighbor sampling.
fn overzoom(image: &RgbaImage, id: TileId, ancestor: TileId) -> RgbaImage {
    let shift = u32::from(id.z - ancestor.z);
    let offset = |child: u32, parent: u32| {
        let local = u64::from(child) - (u64::from(parent) << shift);
        ((local * TILE_SIZE as u64) >> shift) as u32
    };
    let span = (TILE_SIZE as u32 >> shift.min(8)).max(1);

    let part = imageops::crop_imm(
        image,
        offset(id.x, ancestor.x),
        offset(id.y, ancestor.y),
        span,
        span,
    )
    .to_image();
    imageops::resize(&part, TILE_SIZE as u32, TILE_SIZE as u32, FilterType::Nearest)
}
