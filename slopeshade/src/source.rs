//! Where elevation tiles come from.
//!
//! A [`TileSource`] returns the encoded PNG bytes of one Terrarium tile.
//! Decoding and caching happen in [`TerrainService`](crate::TerrainService).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::coords::TileId;
use crate::error::{Result, TerrainError};

/// A provider of encoded Terrarium tiles.
pub trait TileSource: Send + Sync {
    /// Fetch the PNG bytes for `id`.
    fn fetch(&self, id: TileId) -> Result<Vec<u8>>;

    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;
}

impl<T: TileSource + ?Sized> TileSource for Arc<T> {
    fn fetch(&self, id: TileId) -> Result<Vec<u8>> {
        (**self).fetch(id)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: TileSource + ?Sized> TileSource for Box<T> {
    fn fetch(&self, id: TileId) -> Result<Vec<u8>> {
        (**self).fetch(id)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Shared abort flag for in-flight loads and renders.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TerrainError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Path of a tile inside a `{root}/{z}/{x}/{y}.png` mirror.
pub fn tile_path(root: &Path, id: TileId) -> PathBuf {
    root.join(id.z.to_string())
        .join(id.x.to_string())
        .join(format!("{}.png", id.y))
}

/// Reads tiles from a local `{root}/{z}/{x}/{y}.png` directory tree.
#[derive(Debug, Clone)]
pub struct DirTileSource {
    root: PathBuf,
    cancel: CancelToken,
}

impl DirTileSource {
    /// Create a source rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cancel: CancelToken::new(),
        }
    }

    /// Attach a cancellation token checked before every read.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Mirror root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TileSource for DirTileSource {
    fn fetch(&self, id: TileId) -> Result<Vec<u8>> {
        self.cancel.check()?;
        let path = tile_path(&self.root, id);
        if !path.exists() {
            return Err(TerrainError::TileNotFound { path });
        }
        Ok(std::fs::read(&path)?)
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}
