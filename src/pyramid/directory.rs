//! Directory records: one per image directory found in a file.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TiffError;

// =============================================================================
// Tile storage
// =============================================================================

/// How a directory's stored tiles are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    /// Each tile is a complete JPEG stream
    Jpeg,

    /// Uncompressed, interleaved 8-bit samples
    Raw { samples: u16 },
}

/// Read access to a directory's stored tiles.
///
/// Implementations return the bytes of one tile ready for decoding (for JPEG
/// tiles, with any shared tables already merged). An empty buffer means the
/// tile was never written.
#[async_trait]
pub trait TileStore: Send + Sync + fmt::Debug {
    async fn read_tile(&self, x: u32, y: u32) -> Result<Bytes, TiffError>;
}

// =============================================================================
// Pixel info
// =============================================================================

/// Physical pixel spacing and scan magnification, when the file declares them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelInfo {
    /// Millimetres per pixel along x
    pub mm_x: Option<f64>,

    /// Millimetres per pixel along y
    pub mm_y: Option<f64>,

    /// Objective magnification
    pub magnification: Option<f64>,
}

// =============================================================================
// Directory
// =============================================================================

/// Geometry, metadata and tile access for one image directory.
///
/// `tile_width == 0` marks a directory that is not tiled; the pyramid
/// builder discards those.
#[derive(Clone)]
pub struct Directory {
    /// Position of the directory in the file
    pub index: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub encoding: TileEncoding,
    pub pixel_info: PixelInfo,

    /// Named auxiliary images (label, macro) carried by this directory
    pub embedded_images: BTreeMap<String, Bytes>,

    store: Option<Arc<dyn TileStore>>,
}

impl Directory {
    /// Create a record with no tile storage and no metadata.
    pub fn new(
        index: usize,
        image_width: u32,
        image_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Self {
        Self {
            index,
            image_width,
            image_height,
            tile_width,
            tile_height,
            encoding: TileEncoding::Jpeg,
            pixel_info: PixelInfo::default(),
            embedded_images: BTreeMap::new(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TileStore>, encoding: TileEncoding) -> Self {
        self.store = Some(store);
        self.encoding = encoding;
        self
    }

    pub fn with_pixel_info(mut self, pixel_info: PixelInfo) -> Self {
        self.pixel_info = pixel_info;
        self
    }

    pub fn with_embedded_image(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.embedded_images.insert(name.into(), data.into());
        self
    }

    /// Tile storage, if this directory has any.
    pub fn store(&self) -> Option<&Arc<dyn TileStore>> {
        self.store.as_ref()
    }

    /// Whether the directory is stored as tiles.
    pub fn is_tiled(&self) -> bool {
        self.tile_width > 0 && self.tile_height > 0
    }

    /// Number of tile columns and rows.
    pub fn tile_count(&self) -> (u32, u32) {
        if !self.is_tiled() {
            return (0, 0);
        }
        (
            self.image_width.div_ceil(self.tile_width),
            self.image_height.div_ceil(self.tile_height),
        )
    }

    /// Whether `(x, y)` addresses a tile inside the grid.
    pub fn contains_tile(&self, x: u32, y: u32) -> bool {
        let (columns, rows) = self.tile_count();
        x < columns && y < rows
    }

    /// Pyramid level this directory occupies, counted from the coarsest
    /// level where the whole image fits in one tile.
    ///
    /// Returns `None` for untiled directories.
    pub fn level(&self) -> Option<u32> {
        if !self.is_tiled() {
            return None;
        }
        Some(level_for(
            self.image_width,
            self.image_height,
            self.tile_width,
            self.tile_height,
        ))
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("index", &self.index)
            .field("image_width", &self.image_width)
            .field("image_height", &self.image_height)
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .field("encoding", &self.encoding)
            .field("pixel_info", &self.pixel_info)
            .field(
                "embedded_images",
                &self.embedded_images.keys().collect::<Vec<_>>(),
            )
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// `max(0, ceil(log2(max(w / tw, h / th))))`, computed in floating point.
pub fn level_for(image_width: u32, image_height: u32, tile_width: u32, tile_height: u32) -> u32 {
    let ratio = f64::max(
        image_width as f64 / tile_width as f64,
        image_height as f64 / tile_height as f64,
    );
    let level = ratio.log2().ceil();
    if level.is_finite() && level > 0.0 {
        level as u32
    } else {
        0
    }
}
