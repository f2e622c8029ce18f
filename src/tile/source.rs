//! Tile source: answers tile requests for one opened file.
//!
//! A request for a stored level is decoded from the file. A request for an
//! empty level is composed from the nearest finer stored level (see
//! [`synthesis`](super::synthesis)). Every result, including the sub-tiles
//! used for composition, is memoized in a shared [`TileCache`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CodecError, OpenError, TileSourceError};
use crate::format::tiff::TiffDirectoryReader;
use crate::io::{LocalFileReader, RangeReader};
use crate::pyramid::{Directory, Pyramid};

use super::cache::{SourceId, TileCache, TileKey};
use super::codec::{ImageCodec, TileCodec};
use super::encoder::{apply_edge, fit_to_tile};
use super::request::{Synthesis, TileOptions};
use super::result::TileResult;
use super::synthesis::synthesize;

/// Pixel size, in millimetres, that corresponds to 1x magnification when a
/// file gives pixel spacing but no magnification.
///
/// Derived from Aperio conventions; other vendors may differ.
pub const MAGNIFICATION_REFERENCE_MM: f64 = 0.01;

/// Native scan resolution of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Magnification {
    pub magnification: Option<f64>,
    pub mm_x: Option<f64>,
    pub mm_y: Option<f64>,
}

/// A pyramid of tiles read from one file.
///
/// Dropping the source removes its entries from the shared cache.
pub struct TileSource {
    id: SourceId,
    identifier: String,
    pyramid: Pyramid,
    codec: Arc<dyn TileCodec>,
    cache: Arc<TileCache>,
}

impl TileSource {
    /// Assemble a source from an already built pyramid.
    pub fn new(
        identifier: impl Into<String>,
        pyramid: Pyramid,
        codec: Arc<dyn TileCodec>,
        cache: Arc<TileCache>,
    ) -> Self {
        Self {
            id: SourceId::allocate(),
            identifier: identifier.into(),
            pyramid,
            codec,
            cache,
        }
    }

    /// Open a file from the local filesystem.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    /// - `Tiff` if the header is not TIFF or BigTIFF
    /// - `NoUsableDirectories` if no tiled directory is usable
    pub async fn open(path: impl AsRef<Path>, cache: Arc<TileCache>) -> Result<Self, OpenError> {
        let reader = LocalFileReader::open(path).await?;
        Self::open_with_reader(reader, cache).await
    }

    /// Open a source over any range reader.
    pub async fn open_with_reader<R: RangeReader + 'static>(
        reader: R,
        cache: Arc<TileCache>,
    ) -> Result<Self, OpenError> {
        let identifier = reader.identifier().to_string();
        let directories = TiffDirectoryReader::open(Arc::new(reader)).await?;
        let records = directories.read_directories().await;

        let pyramid = Pyramid::build(records).map_err(|err| {
            debug!(file = %identifier, error = %err, "Rejected file");
            err
        })?;

        let (width, height) = pyramid.dimensions();
        let (tile_width, tile_height) = pyramid.tile_size();
        info!(
            file = %identifier,
            width,
            height,
            tile_width,
            tile_height,
            levels = pyramid.levels(),
            "Opened tile source"
        );

        Ok(Self::new(identifier, pyramid, Arc::new(ImageCodec), cache))
    }

    /// Replace the codec used to decode tiles and embedded images.
    pub fn with_codec(mut self, codec: Arc<dyn TileCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn levels(&self) -> u32 {
        self.pyramid.levels()
    }

    pub fn tile_size(&self) -> (u32, u32) {
        self.pyramid.tile_size()
    }

    /// Full-resolution image size.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pyramid.dimensions()
    }

    // =========================================================================
    // Tile requests
    // =========================================================================

    /// Get tile `(x, y)` at zoom level `z`, synthesizing empty levels.
    pub async fn get_tile(
        &self,
        x: u32,
        y: u32,
        z: u32,
        options: &TileOptions,
    ) -> Result<TileResult, TileSourceError> {
        self.get_tile_with(x, y, z, options, Synthesis::Allowed).await
    }

    /// Get tile `(x, y)` at zoom level `z`.
    ///
    /// The result always covers exactly one tile; pixels beyond the image
    /// extent are transparent unless `options.edge` gives a fill color.
    ///
    /// # Errors
    /// - `InvalidLevel` if `z` is not a pyramid level
    /// - `InvalidQuality` if the JPEG quality is out of range
    /// - `MissingTile` if `(x, y)` is outside a stored level's grid
    /// - `MissingLevel` if the level is empty and `synthesis` is `Disabled`
    /// - `TileRead` if a stored tile cannot be decoded
    pub async fn get_tile_with(
        &self,
        x: u32,
        y: u32,
        z: u32,
        options: &TileOptions,
        synthesis: Synthesis,
    ) -> Result<TileResult, TileSourceError> {
        self.fetch(x, y, z, *options, synthesis).await
    }

    /// Boxed so that synthesis can recurse back into the resolver.
    pub(crate) fn fetch(
        &self,
        x: u32,
        y: u32,
        z: u32,
        options: TileOptions,
        synthesis: Synthesis,
    ) -> BoxFuture<'_, Result<TileResult, TileSourceError>> {
        async move {
            let levels = self.pyramid.levels();
            if z >= levels {
                return Err(TileSourceError::InvalidLevel { level: z, levels });
            }
            options.format.validate()?;

            match self.pyramid.directory(z) {
                Some(directory) if !directory.contains_tile(x, y) => {
                    let (columns, rows) = directory.tile_count();
                    return Err(TileSourceError::MissingTile {
                        level: z,
                        x,
                        y,
                        max_x: columns.saturating_sub(1),
                        max_y: rows.saturating_sub(1),
                    });
                }
                None if synthesis == Synthesis::Disabled => {
                    return Err(TileSourceError::MissingLevel { level: z });
                }
                _ => {}
            }

            let key = TileKey::new(self.id, z, x, y, options);
            self.cache
                .get_or_compute(key, || self.render(x, y, z, options))
                .await
        }
        .boxed()
    }

    async fn render(
        &self,
        x: u32,
        y: u32,
        z: u32,
        options: TileOptions,
    ) -> Result<TileResult, TileSourceError> {
        let raster = match self.pyramid.directory(z) {
            Some(directory) => self.decode_stored(directory, x, y, z).await?,
            None => synthesize(self, x, y, z).await?,
        };
        self.finish(raster, x, y, z, options)
    }

    async fn decode_stored(
        &self,
        directory: &Directory,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<RgbaImage, TileSourceError> {
        let read_error = |source: CodecError| TileSourceError::TileRead {
            level: z,
            x,
            y,
            source,
        };

        let decoded = self
            .codec
            .decode_tile(directory, x, y)
            .await
            .map_err(read_error)?;
        let raster = decoded.to_raster().map_err(read_error)?;

        let (tile_width, tile_height) = self.pyramid.tile_size();
        let raster = Arc::try_unwrap(raster).unwrap_or_else(|shared| (*shared).clone());
        Ok(fit_to_tile(raster, tile_width, tile_height))
    }

    /// Apply edge fill and convert to the requested format.
    fn finish(
        &self,
        mut raster: RgbaImage,
        x: u32,
        y: u32,
        z: u32,
        options: TileOptions,
    ) -> Result<TileResult, TileSourceError> {
        if let Some(color) = options.edge {
            let (tile_width, tile_height) = self.pyramid.tile_size();
            let (level_width, level_height) = self.pyramid.level_dimensions(z);
            let valid_width = level_width.saturating_sub(x.saturating_mul(tile_width));
            let valid_height = level_height.saturating_sub(y.saturating_mul(tile_height));
            apply_edge(&mut raster, valid_width, valid_height, color);
        }

        TileResult::raster(raster)
            .encode(options.format)
            .map_err(TileSourceError::Encode)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// The nearest stored level at or above `level`, after clamping.
    pub fn preferred_level(&self, level: u32) -> u32 {
        self.pyramid.preferred_level(level)
    }

    /// Scan resolution of the finest level.
    ///
    /// Without an explicit magnification, one is derived from the pixel
    /// spacing as `MAGNIFICATION_REFERENCE_MM / mm_x`.
    pub fn native_magnification(&self) -> Magnification {
        let info = self.pyramid.reference().pixel_info;
        let magnification = info.magnification.or_else(|| {
            info.mm_x
                .filter(|mm| *mm > 0.0)
                .map(|mm| MAGNIFICATION_REFERENCE_MM / mm)
        });

        Magnification {
            magnification,
            mm_x: info.mm_x,
            mm_y: info.mm_y,
        }
    }

    /// Names of auxiliary images carried by stored levels, sorted.
    pub fn associated_image_names(&self) -> Vec<String> {
        self.pyramid
            .populated_levels()
            .flat_map(|(_, directory)| directory.embedded_images.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Decode the auxiliary image `name`, taken from the coarsest stored
    /// level that carries it.
    ///
    /// Returns `Ok(None)` if no stored level carries `name`.
    pub fn associated_image(&self, name: &str) -> Result<Option<RgbaImage>, CodecError> {
        let data = self
            .pyramid
            .populated_levels()
            .find_map(|(_, directory)| directory.embedded_images.get(name));

        match data {
            Some(data) => self.codec.decode_embedded(data).map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for TileSource {
    fn drop(&mut self) {
        let removed = self.cache.invalidate_source(self.id);
        debug!(file = %self.identifier, removed, "Closed tile source");
    }
}

impl std::fmt::Debug for TileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSource")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("pyramid", &self.pyramid)
            .finish()
    }
}
