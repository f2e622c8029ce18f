//! Decoding of stored tiles and embedded images.
//!
//! [`TileCodec`] is the seam between the tile source and pixel decoding.
//! [`ImageCodec`] is the default, built on the `image` crate; tests swap in
//! counting or failing codecs.

use async_trait::async_trait;
use base64::Engine;
use image::RgbaImage;

use crate::error::CodecError;
use crate::pyramid::{Directory, TileEncoding};

use super::encoder::{decode_image, decode_raw};
use super::result::TileResult;

/// Decodes tiles of a directory and named auxiliary images.
#[async_trait]
pub trait TileCodec: Send + Sync {
    /// Decode the stored tile at `(x, y)` of `directory`.
    ///
    /// The result may be smaller or larger than the directory's tile size;
    /// callers normalize it.
    async fn decode_tile(
        &self,
        directory: &Directory,
        x: u32,
        y: u32,
    ) -> Result<TileResult, CodecError>;

    /// Decode an embedded image's stored bytes.
    fn decode_embedded(&self, data: &[u8]) -> Result<RgbaImage, CodecError>;
}

/// Default codec: JPEG/raw tiles and base64 or binary embedded images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

#[async_trait]
impl TileCodec for ImageCodec {
    async fn decode_tile(
        &self,
        directory: &Directory,
        x: u32,
        y: u32,
    ) -> Result<TileResult, CodecError> {
        let store = directory.store().ok_or(CodecError::NoTileData {
            index: directory.index,
        })?;

        let data = store.read_tile(x, y).await?;
        if data.is_empty() {
            return Err(CodecError::EmptyTile { x, y });
        }

        let image = match directory.encoding {
            TileEncoding::Jpeg => decode_image(&data)?,
            TileEncoding::Raw { samples } => decode_raw(
                &data,
                directory.tile_width,
                directory.tile_height,
                samples,
            )?,
        };

        Ok(TileResult::raster(image))
    }

    fn decode_embedded(&self, data: &[u8]) -> Result<RgbaImage, CodecError> {
        // Descriptions wrap long base64 payloads
        let text: Vec<u8> = data
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();

        match base64::engine::general_purpose::STANDARD.decode(&text) {
            Ok(decoded) => decode_image(&decoded),
            Err(_) => decode_image(data),
        }
    }
}
