//! Tile results: decoded rasters or encoded images.

use std::sync::Arc;

use bytes::Bytes;
use image::{ImageFormat, RgbaImage};

use crate::error::CodecError;

use super::encoder::{decode_image_with_format, encode_jpeg, encode_png};
use super::request::TileFormat;

/// Encoding of an [`TileResult::Encoded`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedFormat {
    Jpeg,
    Png,
}

impl EncodedFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

/// A produced tile.
///
/// Cheap to clone: rasters are shared behind an `Arc`, encoded data is
/// reference-counted `Bytes`.
#[derive(Debug, Clone, PartialEq)]
pub enum TileResult {
    Raster(Arc<RgbaImage>),
    Encoded { data: Bytes, format: EncodedFormat },
}

impl TileResult {
    pub fn raster(image: RgbaImage) -> Self {
        Self::Raster(Arc::new(image))
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Raster(_))
    }

    /// Approximate memory held by this result, used for cache accounting.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Raster(image) => image.as_raw().len(),
            Self::Encoded { data, .. } => data.len(),
        }
    }

    /// Encoded payload, if this is not a raster.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Raster(_) => None,
            Self::Encoded { data, .. } => Some(data),
        }
    }

    /// Decoded pixels, decoding the payload if needed.
    pub fn to_raster(&self) -> Result<Arc<RgbaImage>, CodecError> {
        match self {
            Self::Raster(image) => Ok(Arc::clone(image)),
            Self::Encoded { data, format } => {
                decode_image_with_format(data, format.image_format()).map(Arc::new)
            }
        }
    }

    /// Convert to `format`, re-encoding from pixels.
    pub fn encode(&self, format: TileFormat) -> Result<TileResult, CodecError> {
        match format {
            TileFormat::Raster => self.to_raster().map(Self::Raster),
            TileFormat::Jpeg { quality } => {
                let raster = self.to_raster()?;
                Ok(Self::Encoded {
                    data: encode_jpeg(&raster, quality)?,
                    format: EncodedFormat::Jpeg,
                })
            }
            TileFormat::Png => {
                let raster = self.to_raster()?;
                Ok(Self::Encoded {
                    data: encode_png(&raster)?,
                    format: EncodedFormat::Png,
                })
            }
        }
    }
}
