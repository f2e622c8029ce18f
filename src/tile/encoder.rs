//! Raster operations and image encoding.
//!
//! All tile composition happens on RGBA rasters so that regions outside the
//! image stay transparent until a caller picks an output format.
//!
//! # Design Decisions
//!
//! - **Always re-encode**: decoded tiles are re-encoded for the requested
//!   format; stored bytes are never passed through.
//!
//! - **Single resampling filter**: every downsample uses Lanczos3.
//!
//! - **JPEG drops alpha**: transparent pixels encode as black.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageEncoder, ImageFormat, RgbImage, Rgba, RgbaImage};

use crate::error::CodecError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Decoding
// =============================================================================

/// Decode an encoded image (JPEG, PNG) into RGBA.
pub fn decode_image(data: &[u8]) -> Result<RgbaImage, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Decode {
            message: "empty image data".to_string(),
        });
    }

    image::load_from_memory(data)
        .map(|image| image.to_rgba8())
        .map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })
}

/// Decode an encoded image of a known format into RGBA.
pub fn decode_image_with_format(data: &[u8], format: ImageFormat) -> Result<RgbaImage, CodecError> {
    image::load_from_memory_with_format(data, format)
        .map(|image| image.to_rgba8())
        .map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })
}

/// Interpret uncompressed interleaved 8-bit samples as an RGBA raster.
pub fn decode_raw(data: &[u8], width: u32, height: u32, samples: u16) -> Result<RgbaImage, CodecError> {
    let expected = width as usize * height as usize * samples as usize;
    if data.len() < expected {
        return Err(CodecError::Decode {
            message: format!(
                "raw tile holds {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                samples
            ),
        });
    }

    let pixels = data[..expected].to_vec();
    let image = match samples {
        1 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        _ => None,
    };

    image
        .map(|image| image.to_rgba8())
        .ok_or_else(|| CodecError::Decode {
            message: format!("unsupported sample count {}", samples),
        })
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a raster as JPEG at `quality` (clamped to 1-100).
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Bytes, CodecError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
    encoder
        .encode_image(&rgb)
        .map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output))
}

/// Encode a raster as PNG, keeping alpha.
pub fn encode_png(image: &RgbaImage) -> Result<Bytes, CodecError> {
    let mut output = Cursor::new(Vec::new());
    PngEncoder::new(&mut output)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output.into_inner()))
}

// =============================================================================
// Raster operations
// =============================================================================

/// Resample to exactly `width x height` with Lanczos3.
pub fn resize(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Lanczos3)
}

/// Copy the `width x height` region at `(x, y)`, clipped to the image.
pub fn crop(image: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    imageops::crop_imm(image, x, y, width, height).to_image()
}

/// Overwrite `canvas` with `tile` at `(x, y)`; parts outside the canvas are dropped.
pub fn paste(canvas: &mut RgbaImage, tile: &RgbaImage, x: u32, y: u32) {
    imageops::replace(canvas, tile, x as i64, y as i64);
}

/// Crop or pad (transparent) to exactly `width x height`, anchored top-left.
pub fn fit_to_tile(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    let mut canvas = RgbaImage::new(width, height);
    paste(&mut canvas, &image, 0, 0);
    canvas
}

/// Fill every pixel at or beyond `(valid_width, valid_height)` with `color`.
pub fn apply_edge(image: &mut RgbaImage, valid_width: u32, valid_height: u32, color: [u8; 4]) {
    if valid_width >= image.width() && valid_height >= image.height() {
        return;
    }
    let fill = Rgba(color);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if x >= valid_width || y >= valid_height {
            *pixel = fill;
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
