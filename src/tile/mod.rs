//! Tile layer.
//!
//! This module answers tile requests at any zoom level of a pyramid,
//! decoding stored tiles, composing tiles for empty levels, and memoizing
//! every result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        TileSource::get_tile(x, y, z)    │
//! └────────────────────┬────────────────────┘
//!                      │ validate level, bounds
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TileCache (single-flight LRU)       │
//! └────────────────────┬────────────────────┘
//!                      │ miss
//!          ┌───────────┴────────────┐
//!          ▼                        ▼
//! ┌──────────────────┐   ┌──────────────────────┐
//! │  stored level:   │   │  empty level:        │
//! │  TileCodec       │   │  synthesize from     │
//! │  decode_tile     │   │  finer sub-tiles ────┼──► TileSource (recursive)
//! └────────┬─────────┘   └──────────┬───────────┘
//!          └───────────┬────────────┘
//!                      ▼
//!        fit to tile size, edge fill, encode
//! ```
//!
//! # Components
//!
//! - [`TileSource`]: Entry point for tile requests on one opened file
//! - [`TileCache`]: Shared LRU cache with one computation per key at a time
//! - [`TileCodec`]: Decodes stored tiles and embedded images ([`ImageCodec`] by default)
//! - [`TileOptions`]: Output format and edge fill of a request
//! - [`TileResult`]: A raster or an encoded image
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sparse_pyramid::tile::{TileCache, TileOptions, TileSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(TileCache::new());
//!     let source = TileSource::open("slide.tiff", cache).await?;
//!
//!     // Level 0 holds the whole image in a single tile
//!     let tile = source.get_tile(0, 0, 0, &TileOptions::jpeg(80)).await?;
//!     println!("{} bytes", tile.byte_size());
//!     Ok(())
//! }
//! ```

mod cache;
mod codec;
mod encoder;
mod request;
mod result;
mod source;
mod synthesis;

pub use cache::{
    CacheStats, SourceId, TileCache, TileKey, DEFAULT_MAX_ENTRIES, DEFAULT_TILE_CACHE_CAPACITY,
};
pub use codec::{ImageCodec, TileCodec};
pub use encoder::{
    apply_edge, clamp_quality, crop, decode_image, encode_jpeg, encode_png, fit_to_tile,
    is_valid_quality, paste, resize, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use request::{Synthesis, TileFormat, TileOptions};
pub use result::{EncodedFormat, TileResult};
pub use source::{Magnification, TileSource, MAGNIFICATION_REFERENCE_MM};
