//! # Sparse Pyramid
//!
//! Tiles at any zoom level from pyramidal tiled TIFF files whose resolution
//! levels may be only partially stored.
//!
//! Scanners and converters often write a full-resolution image plus a few
//! downsampled copies, leaving gaps between them. This library normalizes a
//! file's directories into a dense array of zoom levels and fills the gaps
//! on demand by composing and downsampling tiles from the nearest finer
//! stored level.
//!
//! ## Features
//!
//! - **Sparse levels**: missing levels are synthesized, recursively if needed
//! - **Format support**: classic TIFF and BigTIFF, JPEG (with shared tables)
//!   and uncompressed tiles, Aperio and Philips metadata
//! - **Single-flight caching**: concurrent requests for a tile share one
//!   computation, and results are kept in a size-bounded LRU cache
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Range readers over local files and memory
//! - [`mod@format`] - TIFF directory parsing and JPEG stream handling
//! - [`pyramid`] - Directory records and the zoom-level pyramid
//! - [`tile`] - Tile source, synthesis, codec and cache
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sparse_pyramid::{TileCache, TileOptions, TileSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(TileCache::new());
//!     let source = TileSource::open("slide.tiff", cache).await?;
//!
//!     let level = source.preferred_level(3);
//!     let tile = source.get_tile(0, 0, level, &TileOptions::png()).await?;
//!     if let Some(png) = tile.as_bytes() {
//!         std::fs::write("tile.png", png)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod pyramid;
pub mod tile;

// Re-export commonly used types
pub use error::{CodecError, IoError, OpenError, TiffError, TileSourceError};
pub use format::tiff::TiffDirectoryReader;
pub use io::{LocalFileReader, MemoryReader, RangeReader};
pub use pyramid::{Directory, PixelInfo, Pyramid, TileEncoding, TileStore};
pub use tile::{
    CacheStats, EncodedFormat, ImageCodec, Magnification, SourceId, Synthesis, TileCache,
    TileCodec, TileFormat, TileKey, TileOptions, TileResult, TileSource,
};
