//! File format support.
//!
//! - [`tiff`]: TIFF/BigTIFF header and IFD parsing, and enumeration of
//!   directory records for the pyramid builder
//! - [`jpeg`]: merging of shared JPEG tables into abbreviated tile streams

pub mod jpeg;
pub mod tiff;

pub use jpeg::{is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg};
