//! TIFF parsing for pyramidal tiled images.
//!
//! # Key Concepts
//!
//! - **Byte order**: the header declares II (little-endian) or MM (big-endian);
//!   every multi-byte value follows it.
//!
//! - **Classic TIFF vs BigTIFF**: 32-bit versus 64-bit offsets. Both are
//!   handled transparently.
//!
//! - **IFD (Image File Directory)**: one image in the file. Pyramid files hold
//!   one IFD per stored resolution, sometimes with gaps, plus auxiliary images.
//!
//! - **Inline vs offset values**: small values sit in the IFD entry itself,
//!   larger ones at an offset the entry points to.

mod description;
mod directory;
mod parser;
mod tags;
mod values;

pub use description::DescriptionMetadata;
pub use directory::{TiffDirectoryReader, MAX_IFDS};
pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};
pub use tags::{resolution_unit_mm, Compression, FieldType, TiffTag};
pub use values::ValueReader;
