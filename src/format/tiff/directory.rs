//! Directory enumeration for tiled TIFF files.
//!
//! Walks the IFD chain and turns every IFD into a [`Directory`] record, or
//! into the error that disqualified it. One bad directory never hides the
//! others; only a broken chain (an IFD that cannot be read at all) ends the
//! walk.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::io::RangeReader;
use crate::pyramid::{Directory, PixelInfo, TileEncoding, TileStore};

use super::description::DescriptionMetadata;
use super::parser::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES};
use super::tags::{resolution_unit_mm, Compression, TiffTag};
use super::values::ValueReader;

/// Maximum number of IFDs to walk (guards against runaway chains)
pub const MAX_IFDS: usize = 512;

// =============================================================================
// TiffDirectoryReader
// =============================================================================

/// Reads directory records from a TIFF or BigTIFF file.
pub struct TiffDirectoryReader<R: RangeReader + 'static> {
    reader: Arc<R>,
    header: TiffHeader,
}

impl<R: RangeReader + 'static> TiffDirectoryReader<R> {
    /// Read and validate the file header.
    ///
    /// # Errors
    /// Any header error; a file with an unreadable header has no directories.
    pub async fn open(reader: Arc<R>) -> Result<Self, TiffError> {
        let size = reader.size();
        let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let bytes = reader.read_exact_at(0, len).await?;
        let header = TiffHeader::parse(&bytes, size)?;

        debug!(
            file = reader.identifier(),
            bigtiff = header.is_bigtiff,
            "Parsed TIFF header"
        );

        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    /// Enumerate every directory in file order.
    ///
    /// A chain error is reported only when no directory failed before it, so
    /// the most specific rejection reason survives.
    pub async fn read_directories(&self) -> Vec<Result<Directory, TiffError>> {
        let mut records: Vec<Result<Directory, TiffError>> = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = self.header.first_ifd_offset;

        while offset != 0 && records.len() < MAX_IFDS {
            if !visited.insert(offset) {
                debug!(offset, "IFD chain loops back; stopping");
                break;
            }

            let ifd = match self.read_ifd(offset).await {
                Ok(ifd) => ifd,
                Err(err) => {
                    debug!(offset, error = %err, "IFD chain broken");
                    if !records.iter().any(Result::is_err) {
                        records.push(Err(err));
                    }
                    break;
                }
            };

            let index = records.len();
            let record = self.directory_from_ifd(index, &ifd).await;
            if let Err(ref err) = record {
                debug!(index, error = %err, "Directory rejected");
            }
            records.push(record);
            offset = ifd.next_ifd_offset;
        }

        records
    }

    async fn read_ifd(&self, offset: u64) -> Result<Ifd, TiffError> {
        if offset >= self.reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = self
            .reader
            .read_exact_at(offset, self.header.ifd_count_size())
            .await?;
        let entry_count = self.header.read_entry_count(&count_bytes);
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("implausible entry count {}", entry_count),
            });
        }

        let size = Ifd::calculate_size(entry_count, &self.header);
        let bytes = self.reader.read_exact_at(offset, size).await?;
        Ifd::parse(&bytes, &self.header)
    }

    async fn directory_from_ifd(&self, index: usize, ifd: &Ifd) -> Result<Directory, TiffError> {
        let values = ValueReader::new(self.reader.as_ref(), &self.header);

        let image_width = required_u32(&values, ifd, TiffTag::ImageWidth).await?;
        let image_height = required_u32(&values, ifd, TiffTag::ImageLength).await?;

        let metadata = match ifd.get(TiffTag::ImageDescription) {
            Some(entry) => match values.read_string(TiffTag::ImageDescription, entry).await {
                Ok(description) => DescriptionMetadata::parse(&description),
                Err(err) => {
                    debug!(index, error = %err, "Ignoring unreadable ImageDescription");
                    DescriptionMetadata::default()
                }
            },
            None => DescriptionMetadata::default(),
        };

        let pixel_info = self.pixel_info(ifd, &values, &metadata).await;

        let (tile_width, tile_height) = match (
            ifd.get(TiffTag::TileWidth),
            ifd.get(TiffTag::TileLength),
        ) {
            (Some(width), Some(height)) => (
                values.read_u32(TiffTag::TileWidth, width).await?,
                values.read_u32(TiffTag::TileLength, height).await?,
            ),
            _ => (0, 0),
        };

        let mut directory = Directory::new(index, image_width, image_height, tile_width, tile_height)
            .with_pixel_info(pixel_info);
        for (name, data) in metadata.embedded_images {
            directory = directory.with_embedded_image(name, data);
        }

        if !directory.is_tiled() {
            return Ok(directory);
        }

        let encoding = self.tile_encoding(ifd, &values).await?;

        let offsets = required_array(&values, ifd, TiffTag::TileOffsets).await?;
        let byte_counts = required_array(&values, ifd, TiffTag::TileByteCounts).await?;
        let (columns, rows) = directory.tile_count();
        let expected = columns as usize * rows as usize;

        for (tag, len) in [
            (TiffTag::TileOffsets, offsets.len()),
            (TiffTag::TileByteCounts, byte_counts.len()),
        ] {
            if len < expected {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("expected {} tiles, found {}", expected, len),
                });
            }
        }

        let jpeg_tables = match ifd.get(TiffTag::JpegTables) {
            Some(entry) if encoding == TileEncoding::Jpeg => Some(values.read_bytes(entry).await?),
            _ => None,
        };

        let store = TiffTileStore {
            reader: Arc::clone(&self.reader),
            columns,
            rows,
            offsets,
            byte_counts,
            jpeg_tables,
            encoding,
        };

        Ok(directory.with_store(Arc::new(store), encoding))
    }

    async fn tile_encoding(
        &self,
        ifd: &Ifd,
        values: &ValueReader<'_, R>,
    ) -> Result<TileEncoding, TiffError> {
        let raw = match ifd.get(TiffTag::Compression) {
            Some(entry) => values.read_u32(TiffTag::Compression, entry).await?,
            None => Compression::None as u32,
        };

        let compression = u16::try_from(raw)
            .ok()
            .and_then(Compression::from_u16)
            .ok_or_else(|| TiffError::UnsupportedCompression(format!("code {}", raw)))?;

        match compression {
            Compression::Jpeg => Ok(TileEncoding::Jpeg),
            Compression::None => {
                let samples = optional_u32(values, ifd, TiffTag::SamplesPerPixel, 1).await?;
                let planar = optional_u32(values, ifd, TiffTag::PlanarConfiguration, 1).await?;
                let bits = match ifd.get(TiffTag::BitsPerSample) {
                    Some(entry) => values.read_u64_array(TiffTag::BitsPerSample, entry).await?,
                    None => vec![1],
                };

                if !matches!(samples, 1 | 3 | 4) || planar != 1 || bits.iter().any(|b| *b != 8) {
                    return Err(TiffError::UnsupportedLayout(format!(
                        "{} samples, planar configuration {}, bits {:?}",
                        samples, planar, bits
                    )));
                }
                Ok(TileEncoding::Raw {
                    samples: samples as u16,
                })
            }
            other => Err(TiffError::UnsupportedCompression(other.name().to_string())),
        }
    }

    /// Pixel spacing from vendor metadata, falling back to resolution tags
    /// with an explicit physical unit.
    async fn pixel_info(
        &self,
        ifd: &Ifd,
        values: &ValueReader<'_, R>,
        metadata: &DescriptionMetadata,
    ) -> PixelInfo {
        let mut info = PixelInfo {
            mm_x: metadata.mm_x,
            mm_y: metadata.mm_y,
            magnification: metadata.magnification,
        };

        if info.mm_x.is_some() {
            return info;
        }

        let unit_mm = match ifd.get_u32(TiffTag::ResolutionUnit, values.byte_order()) {
            Some(unit) => resolution_unit_mm(unit),
            None => None,
        };
        let Some(unit_mm) = unit_mm else {
            return info;
        };

        for (tag, slot) in [
            (TiffTag::XResolution, &mut info.mm_x),
            (TiffTag::YResolution, &mut info.mm_y),
        ] {
            if let Some(entry) = ifd.get(tag) {
                if let Ok(Some(resolution)) = values.read_rational(tag, entry).await {
                    if resolution > 0.0 {
                        *slot = Some(unit_mm / resolution);
                    }
                }
            }
        }

        info
    }
}

async fn required_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<u32, TiffError> {
    let entry = ifd.get(tag).ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u32(tag, entry).await
}

async fn optional_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
    default: u32,
) -> Result<u32, TiffError> {
    match ifd.get(tag) {
        Some(entry) => values.read_u32(tag, entry).await,
        None => Ok(default),
    }
}

async fn required_array<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Vec<u64>, TiffError> {
    let entry = ifd.get(tag).ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u64_array(tag, entry).await
}

// =============================================================================
// TiffTileStore
// =============================================================================

/// Tile locations for one directory, read lazily from the file.
struct TiffTileStore<R: RangeReader + 'static> {
    reader: Arc<R>,
    columns: u32,
    rows: u32,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    jpeg_tables: Option<Bytes>,
    encoding: TileEncoding,
}

impl<R: RangeReader + 'static> fmt::Debug for TiffTileStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiffTileStore")
            .field("file", &self.reader.identifier())
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("jpeg_tables", &self.jpeg_tables.as_ref().map(Bytes::len))
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[async_trait]
impl<R: RangeReader + 'static> TileStore for TiffTileStore<R> {
    async fn read_tile(&self, x: u32, y: u32) -> Result<Bytes, TiffError> {
        if x >= self.columns || y >= self.rows {
            return Err(TiffError::TileOutOfRange { x, y });
        }

        let index = y as usize * self.columns as usize + x as usize;
        let (offset, count) = (self.offsets[index], self.byte_counts[index]);
        if count == 0 {
            return Ok(Bytes::new());
        }

        let data = self.reader.read_exact_at(offset, count as usize).await?;
        Ok(match self.encoding {
            TileEncoding::Jpeg => prepare_tile_jpeg(self.jpeg_tables.as_deref(), &data),
            TileEncoding::Raw { .. } => data,
        })
    }
}
