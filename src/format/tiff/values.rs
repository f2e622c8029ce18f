//! TIFF tag value reading.
//!
//! Values live either in the entry's inline slot or at an offset in the file.
//! Arrays such as TileOffsets are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Reads tag values respecting the file's byte order and layout.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read the raw bytes of an entry's value.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let bytes = self.reader.read_exact_at(entry.offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read a single unsigned integer value.
    pub async fn read_u32(&self, tag: TiffTag, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.byte_order()) {
            return Ok(value);
        }
        let values = self.read_u64_array(tag, entry).await?;
        match values.as_slice() {
            [value] => u32::try_from(*value).map_err(|_| TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!("value {} does not fit in 32 bits", value),
            }),
            _ => Err(TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!("expected count 1, got {}", entry.count),
            }),
        }
    }

    /// Read an array of Short, Long or Long8 values widened to u64.
    ///
    /// This is the primary method for reading TileOffsets and TileByteCounts.
    pub async fn read_u64_array(
        &self,
        tag: TiffTag,
        entry: &IfdEntry,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let width = match field_type {
            FieldType::Short | FieldType::Long | FieldType::Long8 => field_type.size_in_bytes(),
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("expected Short, Long or Long8, got {:?}", other),
                })
            }
        };

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let order = self.byte_order();

        Ok(bytes
            .chunks_exact(width)
            .map(|chunk| match width {
                2 => order.read_u16(chunk) as u64,
                4 => order.read_u32(chunk) as u64,
                _ => order.read_u64(chunk),
            })
            .collect())
    }

    /// Read an ASCII value, stopping at the first NUL.
    pub async fn read_string(&self, tag: TiffTag, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!("expected Ascii, got type {}", entry.field_type_raw),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read the first Rational of an entry as a float.
    ///
    /// Returns `None` for a zero denominator.
    pub async fn read_rational(
        &self,
        tag: TiffTag,
        entry: &IfdEntry,
    ) -> Result<Option<f64>, TiffError> {
        if entry.field_type != Some(FieldType::Rational) || entry.count == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!(
                    "expected Rational, got type {} with count {}",
                    entry.field_type_raw, entry.count
                ),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let order = self.byte_order();
        let numerator = order.read_u32(&bytes[0..4]);
        let denominator = order.read_u32(&bytes[4..8]);

        if denominator == 0 {
            return Ok(None);
        }
        Ok(Some(numerator as f64 / denominator as f64))
    }
}
