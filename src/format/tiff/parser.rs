//! TIFF header and IFD structure parsing.
//!
//! # Header layout
//!
//! ```text
//! Classic TIFF (8 bytes):  byte order (2) | 42 (2) | first IFD offset (4)
//! BigTIFF (16 bytes):      byte order (2) | 43 (2) | 8 (2) | 0 (2) | first IFD offset (8)
//! ```
//!
//! # IFD layout
//!
//! ```text
//! entry count (2 | 8) | entries (12 | 20 each) | next IFD offset (4 | 8)
//! entry: tag (2) | field type (2) | count (4 | 8) | value or offset (4 | 8)
//! ```

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Upper bound on entries in one IFD; real files stay far below this.
pub const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) declared by a TIFF header.
///
/// Callers pass slices at least as long as the value being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II"
    LittleEndian,
    /// "MM"
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from the first bytes of a file.
    ///
    /// # Arguments
    /// * `bytes` - At least 8 bytes; 16 are needed for BigTIFF
    /// * `file_size` - Total file size, used to validate the first IFD offset
    ///
    /// # Errors
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if version is not 42 or 43
    /// - `InvalidBigTiffOffsetSize` if BigTIFF offset size is not 8
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&bytes[2..4]) {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            version => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of one IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of offset fields: next-IFD pointers and entry value slots.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Read the entry count from the leading bytes of an IFD.
    pub fn read_entry_count(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u16(bytes) as u64
        }
    }

    /// Read an offset-sized value.
    fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}

// =============================================================================
// IFD
// =============================================================================

/// A single IFD entry as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,

    /// Interpreted field type, `None` if unknown
    pub field_type: Option<FieldType>,

    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw value slot (4 or 8 bytes, zero-padded to 8)
    pub value_offset_bytes: [u8; 8],

    /// Whether the value is held in the slot rather than at an offset
    pub is_inline: bool,

    /// The slot interpreted as a file offset
    pub offset: u64,
}

impl IfdEntry {
    /// Total size of the entry's value in bytes, if the type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|t| (t.size_in_bytes() as u64).saturating_mul(self.count))
    }

    /// Scalar Short/Long held inline.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Scalar Short/Long/Long8 held inline.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => self.inline_u32(byte_order).map(u64::from),
        }
    }
}

/// A parsed Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Total byte size of an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.offset_size()
    }

    /// Parse an IFD from its complete bytes (entry count through next offset).
    ///
    /// Entries with unknown field types are kept, with `field_type` unset.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = header.read_entry_count(bytes);
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("implausible entry count {}", entry_count),
            });
        }

        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let order = header.byte_order;
        let entry_size = header.ifd_entry_size();
        let slot_size = header.offset_size();

        let entries = (0..entry_count as usize)
            .map(|i| {
                let raw = &bytes[count_size + i * entry_size..count_size + (i + 1) * entry_size];
                let tag = order.read_u16(&raw[0..2]);
                let field_type_raw = order.read_u16(&raw[2..4]);
                let field_type = FieldType::from_u16(field_type_raw);

                let (count, slot) = if header.is_bigtiff {
                    (order.read_u64(&raw[4..12]), &raw[12..20])
                } else {
                    (order.read_u32(&raw[4..8]) as u64, &raw[8..12])
                };

                let mut value_offset_bytes = [0u8; 8];
                value_offset_bytes[..slot_size].copy_from_slice(slot);

                let is_inline = field_type
                    .map(|t| t.fits_inline(count, header.is_bigtiff))
                    .unwrap_or(false);

                IfdEntry {
                    tag,
                    field_type,
                    field_type_raw,
                    count,
                    value_offset_bytes,
                    is_inline,
                    offset: header.read_offset(slot),
                }
            })
            .collect();

        let next_pos = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = header.read_offset(&bytes[next_pos..]);

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    /// Find the entry for `tag`.
    pub fn get(&self, tag: TiffTag) -> Option<&IfdEntry> {
        let id = tag.as_u16();
        self.entries.iter().find(|e| e.tag == id)
    }

    /// Inline scalar value of `tag`, if present and stored inline.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get(tag).and_then(|e| e.inline_u32(byte_order))
    }
}

// =============================================================================
// Tests
// =============================================================================
