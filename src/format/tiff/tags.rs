//! TIFF tag and field type definitions.
//!
//! Only the vocabulary needed to locate tiles, decode them, and read the
//! pixel-spacing and description metadata is defined here. Anything else in
//! a directory is skipped.

/// Declare a `u16`-coded enum together with its decoder and display names.
///
/// Extra codes listed after `|` decode to the same variant.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident = $code:literal $(| $alias:literal)* => $label:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                $variant = $code,
            )+
        }

        impl $name {
            /// Decode a raw code; `None` for codes outside the table.
            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($code $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }

            #[inline]
            pub const fn as_u16(self) -> u16 {
                self as u16
            }

            /// Name used in error messages.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

coded_enum! {
    /// TIFF tag IDs read by the directory reader.
    pub enum TiffTag {
        ImageWidth = 256 => "ImageWidth",
        ImageLength = 257 => "ImageLength",
        BitsPerSample = 258 => "BitsPerSample",
        Compression = 259 => "Compression",

        /// Free-form description; carries vendor metadata
        ImageDescription = 270 => "ImageDescription",

        SamplesPerPixel = 277 => "SamplesPerPixel",
        XResolution = 282 => "XResolution",
        YResolution = 283 => "YResolution",
        PlanarConfiguration = 284 => "PlanarConfiguration",

        /// 1 = no unit, 2 = inch, 3 = centimetre
        ResolutionUnit = 296 => "ResolutionUnit",

        TileWidth = 322 => "TileWidth",
        TileLength = 323 => "TileLength",
        TileOffsets = 324 => "TileOffsets",
        TileByteCounts = 325 => "TileByteCounts",

        /// Quantization and Huffman tables shared by abbreviated JPEG tiles
        JpegTables = 347 => "JPEGTables",
    }
}

coded_enum! {
    /// Compression schemes a directory may declare.
    ///
    /// Only `None` and `Jpeg` tiles are decodable; the rest are named so a
    /// rejected directory can say why.
    pub enum Compression {
        None = 1 => "None",
        Lzw = 5 => "LZW",
        OldJpeg = 6 => "Old JPEG",
        Jpeg = 7 => "JPEG",
        Deflate = 8 => "Deflate",
        AdobeDeflate = 32946 => "Adobe Deflate",
        Jpeg2000 = 33003 | 33005 => "JPEG 2000",
    }
}

// =============================================================================
// Field types
// =============================================================================

/// Encodings of an IFD entry's values.
///
/// Types outside this set (signed, floating point) never appear in the tags
/// listed above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    /// Numerator then denominator, both Long
    Rational,
    Undefined,
    /// BigTIFF only
    Long8,
}

impl FieldType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            7 => FieldType::Undefined,
            16 => FieldType::Long8,
            _ => return None,
        })
    }

    /// Bytes per value.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
        }
    }

    /// Whether `count` values fit in the entry's own value slot
    /// (4 bytes, or 8 in BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let slot: u64 = if is_bigtiff { 8 } else { 4 };
        (self.size_in_bytes() as u64).saturating_mul(count) <= slot
    }
}

/// Millimetres per `ResolutionUnit`, for the units that are physical.
pub fn resolution_unit_mm(unit: u32) -> Option<f64> {
    match unit {
        2 => Some(25.4),
        3 => Some(10.0),
        _ => None,
    }
}
