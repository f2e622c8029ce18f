use thiserror::Error;

/// I/O errors that can occur when reading from a tile file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF files.
///
/// When raised while reading a single directory, the error only disqualifies
/// that directory; enumeration of the remaining directories continues.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only JPEG and uncompressed tiles are supported)")]
    UnsupportedCompression(String),

    /// Pixel layout the tile decoder cannot interpret
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tile index outside the directory's tile grid
    #[error("Tile ({x}, {y}) is outside the stored tile grid")]
    TileOutOfRange { x: u32, y: u32 },
}

/// Errors from decoding stored tiles or encoding output tiles.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Reading the stored tile bytes failed
    #[error("Failed to read tile data: {0}")]
    Read(#[from] TiffError),

    /// The directory carries no tile storage to read from
    #[error("Directory {index} has no readable tile data")]
    NoTileData { index: usize },

    /// The stored tile has zero length
    #[error("Tile ({x}, {y}) has no stored data")]
    EmptyTile { x: u32, y: u32 },

    /// Image decoding failed
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Image encoding failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Errors that can occur when opening a tile source.
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The file header is not a readable TIFF header
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// No directory survived filtering
    #[error("File didn't meet requirements for a tile source: {}", describe_last_error(.last_error))]
    NoUsableDirectories { last_error: Option<TiffError> },
}

fn describe_last_error(last_error: &Option<TiffError>) -> String {
    match last_error {
        Some(err) => format!("no usable tiled directories (last error: {})", err),
        None => "no usable tiled directories".to_string(),
    }
}

/// Errors that can occur during tile requests
#[derive(Debug, Clone, Error)]
pub enum TileSourceError {
    /// Requested level is outside the pyramid
    #[error("Invalid level: {level} (pyramid has {levels} levels)")]
    InvalidLevel { level: u32, levels: u32 },

    /// Requested JPEG quality is outside 1..=100
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },

    /// Tile coordinates outside a populated level's grid
    #[error("Tile ({x}, {y}) out of bounds for level {level} (max: {max_x}, {max_y})")]
    MissingTile {
        level: u32,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// Decoding a stored tile failed
    #[error("Failed to read tile ({x}, {y}) at level {level}: {source}")]
    TileRead {
        level: u32,
        x: u32,
        y: u32,
        #[source]
        source: CodecError,
    },

    /// Level is empty and synthesis was not allowed
    #[error("Level {level} is not stored in the file")]
    MissingLevel { level: u32 },

    /// Synthesis requested for the reference level
    #[error("Level {level} is the finest level and cannot be synthesized")]
    UnsynthesizableLevel { level: u32 },

    /// Output encoding failed
    #[error("Failed to encode tile: {0}")]
    Encode(CodecError),
}
