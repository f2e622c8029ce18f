//! Tile request options.

use crate::error::TileSourceError;

use super::encoder::is_valid_quality;

/// Output representation of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    /// Decoded RGBA pixels
    #[default]
    Raster,

    /// JPEG at the given quality (1-100)
    Jpeg { quality: u8 },

    /// PNG with alpha
    Png,
}

impl TileFormat {
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg { quality }
    }

    /// Reject parameters no encoder accepts.
    ///
    /// # Errors
    /// - `InvalidQuality` for a JPEG quality outside 1-100
    pub fn validate(&self) -> Result<(), TileSourceError> {
        match *self {
            Self::Jpeg { quality } if !is_valid_quality(quality) => {
                Err(TileSourceError::InvalidQuality { quality })
            }
            _ => Ok(()),
        }
    }

    /// Conventional file extension, if the format is encoded.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Raster => None,
            Self::Jpeg { .. } => Some("jpg"),
            Self::Png => Some("png"),
        }
    }
}

/// Everything about a tile request besides its coordinates.
///
/// Part of the cache key: two requests share a cached result only when
/// their options are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileOptions {
    pub format: TileFormat,

    /// RGBA fill for pixels beyond the image extent; `None` leaves them
    /// transparent.
    pub edge: Option<[u8; 4]>,
}

impl TileOptions {
    pub fn raster() -> Self {
        Self::default()
    }

    pub fn jpeg(quality: u8) -> Self {
        Self {
            format: TileFormat::jpeg(quality),
            edge: None,
        }
    }

    pub fn png() -> Self {
        Self {
            format: TileFormat::Png,
            edge: None,
        }
    }

    pub fn with_edge(mut self, color: [u8; 4]) -> Self {
        self.edge = Some(color);
        self
    }
}

/// Whether a request for an empty level may be composed from finer levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Synthesis {
    #[default]
    Allowed,
    Disabled,
}
