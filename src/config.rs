//! Configuration management for the `sparse-pyramid` command line.
//!
//! This module provides the CLI definition:
//! - Command-line arguments via clap
//! - Environment variables with `PYRAMID_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `PYRAMID_CACHE_ENTRIES` - Max tile results to cache (default: 10000)
//! - `PYRAMID_CACHE_SIZE` - Tile cache budget, e.g. `256MB` (default: 100MB)
//! - `PYRAMID_JPEG_QUALITY` - JPEG quality for `tile` output (default: 80)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::tile::{
    is_valid_quality, TileFormat, TileOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_ENTRIES,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile cache budget, as accepted by `--cache-size`.
pub const DEFAULT_CACHE_SIZE: &str = "100MB";

// =============================================================================
// CLI Arguments
// =============================================================================

/// sparse-pyramid - Tiles from sparse pyramidal TIFF files.
///
/// Reads tiled TIFF and BigTIFF files whose resolution levels may be
/// partially stored, and produces tiles at any zoom level.
#[derive(Parser, Debug, Clone)]
#[command(name = "sparse-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum number of tile results to keep in cache.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ENTRIES, env = "PYRAMID_CACHE_ENTRIES")]
    pub cache_entries: usize,

    /// Tile cache budget in bytes (accepts KB, MB, GB suffixes).
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_CACHE_SIZE,
        value_parser = parse_size,
        env = "PYRAMID_CACHE_SIZE"
    )]
    pub cache_size: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the pyramid layout and metadata of a file.
    Info(InfoArgs),

    /// Write one tile to a file.
    Tile(TileArgs),

    /// Write an associated image (label, macro) to a file.
    Associated(AssociatedArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Path to the TIFF file.
    pub path: PathBuf,

    /// Print machine-readable JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Encoded output format of the `tile` command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

#[derive(Args, Debug, Clone)]
pub struct TileArgs {
    /// Path to the TIFF file.
    pub path: PathBuf,

    /// Zoom level (0 = whole image in one tile).
    pub z: u32,

    /// Tile column.
    pub x: u32,

    /// Tile row.
    pub y: u32,

    /// Output image format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Jpeg)]
    pub format: OutputFormat,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PYRAMID_JPEG_QUALITY")]
    pub quality: u8,

    /// Fill color beyond the image edge, as RRGGBB or RRGGBBAA hex.
    #[arg(long, value_parser = parse_color)]
    pub edge: Option<[u8; 4]>,

    /// Output file (default: tile_<z>_<x>_<y>.<ext>).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AssociatedArgs {
    /// Path to the TIFF file.
    pub path: PathBuf,

    /// Image name, e.g. `label` or `macro`.
    pub name: String,

    /// Output file; the extension selects the format.
    #[arg(short, long)]
    pub output: PathBuf,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_entries == 0 {
            return Err("cache_entries must be greater than 0".to_string());
        }

        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }

        if let Command::Tile(ref args) = self.command {
            if !is_valid_quality(args.quality) {
                return Err("quality must be between 1 and 100".to_string());
            }
        }

        Ok(())
    }
}

impl TileArgs {
    /// Request options for this invocation.
    pub fn options(&self) -> TileOptions {
        let format = match self.format {
            OutputFormat::Jpeg => TileFormat::jpeg(self.quality),
            OutputFormat::Png => TileFormat::Png,
        };
        TileOptions {
            format,
            edge: self.edge,
        }
    }

    /// Output path, defaulting to a name derived from the coordinates.
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let extension = self.options().format.extension().unwrap_or("bin");
            PathBuf::from(format!(
                "tile_{}_{}_{}.{}",
                self.z, self.x, self.y, extension
            ))
        })
    }
}

// =============================================================================
// Value Parsers
// =============================================================================

/// Parse a human-readable size string into bytes.
///
/// Bare numbers are bytes; `K`/`KB`, `M`/`MB` and `G`/`GB` suffixes are
/// binary multiples. Case-insensitive and whitespace tolerant.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let invalid = || format!("invalid size '{}': expected e.g. 256MB, 1GB or 1048576", s);

    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (number, multiplier) = [
        ("GB", 1usize << 30),
        ("G", 1 << 30),
        ("MB", 1 << 20),
        ("M", 1 << 20),
        ("KB", 1 << 10),
        ("K", 1 << 10),
        ("B", 1),
    ]
    .iter()
    .find_map(|(suffix, multiplier)| {
        upper
            .strip_suffix(suffix)
            .map(|number| (number.trim().to_string(), *multiplier))
    })
    .unwrap_or((upper.clone(), 1));

    let number: usize = number.parse().map_err(|_| invalid())?;
    number.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parse `RRGGBB` or `RRGGBBAA` hex (an optional leading `#` is allowed).
pub fn parse_color(s: &str) -> Result<[u8; 4], String> {
    let hex = s.trim().trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return Err(format!("invalid color '{}': expected RRGGBB or RRGGBBAA", s));
    }

    let mut color = [0, 0, 0, 255];
    for (i, slot) in color.iter_mut().enumerate().take(hex.len() / 2) {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| format!("invalid color '{}': not hexadecimal", s))?;
    }
    Ok(color)
}

// =============================================================================
// Tests
// =============================================================================
