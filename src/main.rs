//! sparse-pyramid - Tiles from sparse pyramidal TIFF files.
//!
//! This binary opens a file, reports its pyramid, and writes tiles or
//! associated images to disk.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sparse_pyramid::{
    config::{AssociatedArgs, Cli, Command, InfoArgs, TileArgs},
    tile::{Magnification, TileCache, TileSource},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let cache = Arc::new(TileCache::with_capacity_and_entries(
        cli.cache_size,
        cli.cache_entries,
    ));

    let result = match cli.command {
        Command::Info(ref args) => run_info(args, cache).await,
        Command::Tile(ref args) => run_tile(args, cache).await,
        Command::Associated(ref args) => run_associated(args, cache).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct LevelReport {
    level: u32,
    width: u32,
    height: u32,
    stored: bool,
    directory: Option<usize>,
}

#[derive(Serialize)]
struct InfoReport {
    file: String,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    levels: Vec<LevelReport>,
    magnification: Magnification,
    associated_images: Vec<String>,
}

impl InfoReport {
    fn new(source: &TileSource) -> Self {
        let pyramid = source.pyramid();
        let (width, height) = source.dimensions();
        let (tile_width, tile_height) = source.tile_size();

        let levels = (0..pyramid.levels())
            .map(|level| {
                let (width, height) = pyramid.level_dimensions(level);
                let directory = pyramid.directory(level).map(|d| d.index);
                LevelReport {
                    level,
                    width,
                    height,
                    stored: directory.is_some(),
                    directory,
                }
            })
            .collect();

        Self {
            file: source.identifier().to_string(),
            width,
            height,
            tile_width,
            tile_height,
            levels,
            magnification: source.native_magnification(),
            associated_images: source.associated_image_names(),
        }
    }

    fn print(&self) {
        println!("File:       {}", self.file);
        println!("Dimensions: {} x {}", self.width, self.height);
        println!("Tile size:  {} x {}", self.tile_width, self.tile_height);
        match self.magnification.magnification {
            Some(magnification) => println!("Objective:  {:.1}x", magnification),
            None => println!("Objective:  unknown"),
        }
        if let (Some(mm_x), Some(mm_y)) = (self.magnification.mm_x, self.magnification.mm_y) {
            println!("Pixel size: {:.6} x {:.6} mm", mm_x, mm_y);
        }
        println!();
        println!("Level  Size                Source");
        println!("─────  ──────────────────  ─────────────");
        for level in &self.levels {
            let source = match level.directory {
                Some(index) => format!("directory {}", index),
                None => "synthesized".to_string(),
            };
            println!(
                "{:>5}  {:<18}  {}",
                level.level,
                format!("{} x {}", level.width, level.height),
                source
            );
        }
        if !self.associated_images.is_empty() {
            println!();
            println!("Associated images: {}", self.associated_images.join(", "));
        }
    }
}

async fn run_info(args: &InfoArgs, cache: Arc<TileCache>) -> Result<(), String> {
    let source = open_source(&args.path, cache).await?;
    let report = InfoReport::new(&source);

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else {
        report.print();
    }
    Ok(())
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(args: &TileArgs, cache: Arc<TileCache>) -> Result<(), String> {
    let source = open_source(&args.path, cache).await?;

    let tile = source
        .get_tile(args.x, args.y, args.z, &args.options())
        .await
        .map_err(|e| e.to_string())?;

    let data = tile
        .as_bytes()
        .ok_or_else(|| "tile was not encoded".to_string())?;

    let output = args.output_path();
    tokio::fs::write(&output, data)
        .await
        .map_err(|e| format!("Failed to write {}: {}", output.display(), e))?;

    debug!(stats = ?source.cache().stats(), "Cache after request");
    println!("Wrote {} ({} bytes)", output.display(), data.len());
    Ok(())
}

// =============================================================================
// Associated Command
// =============================================================================

async fn run_associated(args: &AssociatedArgs, cache: Arc<TileCache>) -> Result<(), String> {
    let source = open_source(&args.path, cache).await?;

    let image = source
        .associated_image(&args.name)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| {
            let names = source.associated_image_names();
            if names.is_empty() {
                format!("No associated image '{}' (file has none)", args.name)
            } else {
                format!(
                    "No associated image '{}' (available: {})",
                    args.name,
                    names.join(", ")
                )
            }
        })?;

    // JPEG has no alpha channel
    let is_jpeg = args
        .output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));

    let output = args.output.clone();
    tokio::task::spawn_blocking(move || {
        let saved = if is_jpeg {
            DynamicImage::ImageRgba8(image).to_rgb8().save(&output)
        } else {
            image.save(&output)
        };
        saved.map_err(|e| format!("Failed to write {}: {}", output.display(), e))
    })
    .await
    .map_err(|e| e.to_string())??;

    println!("Wrote {}", args.output.display());
    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn open_source(path: &Path, cache: Arc<TileCache>) -> Result<TileSource, String> {
    TileSource::open(path, cache)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Initialize logging with the appropriate level.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "sparse_pyramid=debug"
    } else {
        "sparse_pyramid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
