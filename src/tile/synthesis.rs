//! Composition of tiles for levels the file does not store.
//!
//! A tile at empty level `z` covers the same area as a `2^k x 2^k` block of
//! tiles at the nearest finer stored level `z + k`:
//!
//! ```text
//!   level z (empty)            level z + k (stored), scale = 2^k
//!   ┌────────┐                 ┌──┬──┬──┬──┐
//!   │ (x, y) │   ◄── resize ── │  │  │  │  │  canvas: tw*scale x th*scale
//!   └────────┘                 ├──┼──┼──┼──┤  sub-tile (dx, dy) pasted at
//!                              │  │  │  │  │  (dx*tw, dy*th)
//!                              └──┴──┴──┴──┘
//! ```
//!
//! Sub-tiles are requested through the tile source, so they are cached and
//! shared with concurrent requests, and a sub-tile at another empty level
//! would itself be synthesized.

use futures::future::try_join_all;
use image::RgbaImage;
use tracing::{debug, error};

use crate::error::TileSourceError;

use super::encoder::{paste, resize};
use super::request::{Synthesis, TileOptions};
use super::source::TileSource;

/// Compose tile `(x, y)` of empty level `z` from the nearest finer stored level.
///
/// Sub-cells that fall outside the image are skipped and stay transparent;
/// the origin cell is always requested, so an out-of-range `(x, y)` fails
/// with the finer level's `MissingTile`. Any sub-tile failure aborts the
/// whole composition.
///
/// # Errors
/// - `UnsynthesizableLevel` if `z` is the finest level
/// - Any error from fetching a sub-tile
pub(crate) async fn synthesize(
    source: &TileSource,
    x: u32,
    y: u32,
    z: u32,
) -> Result<RgbaImage, TileSourceError> {
    let pyramid = source.pyramid();
    let levels = pyramid.levels();

    if z + 1 >= levels {
        error!(level = z, levels, "Cannot synthesize the finest level");
        return Err(TileSourceError::UnsynthesizableLevel { level: z });
    }

    // The finest level is always stored, so this stops at levels - 1
    let mut steps = 1;
    while z + steps < levels - 1 && !pyramid.is_populated(z + steps) {
        steps += 1;
    }
    let source_level = z + steps;

    let (tile_width, tile_height) = pyramid.tile_size();
    let scale = 1u32
        .checked_shl(steps)
        .filter(|scale| {
            tile_width.checked_mul(*scale).is_some() && tile_height.checked_mul(*scale).is_some()
        })
        .ok_or(TileSourceError::UnsynthesizableLevel { level: z })?;

    // Tile-grid extent of the source level, in floating point
    let (size_x, size_y) = pyramid.dimensions();
    let level_scale = 2f64.powi(source_level as i32 + 1 - levels as i32);
    let max_x = level_scale * size_x as f64 / tile_width as f64;
    let max_y = level_scale * size_y as f64 / tile_height as f64;

    let origin_x = x as u64 * scale as u64;
    let origin_y = y as u64 * scale as u64;

    let cells: Vec<(u32, u32)> = (0..scale)
        .flat_map(|dy| (0..scale).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| {
            (dx == 0 && dy == 0)
                || (((origin_x + dx as u64) as f64) < max_x
                    && ((origin_y + dy as u64) as f64) < max_y)
        })
        .collect();

    debug!(
        level = z,
        x,
        y,
        source_level,
        scale,
        sub_tiles = cells.len(),
        "Synthesizing tile"
    );

    // Out-of-range coordinates saturate and fail the finer level's bounds check
    let sub_coordinate = |origin: u64, delta: u32| {
        u32::try_from(origin + delta as u64).unwrap_or(u32::MAX)
    };

    let fetches = cells.iter().map(|&(dx, dy)| {
        let sub_x = sub_coordinate(origin_x, dx);
        let sub_y = sub_coordinate(origin_y, dy);
        async move {
            let tile = source
                .fetch(
                    sub_x,
                    sub_y,
                    source_level,
                    TileOptions::raster(),
                    Synthesis::Allowed,
                )
                .await?;
            let raster = tile
                .to_raster()
                .map_err(|err| TileSourceError::TileRead {
                    level: source_level,
                    x: sub_x,
                    y: sub_y,
                    source: err,
                })?;
            Ok::<_, TileSourceError>((dx, dy, raster))
        }
    });
    let tiles = try_join_all(fetches).await?;

    let mut canvas = RgbaImage::new(tile_width * scale, tile_height * scale);
    for (dx, dy, raster) in tiles {
        paste(&mut canvas, &raster, dx * tile_width, dy * tile_height);
    }

    Ok(resize(&canvas, tile_width, tile_height))
}
