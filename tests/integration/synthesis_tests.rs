//! Sparse level synthesis integration tests.
//!
//! Tests verify:
//! - Empty levels are composed from the nearest finer stored level
//! - Sub-cells beyond the image are skipped and stay transparent
//! - Sub-tiles are shared through the cache across levels
//! - A failing sub-tile aborts the whole composition

use std::sync::Arc;

use sparse_pyramid::error::{CodecError, TileSourceError};
use sparse_pyramid::tile::{TileCache, TileOptions};

use super::test_utils::{
    is_uniform, open_shared, open_with_codec, sparse_file, CountingCodec, TestDirectory,
    TiffFileBuilder,
};

/// Directory index of the 2048px level in [`sparse_file`].
const FINE: usize = 0;

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_missing_level_composed_from_finer_level() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    assert_eq!(source.levels(), 4);
    assert_eq!(source.preferred_level(1), 3);

    let tile = source.get_tile(0, 0, 1, &TileOptions::raster()).await.unwrap();
    let raster = tile.to_raster().unwrap();

    assert_eq!(raster.dimensions(), (256, 256));
    assert_eq!(codec.decode_count_for(FINE), 16);
    assert_eq!(codec.decode_count(), 16);
    assert!(is_uniform(&raster, [200, 60, 40, 255], 4));
}

#[tokio::test]
async fn test_adjacent_missing_levels_reuse_cached_sub_tiles() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    source.get_tile(0, 0, 2, &TileOptions::raster()).await.unwrap();
    assert_eq!(codec.decode_count(), 4);

    // Level 1 needs the 4x4 block at level 3; the top-left 2x2 is cached
    source.get_tile(0, 0, 1, &TileOptions::raster()).await.unwrap();
    assert_eq!(codec.decode_count(), 16);
}

#[tokio::test]
async fn test_synthesized_tile_is_cached() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    let first = source.get_tile(1, 1, 2, &TileOptions::raster()).await.unwrap();
    let second = source.get_tile(1, 1, 2, &TileOptions::raster()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(codec.decode_count(), 4);
}

#[tokio::test]
async fn test_output_formats_share_sub_tiles() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    let jpeg = source.get_tile(0, 0, 1, &TileOptions::jpeg(80)).await.unwrap();
    let png = source.get_tile(0, 0, 1, &TileOptions::png()).await.unwrap();

    assert_eq!(codec.decode_count(), 16);
    assert_eq!(jpeg.to_raster().unwrap().dimensions(), (256, 256));
    assert!(is_uniform(&png.to_raster().unwrap(), [200, 60, 40, 255], 4));
}

// =============================================================================
// Image bounds
// =============================================================================

/// 600x300 with 256px tiles: three levels, only level 2 stored.
fn partial_file() -> Vec<u8> {
    TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(600, 300, 256, [30, 160, 90]))
        .build()
}

#[tokio::test]
async fn test_cells_beyond_image_skipped() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(partial_file(), codec.clone()).await;
    assert_eq!(source.levels(), 3);

    let tile = source.get_tile(0, 0, 0, &TileOptions::raster()).await.unwrap();
    let raster = tile.to_raster().unwrap();

    // Only the 3x2 stored grid of the 4x4 block is fetched
    assert_eq!(codec.decode_count(), 6);
    assert_eq!(raster.dimensions(), (256, 256));

    let inside = raster.get_pixel(10, 10);
    assert!(inside[1].abs_diff(160) <= 4);
    assert_eq!(inside[3], 255);
    assert_eq!(raster.get_pixel(200, 10)[3], 0);
    assert_eq!(raster.get_pixel(250, 250)[3], 0);
}

#[tokio::test]
async fn test_edge_fill_on_synthesized_tile() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(partial_file(), codec).await;

    let white = [255, 255, 255, 255];
    let options = TileOptions::raster().with_edge(white);
    let raster = source
        .get_tile(0, 0, 0, &options)
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    // Level 0 extent is 150x75
    assert_eq!(raster.get_pixel(160, 10).0, white);
    assert_eq!(raster.get_pixel(10, 80).0, white);
    assert_eq!(raster.get_pixel(250, 250).0, white);
    assert!(raster.get_pixel(100, 50)[1].abs_diff(160) <= 4);
}

#[tokio::test]
async fn test_out_of_range_fails_at_finer_level() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    match source.get_tile(5, 0, 1, &TileOptions::raster()).await {
        Err(TileSourceError::MissingTile { level: 3, x: 20, y: 0, .. }) => {}
        other => panic!("Expected MissingTile at level 3, got {:?}", other),
    }
    assert_eq!(codec.decode_count(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_sub_tile_failure_aborts_synthesis() {
    let codec = Arc::new(CountingCodec::new().failing_on(FINE, 1, 1));
    let cache = Arc::new(TileCache::new());
    let source = open_shared(sparse_file(), codec.clone(), cache.clone()).await;

    match source.get_tile(0, 0, 1, &TileOptions::raster()).await {
        Err(TileSourceError::TileRead {
            level: 3,
            x: 1,
            y: 1,
            source: CodecError::Decode { .. },
        }) => {}
        other => panic!("Expected TileRead at level 3, got {:?}", other),
    }

    // The failed tile is retried on the next request
    let before = codec.decode_count_for(FINE);
    assert!(source.get_tile(0, 0, 1, &TileOptions::raster()).await.is_err());
    assert!(codec.decode_count_for(FINE) > before);

    // Unaffected tiles still synthesize
    assert!(source.get_tile(1, 1, 1, &TileOptions::raster()).await.is_ok());
}

#[tokio::test]
async fn test_nested_empty_levels_climb_to_stored_level() {
    // 4096px with 256px tiles: levels 0-4, only 0 and 4 stored
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(4096, 4096, 256, [90, 90, 90]))
        .directory(TestDirectory::jpeg(256, 256, 256, [10, 10, 10]))
        .build();
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(file, codec.clone()).await;

    assert_eq!(source.levels(), 5);
    let raster = source
        .get_tile(0, 0, 2, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    assert_eq!(codec.decode_count_for(0), 16);
    assert!(is_uniform(&raster, [90, 90, 90, 255], 4));
}
