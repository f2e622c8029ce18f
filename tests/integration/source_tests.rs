//! Tile source integration tests.
//!
//! Tests verify:
//! - Stored tiles decode to exactly one tile of pixels
//! - Request validation (level, bounds, synthesis flag)
//! - Output encoding (JPEG, PNG) and edge fill
//! - Uncompressed tiles and empty tiles

use std::sync::Arc;

use sparse_pyramid::error::{CodecError, TileSourceError};
use sparse_pyramid::tile::{EncodedFormat, Synthesis, TileOptions, TileResult};

use super::test_utils::{
    is_uniform, open_with_codec, solid_jpeg, sparse_file, CountingCodec, TestDirectory,
    TiffFileBuilder,
};

// =============================================================================
// Stored levels
// =============================================================================

#[tokio::test]
async fn test_stored_tile_decodes_once() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    let raster = source
        .get_tile(0, 0, 0, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    assert_eq!(raster.dimensions(), (256, 256));
    assert!(is_uniform(&raster, [40, 60, 200, 255], 4));
    assert_eq!(codec.decode_count_for(1), 1);
    assert_eq!(codec.decode_count_for(0), 0);
}

#[tokio::test]
async fn test_synthesis_flag_irrelevant_for_stored_levels() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec).await;

    let tile = source
        .get_tile_with(7, 7, 3, &TileOptions::raster(), Synthesis::Disabled)
        .await
        .unwrap();
    assert!(tile.is_raster());
}

#[tokio::test]
async fn test_jpeg_and_png_output() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    let jpeg = source.get_tile(2, 3, 3, &TileOptions::jpeg(90)).await.unwrap();
    match jpeg {
        TileResult::Encoded {
            ref data,
            format: EncodedFormat::Jpeg,
        } => assert_eq!(&data[..2], &[0xFF, 0xD8]),
        ref other => panic!("Expected JPEG, got {:?}", other),
    }
    assert_eq!(jpeg.to_raster().unwrap().dimensions(), (256, 256));

    let png = source.get_tile(2, 3, 3, &TileOptions::png()).await.unwrap();
    assert!(matches!(
        png,
        TileResult::Encoded {
            format: EncodedFormat::Png,
            ..
        }
    ));

    // Each format is its own cache entry, each decoding the stored tile
    assert_eq!(codec.decode_count(), 2);
}

#[tokio::test]
async fn test_edge_fill_on_stored_edge_tile() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(300, 300, 256, [0, 0, 0]))
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    let red = [255, 0, 0, 255];
    let raster = source
        .get_tile(1, 1, 1, &TileOptions::raster().with_edge(red))
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    // Only the 44x44 corner lies inside the image
    assert!(raster.get_pixel(10, 10)[0] <= 4);
    assert_eq!(raster.get_pixel(44, 10).0, red);
    assert_eq!(raster.get_pixel(10, 44).0, red);
}

#[tokio::test]
async fn test_raw_tiles() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::raw(512, 512, 256, [10, 20, 30]))
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    let raster = source
        .get_tile(1, 1, 1, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();
    assert!(is_uniform(&raster, [10, 20, 30, 255], 0));

    // The synthesized level above is an exact average of uniform tiles
    let top = source
        .get_tile(0, 0, 0, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();
    assert!(is_uniform(&top, [10, 20, 30, 255], 1));
}

#[tokio::test]
async fn test_small_decoded_tile_padded_to_tile_size() {
    // A stored tile smaller than the declared tile size
    let file = TiffFileBuilder::new()
        .directory(
            TestDirectory::jpeg(256, 256, 256, [50, 50, 50]).with_tile(0, solid_jpeg(128, 128, [50, 50, 50])),
        )
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    let raster = source
        .get_tile(0, 0, 0, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    assert_eq!(raster.dimensions(), (256, 256));
    assert_eq!(raster.get_pixel(64, 64)[3], 255);
    assert_eq!(raster.get_pixel(200, 200)[3], 0);
}

// =============================================================================
// Request errors
// =============================================================================

#[tokio::test]
async fn test_invalid_level() {
    let source = open_with_codec(sparse_file(), Arc::new(CountingCodec::new())).await;

    match source.get_tile(0, 0, 4, &TileOptions::raster()).await {
        Err(TileSourceError::InvalidLevel { level: 4, levels: 4 }) => {}
        other => panic!("Expected InvalidLevel, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_tile_on_stored_level() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    match source.get_tile(8, 0, 3, &TileOptions::raster()).await {
        Err(TileSourceError::MissingTile {
            level: 3,
            x: 8,
            y: 0,
            max_x: 7,
            max_y: 7,
        }) => {}
        other => panic!("Expected MissingTile, got {:?}", other),
    }
    assert!(source.get_tile(0, 1, 0, &TileOptions::raster()).await.is_err());
    assert_eq!(codec.decode_count(), 0);
}

#[tokio::test]
async fn test_missing_level_when_synthesis_disabled() {
    let codec = Arc::new(CountingCodec::new());
    let source = open_with_codec(sparse_file(), codec.clone()).await;

    match source
        .get_tile_with(0, 0, 2, &TileOptions::raster(), Synthesis::Disabled)
        .await
    {
        Err(TileSourceError::MissingLevel { level: 2 }) => {}
        other => panic!("Expected MissingLevel, got {:?}", other),
    }
    assert_eq!(codec.decode_count(), 0);

    // The refusal does not leak into an allowed request
    assert!(source.get_tile(0, 0, 2, &TileOptions::raster()).await.is_ok());
}

#[tokio::test]
async fn test_invalid_quality() {
    let source = open_with_codec(sparse_file(), Arc::new(CountingCodec::new())).await;

    match source.get_tile(0, 0, 0, &TileOptions::jpeg(0)).await {
        Err(TileSourceError::InvalidQuality { quality: 0 }) => {}
        other => panic!("Expected InvalidQuality, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_tile_reported() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(512, 512, 256, [1, 2, 3]).with_tile(3, Vec::new()))
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    match source.get_tile(1, 1, 1, &TileOptions::raster()).await {
        Err(TileSourceError::TileRead {
            source: CodecError::EmptyTile { x: 1, y: 1 },
            ..
        }) => {}
        other => panic!("Expected EmptyTile, got {:?}", other),
    }
    assert!(source.get_tile(0, 0, 1, &TileOptions::raster()).await.is_ok());
}

#[tokio::test]
async fn test_corrupt_tile_reported() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(256, 256, 256, [1, 2, 3]).with_tile(0, vec![0xAB; 64]))
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    match source.get_tile(0, 0, 0, &TileOptions::raster()).await {
        Err(TileSourceError::TileRead {
            level: 0,
            source: CodecError::Decode { .. },
            ..
        }) => {}
        other => panic!("Expected Decode failure, got {:?}", other),
    }
}
