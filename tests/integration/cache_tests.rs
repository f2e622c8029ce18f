//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Concurrent requests for one tile decode each sub-tile once
//! - Sources sharing a cache never see each other's tiles
//! - Dropping a source evicts its entries
//! - A small cache still produces correct tiles

use std::sync::Arc;
use std::time::Duration;

use sparse_pyramid::tile::{TileCache, TileOptions};

use super::test_utils::{
    is_uniform, open_shared, open_with_codec, sparse_file, CountingCodec, TestDirectory,
    TiffFileBuilder,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_decode_once() {
    let codec = Arc::new(CountingCodec::new().with_delay(Duration::from_millis(20)));
    let source = Arc::new(open_with_codec(sparse_file(), codec.clone()).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let source = Arc::clone(&source);
        handles.push(tokio::spawn(async move {
            source.get_tile(0, 0, 1, &TileOptions::jpeg(80)).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(codec.decode_count(), 16);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_mixed_levels_decode_each_tile_once() {
    for _ in 0..10 {
        let codec = Arc::new(CountingCodec::new().with_delay(Duration::from_millis(5)));
        let source = Arc::new(open_with_codec(sparse_file(), codec.clone()).await);

        // Level 1 (0,0) and the four level 2 tiles under it share one 4x4 block
        let requests = [(0, 0, 1), (0, 0, 2), (1, 0, 2), (0, 1, 2), (1, 1, 2)];
        let mut handles = Vec::new();
        for i in 0..16 {
            let source = Arc::clone(&source);
            let (x, y, z) = requests[i % requests.len()];
            handles.push(tokio::spawn(async move {
                source.get_tile(x, y, z, &TileOptions::raster()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(codec.decode_count(), 16);
    }
}

#[tokio::test]
async fn test_overlapping_synthesis_shares_sub_tiles() {
    let codec = Arc::new(CountingCodec::new().with_delay(Duration::from_millis(20)));
    let source = Arc::new(open_with_codec(sparse_file(), codec.clone()).await);

    // Level 1 (0,0) and level 2 (0,0) both need level 3 (0..2, 0..2)
    let options = TileOptions::raster();
    let (coarse, fine) = tokio::join!(
        source.get_tile(0, 0, 1, &options),
        source.get_tile(0, 0, 2, &options),
    );

    assert!(coarse.is_ok());
    assert!(fine.is_ok());
    assert_eq!(codec.decode_count(), 16);
    assert!(source.cache().stats().coalesced >= 4);
}

#[tokio::test]
async fn test_sources_on_shared_cache_do_not_collide() {
    let cache = Arc::new(TileCache::new());
    let red = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(256, 256, 256, [220, 20, 20]))
        .build();
    let green = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(256, 256, 256, [20, 220, 20]))
        .build();

    let red = open_shared(red, Arc::new(CountingCodec::new()), cache.clone()).await;
    let green = open_shared(green, Arc::new(CountingCodec::new()), cache.clone()).await;

    let red_tile = red.get_tile(0, 0, 0, &TileOptions::raster()).await.unwrap();
    let green_tile = green.get_tile(0, 0, 0, &TileOptions::raster()).await.unwrap();

    assert!(is_uniform(&red_tile.to_raster().unwrap(), [220, 20, 20, 255], 4));
    assert!(is_uniform(&green_tile.to_raster().unwrap(), [20, 220, 20, 255], 4));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_dropping_source_evicts_entries() {
    let cache = Arc::new(TileCache::new());
    let keep = open_shared(sparse_file(), Arc::new(CountingCodec::new()), cache.clone()).await;
    let dropped = open_shared(sparse_file(), Arc::new(CountingCodec::new()), cache.clone()).await;

    keep.get_tile(0, 0, 0, &TileOptions::raster()).await.unwrap();
    dropped.get_tile(0, 0, 2, &TileOptions::raster()).await.unwrap();
    assert_eq!(cache.len(), 1 + 5);

    drop(dropped);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size(), 256 * 256 * 4);
}

#[tokio::test]
async fn test_small_cache_still_correct() {
    // Room for only two rasters
    let cache = Arc::new(TileCache::with_capacity_and_entries(usize::MAX, 2));
    let codec = Arc::new(CountingCodec::new());
    let source = open_shared(sparse_file(), codec.clone(), cache.clone()).await;

    let raster = source
        .get_tile(0, 0, 1, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();

    assert!(is_uniform(&raster, [200, 60, 40, 255], 4));
    assert!(cache.len() <= 2);
    assert_eq!(codec.decode_count(), 16);
}

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let cache = Arc::new(TileCache::new());
    let source = open_shared(sparse_file(), Arc::new(CountingCodec::new()), cache.clone()).await;

    source.get_tile(0, 0, 3, &TileOptions::raster()).await.unwrap();
    source.get_tile(0, 0, 3, &TileOptions::raster()).await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.size, 256 * 256 * 4);
}
