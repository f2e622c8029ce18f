//! File format integration tests.
//!
//! Tests verify:
//! - Byte orders and BigTIFF
//! - Directory filtering (untiled, unsupported, mismatched tile size)
//! - Open failures carry the reason
//! - Pixel size and magnification from descriptions and resolution tags
//! - Associated images embedded in descriptions

use std::io::Write;
use std::sync::Arc;

use base64::Engine;

use sparse_pyramid::error::{IoError, OpenError, TiffError};
use sparse_pyramid::format::tiff::TiffDirectoryReader;
use sparse_pyramid::io::MemoryReader;
use sparse_pyramid::tile::{TileCache, TileOptions, TileSource};

use super::test_utils::{
    is_uniform, open_with_codec, solid_png, sparse_file, CountingCodec, TestDirectory,
    TiffFileBuilder, COMPRESSION_LZW, UNIT_CENTIMETRE,
};

async fn open(data: Vec<u8>) -> Result<TileSource, OpenError> {
    TileSource::open_with_reader(
        MemoryReader::new(data, "mem://format.tiff"),
        Arc::new(TileCache::new()),
    )
    .await
}

// =============================================================================
// Layout variants
// =============================================================================

#[tokio::test]
async fn test_big_endian_file() {
    let file = TiffFileBuilder::new()
        .big_endian()
        .directory(TestDirectory::jpeg(512, 512, 256, [120, 30, 200]))
        .build();
    let source = open(file).await.unwrap();

    assert_eq!(source.dimensions(), (512, 512));
    let raster = source
        .get_tile(1, 0, 1, &TileOptions::raster())
        .await
        .unwrap()
        .to_raster()
        .unwrap();
    assert!(is_uniform(&raster, [120, 30, 200, 255], 4));
}

#[tokio::test]
async fn test_bigtiff_file() {
    let file = TiffFileBuilder::new()
        .bigtiff()
        .directory(TestDirectory::jpeg(1024, 1024, 256, [10, 200, 10]))
        .directory(TestDirectory::jpeg(256, 256, 256, [10, 200, 10]))
        .build();
    let source = open(file).await.unwrap();

    assert_eq!(source.levels(), 3);
    assert!(source.pyramid().is_populated(0));
    assert!(!source.pyramid().is_populated(1));
    assert!(source.get_tile(3, 3, 2, &TileOptions::raster()).await.is_ok());
}

#[tokio::test]
async fn test_open_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&sparse_file()).unwrap();
    file.flush().unwrap();

    let source = TileSource::open(file.path(), Arc::new(TileCache::new()))
        .await
        .unwrap();

    assert_eq!(source.levels(), 4);
    assert!(source.get_tile(0, 0, 1, &TileOptions::png()).await.is_ok());
}

// =============================================================================
// Directory filtering
// =============================================================================

#[tokio::test]
async fn test_unusable_directories_skipped() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(2048, 2048, 256, [1, 1, 1]))
        .directory(TestDirectory::untiled(640, 480))
        .directory(TestDirectory::jpeg(1024, 1024, 256, [2, 2, 2]).with_compression(COMPRESSION_LZW))
        .directory(TestDirectory::jpeg(512, 512, 128, [3, 3, 3]))
        .directory(TestDirectory::jpeg(512, 512, 256, [4, 4, 4]))
        .build();
    let source = open(file).await.unwrap();

    let populated: Vec<(u32, usize)> = source
        .pyramid()
        .populated_levels()
        .map(|(level, directory)| (level, directory.index))
        .collect();
    assert_eq!(populated, vec![(1, 4), (3, 0)]);
}

#[tokio::test]
async fn test_directory_records_keep_errors() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(256, 256, 256, [1, 1, 1]).with_compression(COMPRESSION_LZW))
        .directory(TestDirectory::untiled(100, 100))
        .directory(TestDirectory::jpeg(256, 256, 256, [1, 1, 1]))
        .build();

    let reader = TiffDirectoryReader::open(Arc::new(MemoryReader::new(file, "mem://records")))
        .await
        .unwrap();
    let records = reader.read_directories().await;

    assert_eq!(records.len(), 3);
    assert!(matches!(records[0], Err(TiffError::UnsupportedCompression(_))));
    let untiled = records[1].as_ref().unwrap();
    assert!(!untiled.is_tiled());
    assert_eq!(records[2].as_ref().unwrap().index, 2);
}

#[tokio::test]
async fn test_no_usable_directories_reports_last_error() {
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::untiled(800, 600))
        .directory(TestDirectory::jpeg(512, 512, 256, [0, 0, 0]).with_compression(COMPRESSION_LZW))
        .build();

    let err = open(file).await.unwrap_err();
    match err {
        OpenError::NoUsableDirectories {
            last_error: Some(TiffError::UnsupportedCompression(ref name)),
        } => assert_eq!(name, "LZW"),
        ref other => panic!("Expected NoUsableDirectories, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("didn't meet requirements"));
    assert!(message.contains("LZW"));
}

#[tokio::test]
async fn test_not_a_tiff() {
    match open(b"GIF89a not a tiff".to_vec()).await {
        Err(OpenError::Tiff(TiffError::InvalidMagic(_))) => {}
        other => panic!("Expected InvalidMagic, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.tiff");

    match TileSource::open(&path, Arc::new(TileCache::new())).await {
        Err(OpenError::Io(IoError::NotFound(_))) => {}
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_aperio_description() {
    let description =
        "Aperio Image Library v12.0.15\n2048x2048 [0,0 2048x2048] (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.4990";
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(2048, 2048, 256, [5, 5, 5]).with_description(description))
        .build();
    let source = open(file).await.unwrap();

    let magnification = source.native_magnification();
    assert_eq!(magnification.magnification, Some(20.0));
    assert!((magnification.mm_x.unwrap() - 0.000499).abs() < 1e-12);
}

#[tokio::test]
async fn test_resolution_tags() {
    // 40000 pixels per centimetre = 0.00025 mm per pixel
    let file = TiffFileBuilder::new()
        .directory(
            TestDirectory::jpeg(512, 512, 256, [5, 5, 5]).with_resolution(40_000, UNIT_CENTIMETRE),
        )
        .build();
    let source = open(file).await.unwrap();

    let magnification = source.native_magnification();
    assert!((magnification.mm_x.unwrap() - 0.00025).abs() < 1e-12);
    assert!((magnification.magnification.unwrap() - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_no_pixel_size() {
    let source = open(sparse_file()).await.unwrap();
    let magnification = source.native_magnification();
    assert_eq!(magnification.magnification, None);
    assert_eq!(magnification.mm_x, None);
}

fn philips_description(label: &[u8], macro_image: &[u8]) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<DataObject ObjectType="DPUfsImport">
  <Attribute Name="PIM_DP_SCANNED_IMAGES" Group="0x301D" Element="0x1003" PMSVR="IDataObjectArray">
    <Array>
      <DataObject ObjectType="DPScannedImage">
        <Attribute Name="PIM_DP_IMAGE_TYPE" Group="0x301D" Element="0x1004" PMSVR="IString">MACROIMAGE</Attribute>
        <Attribute Name="PIM_DP_IMAGE_DATA" Group="0x301D" Element="0x1005" PMSVR="IString">{}</Attribute>
      </DataObject>
      <DataObject ObjectType="DPScannedImage">
        <Attribute Name="PIM_DP_IMAGE_TYPE" Group="0x301D" Element="0x1004" PMSVR="IString">LABELIMAGE</Attribute>
        <Attribute Name="PIM_DP_IMAGE_DATA" Group="0x301D" Element="0x1005" PMSVR="IString">{}</Attribute>
      </DataObject>
      <DataObject ObjectType="DPScannedImage">
        <Attribute Name="PIM_DP_IMAGE_TYPE" Group="0x301D" Element="0x1004" PMSVR="IString">WSI</Attribute>
        <Attribute Name="DICOM_PIXEL_SPACING" Group="0x0028" Element="0x0030" PMSVR="IDoubleArray">"0.00025" "0.00025"</Attribute>
      </DataObject>
    </Array>
  </Attribute>
</DataObject>"#,
        engine.encode(macro_image),
        engine.encode(label),
    )
}

#[tokio::test]
async fn test_philips_associated_images() {
    let description = philips_description(
        &solid_png(40, 20, [255, 0, 0, 255]),
        &solid_png(60, 30, [0, 0, 255, 255]),
    );
    let file = TiffFileBuilder::new()
        .directory(TestDirectory::jpeg(1024, 1024, 256, [5, 5, 5]).with_description(description))
        .directory(TestDirectory::jpeg(256, 256, 256, [5, 5, 5]))
        .build();
    let source = open_with_codec(file, Arc::new(CountingCodec::new())).await;

    assert_eq!(source.associated_image_names(), vec!["label", "macro"]);

    let label = source.associated_image("label").unwrap().unwrap();
    assert_eq!(label.dimensions(), (40, 20));
    assert!(is_uniform(&label, [255, 0, 0, 255], 0));

    let macro_image = source.associated_image("macro").unwrap().unwrap();
    assert_eq!(macro_image.dimensions(), (60, 30));

    assert!(source.associated_image("thumbnail").unwrap().is_none());

    let magnification = source.native_magnification();
    assert_eq!(magnification.mm_x, Some(0.00025));
    assert!((magnification.magnification.unwrap() - 40.0).abs() < 1e-9);
}
