//! JPEG stream helpers for TIFF tiles.
//!
//! Tiled TIFFs may store *abbreviated* JPEG streams: each tile holds only its
//! frame and scan, while the quantization (DQT) and Huffman (DHT) tables are
//! stored once in the directory's `JPEGTables` tag. Before decoding, the two
//! are spliced into one complete stream:
//!
//! ```text
//! tables: SOI DQT DHT ... EOI      tile: SOI SOF SOS <scan> EOI
//! merged: SOI DQT DHT ...  SOF SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DHT: u8 = 0xC4;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

/// Check if JPEG data is an abbreviated stream (reaches SOS with no tables).
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        match data[pos + 1] {
            DQT | DHT => return false,
            SOS => return true,
            // Fill bytes and standalone markers carry no length
            0xFF | 0x00 | 0x01 | 0xD0..=0xD9 => pos += 2,
            _ if pos + 3 < data.len() => {
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
            _ => pos += 2,
        }
    }

    false
}

/// Check if JPEG data carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    data.len() >= 4
        && data[..2] == SOI
        && data[2..].windows(2).any(|pair| pair == [0xFF, DQT])
}

/// Splice `tables` in front of an abbreviated tile stream.
///
/// The trailing EOI of the tables and the leading SOI of the tile are
/// dropped. Empty tables return the tile unchanged.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile_data.strip_prefix(&SOI).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Produce a decodable stream for a stored tile.
///
/// Complete streams pass through; abbreviated streams are merged with the
/// directory's tables when there are any.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if !is_complete_stream(tile_data) && is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    }
}
