//! Vendor metadata carried in the `ImageDescription` tag.
//!
//! Two layouts are understood:
//!
//! - **Aperio**: a header line followed by pipe-separated `key = value`
//!   pairs, e.g. `Aperio Image Library v12\n46920x33600|AppMag = 20|MPP = 0.499`.
//!   `MPP` is in micrometres per pixel.
//! - **Philips**: an XML document of `DataObject`/`Attribute` elements.
//!   Scanned images of type `LABELIMAGE` and `MACROIMAGE` carry base64 image
//!   data, and `DICOM_PIXEL_SPACING` gives millimetres per pixel.

use std::collections::HashMap;

use bytes::Bytes;
use roxmltree::{Document, Node};
use tracing::debug;

const MICROMETRES_PER_MM: f64 = 1000.0;

const PHILIPS_SCANNED_IMAGE: &str = "DPScannedImage";

/// Metadata recovered from one directory's description.
#[derive(Debug, Clone, Default)]
pub struct DescriptionMetadata {
    /// Millimetres per pixel along x
    pub mm_x: Option<f64>,

    /// Millimetres per pixel along y
    pub mm_y: Option<f64>,

    /// Objective magnification
    pub magnification: Option<f64>,

    /// Auxiliary images as `(name, base64 text)`
    pub embedded_images: Vec<(String, Bytes)>,

    /// Aperio key/value pairs
    pub properties: HashMap<String, String>,
}

impl DescriptionMetadata {
    /// Parse whichever vendor layout `description` uses.
    ///
    /// Unrecognized descriptions yield empty metadata.
    pub fn parse(description: &str) -> Self {
        if description.contains("<DataObject") {
            Self::parse_philips(description)
        } else if description.contains("Aperio") {
            Self::parse_aperio(description)
        } else {
            Self::default()
        }
    }

    fn parse_aperio(description: &str) -> Self {
        let mut metadata = Self::default();

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "MPP" => {
                    if let Some(mpp) = value.parse::<f64>().ok().filter(|v| *v > 0.0) {
                        metadata.mm_x = Some(mpp / MICROMETRES_PER_MM);
                        metadata.mm_y = Some(mpp / MICROMETRES_PER_MM);
                    }
                }
                "AppMag" => {
                    metadata.magnification = value.parse::<f64>().ok().filter(|v| *v > 0.0);
                }
                _ => {}
            }

            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }

    fn parse_philips(description: &str) -> Self {
        let mut metadata = Self::default();

        let document = match Document::parse(description.trim_start()) {
            Ok(document) => document,
            Err(err) => {
                debug!(error = %err, "Ignoring malformed Philips description");
                return metadata;
            }
        };

        let scanned_images = document.descendants().filter(|node| {
            node.has_tag_name("DataObject")
                && node.attribute("ObjectType") == Some(PHILIPS_SCANNED_IMAGE)
        });
        for object in scanned_images {
            let name = match attribute_text(object, "PIM_DP_IMAGE_TYPE") {
                Some("LABELIMAGE") => "label",
                Some("MACROIMAGE") => "macro",
                _ => continue,
            };
            if let Some(data) = attribute_text(object, "PIM_DP_IMAGE_DATA").filter(|d| !d.is_empty()) {
                metadata
                    .embedded_images
                    .push((name.to_string(), Bytes::copy_from_slice(data.as_bytes())));
            }
        }

        let spacing = document
            .descendants()
            .find(|node| is_attribute(node, "DICOM_PIXEL_SPACING"))
            .and_then(|node| node.text());
        if let Some(spacing) = spacing {
            // Values are quoted, row spacing first: "0.000227" "0.000227"
            let values: Vec<f64> = spacing
                .split_whitespace()
                .filter_map(|v| v.trim_matches('"').parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .collect();
            if let [mm_y, mm_x, ..] = values.as_slice() {
                metadata.mm_x = Some(*mm_x);
                metadata.mm_y = Some(*mm_y);
            }
        }

        metadata
    }
}

fn is_attribute(node: &Node<'_, '_>, name: &str) -> bool {
    node.has_tag_name("Attribute") && node.attribute("Name") == Some(name)
}

/// Trimmed text of the `<Attribute Name="name">` child of `object`.
fn attribute_text<'a>(object: Node<'a, '_>, name: &str) -> Option<&'a str> {
    object
        .children()
        .find(|child| is_attribute(child, name))
        .and_then(|child| child.text())
        .map(str::trim)
}
