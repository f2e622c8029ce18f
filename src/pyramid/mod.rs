//! Pyramid construction from directory records.
//!
//! A file's directories are normalized into a dense array indexed by zoom
//! level, where level 0 is the coarsest (the whole image fits in one tile)
//! and `levels - 1` is the finest stored resolution. Levels the file does
//! not store stay empty and are synthesized on request.
//!
//! ```text
//! records ──► drop untiled ──► sort by (tile area, level) ──► reference = last
//!                                                              │
//!        dense slots [0..=max level] ◄── keep matching tile size ┘
//!        (later records win a shared level)
//! ```

mod directory;

pub use directory::{level_for, Directory, PixelInfo, TileEncoding, TileStore};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{OpenError, TiffError};

/// Dense zoom-level view over a file's usable directories.
///
/// Immutable once built; shared by reference between concurrent requests.
#[derive(Debug, Clone)]
pub struct Pyramid {
    directories: Vec<Option<Arc<Directory>>>,
    reference: Arc<Directory>,
}

impl Pyramid {
    /// Build a pyramid from directory records in file order.
    ///
    /// Failed records are skipped; the last failure is kept so that an
    /// unusable file reports why its final candidate was rejected.
    ///
    /// # Errors
    /// - `NoUsableDirectories` if no tiled directory survives filtering
    pub fn build<I>(records: I) -> Result<Self, OpenError>
    where
        I: IntoIterator<Item = Result<Directory, TiffError>>,
    {
        let mut last_error = None;
        let mut candidates: Vec<(u32, Directory)> = Vec::new();

        for record in records {
            match record {
                Ok(directory) => match directory.level() {
                    Some(level) => candidates.push((level, directory)),
                    None => debug!(index = directory.index, "Skipping untiled directory"),
                },
                Err(err) => {
                    debug!(error = %err, "Skipping unreadable directory");
                    last_error = Some(err);
                }
            }
        }

        // Stable: equal keys keep file order, so later directories win below.
        candidates.sort_by_key(|(level, directory)| {
            (
                directory.tile_width as u64 * directory.tile_height as u64,
                *level,
            )
        });

        let Some((_, reference)) = candidates.last() else {
            warn!("No usable tiled directories");
            return Err(OpenError::NoUsableDirectories { last_error });
        };
        let tile_size = (reference.tile_width, reference.tile_height);

        let candidates: Vec<(u32, Arc<Directory>)> = candidates
            .into_iter()
            .filter(|(_, directory)| {
                let matches = (directory.tile_width, directory.tile_height) == tile_size;
                if !matches {
                    debug!(
                        index = directory.index,
                        tile_width = directory.tile_width,
                        tile_height = directory.tile_height,
                        "Skipping directory with mismatched tile size"
                    );
                }
                matches
            })
            .map(|(level, directory)| (level, Arc::new(directory)))
            .collect();

        // The reference sorts last and shares its tile size with every survivor,
        // so it holds the highest level and wins that slot.
        let (top, reference) = match candidates.last() {
            Some((level, directory)) => (*level, Arc::clone(directory)),
            None => return Err(OpenError::NoUsableDirectories { last_error }),
        };

        let mut directories = vec![None; top as usize + 1];
        for (level, directory) in candidates {
            directories[level as usize] = Some(directory);
        }

        debug!(
            levels = directories.len(),
            populated = directories.iter().filter(|d| d.is_some()).count(),
            width = reference.image_width,
            height = reference.image_height,
            "Built pyramid"
        );

        Ok(Self {
            directories,
            reference,
        })
    }

    /// Number of zoom levels, including empty ones.
    pub fn levels(&self) -> u32 {
        self.directories.len() as u32
    }

    /// Directory stored at `level`, if any.
    pub fn directory(&self, level: u32) -> Option<&Arc<Directory>> {
        self.directories.get(level as usize).and_then(Option::as_ref)
    }

    pub fn is_populated(&self, level: u32) -> bool {
        self.directory(level).is_some()
    }

    /// The finest directory; defines image size and tile size.
    pub fn reference(&self) -> &Arc<Directory> {
        &self.reference
    }

    /// `(tile_width, tile_height)` shared by every level.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.reference.tile_width, self.reference.tile_height)
    }

    /// Full-resolution image size `(size_x, size_y)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.reference.image_width, self.reference.image_height)
    }

    /// Image extent at `level`.
    ///
    /// Stored levels report their own size; empty levels are derived from the
    /// reference by halving per level, rounding up.
    pub fn level_dimensions(&self, level: u32) -> (u32, u32) {
        if let Some(directory) = self.directory(level) {
            return (directory.image_width, directory.image_height);
        }
        let steps = self.levels().saturating_sub(1).saturating_sub(level);
        let scale = 2f64.powi(steps as i32);
        let (size_x, size_y) = self.dimensions();
        (
            (size_x as f64 / scale).ceil() as u32,
            (size_y as f64 / scale).ceil() as u32,
        )
    }

    /// Stored levels in ascending order.
    pub fn populated_levels(&self) -> impl Iterator<Item = (u32, &Arc<Directory>)> {
        self.directories
            .iter()
            .enumerate()
            .filter_map(|(level, directory)| directory.as_ref().map(|d| (level as u32, d)))
    }

    /// The nearest stored level at or above `level`, after clamping into range.
    ///
    /// Never returns a coarser level than asked for.
    pub fn preferred_level(&self, level: u32) -> u32 {
        let top = self.levels() - 1;
        let mut level = level.min(top);
        while level < top && !self.is_populated(level) {
            level += 1;
        }
        level
    }
}
