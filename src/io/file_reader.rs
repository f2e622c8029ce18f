use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task;
use tracing::debug;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// Range reader backed by a file on local disk.
///
/// Reads are positional and run on the blocking pool, so concurrent tile
/// reads share one handle without waiting on each other.
pub struct LocalFileReader {
    file: Arc<File>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` for range reads.
    ///
    /// # Errors
    /// - `NotFound` if the path does not exist
    /// - `File` for any other filesystem failure
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::File(format!("{}: {}", identifier, e)),
        })?;

        let size = file
            .metadata()
            .await
            .map_err(|e| IoError::File(format!("{}: {}", identifier, e)))?
            .len();

        debug!(path = %identifier, size, "Opened local file");

        Ok(Self {
            file: Arc::new(file.into_std().await),
            size,
            identifier,
        })
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;

        let file = Arc::clone(&self.file);
        let read = task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_at(&file, &mut buf, offset).map(|()| Bytes::from(buf))
        })
        .await
        .map_err(|e| IoError::File(format!("{}: {}", self.identifier, e)))?;

        read.map_err(|e| IoError::File(format!("{}: {}", self.identifier, e)))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
