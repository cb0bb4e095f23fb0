//! Transfer engine: pulls a declared-length file body off the connection.
//!
//! The body is written to a uniquely named temporary sibling of the target and
//! renamed over it only once every byte has arrived, so a failed transfer never leaves a
//! truncated target behind. Progress is reported after every chunk.

use crate::action::{ActionEntry, ActionProgress};
use crate::config::TransferConfig;
use crate::error::{Result, SyncError};
use crate::temp_file;
use crate::wire::read_file_len;
use std::path::Path;
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Receives one file body per call.
pub struct Transfer {
    /// Always at least 1
    chunk_size: usize,
}

impl Transfer {
    /// A zero chunk size is raised to one byte.
    pub fn new(config: TransferConfig) -> Self {
        if config.chunk_size == 0 {
            tracing::warn!("Transfer chunk size of 0 requested, using 1 byte chunks");
        }
        Self {
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Buffer length for a body of `size` bytes: one chunk, or less for
    /// small bodies, and never empty.
    fn buffer_len(&self, size: u64) -> usize {
        usize::try_from(size).map_or(self.chunk_size, |s| self.chunk_size.min(s.max(1)))
    }

    /// Read the declared length, then exactly that many bytes, into `dest`.
    ///
    /// The sink sees an unstarted snapshot before any bytes move, one snapshot
    /// per chunk, and a final completed snapshot on success. Returns the number
    /// of bytes received.
    ///
    /// If the local write fails the rest of the body is still drained off the
    /// stream, so the connection stays in step with the server and the error
    /// comes back as [`SyncError::LocalIo`].
    pub async fn receive<R, F>(
        &self,
        reader: &mut R,
        entry: &ActionEntry,
        dest: &Path,
        sink: &mut F,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        F: FnMut(&ActionProgress),
    {
        let size = read_file_len(reader).await?;
        tracing::debug!("Receiving {} ({} bytes)", entry.target, size);

        let mut progress = ActionProgress::new(entry.clone());
        sink(&progress);

        let mut buf = vec![0u8; self.buffer_len(size)];

        let (file, temp_path) = match open_temp(dest).await {
            Ok(opened) => opened,
            Err(e) => {
                discard(reader, size, &mut buf).await?;
                return Err(e);
            }
        };

        let received = self
            .stream_body(reader, size, file, &temp_path, &mut buf, &mut progress, sink)
            .await?;

        // On failure the returned TempPath drops and removes the temp file
        temp_path
            .persist(dest)
            .map_err(|e| SyncError::local_io(dest, e.error))?;

        progress.mark_complete();
        sink(&progress);

        Ok(received)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_body<R, F>(
        &self,
        reader: &mut R,
        size: u64,
        mut file: File,
        temp_path: &Path,
        buf: &mut [u8],
        progress: &mut ActionProgress,
        sink: &mut F,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        F: FnMut(&ActionProgress),
    {
        let mut received = 0u64;

        while received < size {
            let n = (size - received).min(buf.len() as u64) as usize;
            reader
                .read_exact(&mut buf[..n])
                .await
                .map_err(|e| SyncError::connection("reading file body", e))?;

            if let Err(e) = file.write_all(&buf[..n]).await {
                received += n as u64;
                discard(reader, size - received, buf).await?;
                return Err(SyncError::local_io(temp_path, e));
            }

            received += n as u64;
            progress.set_progress(received as f64 / size as f64);
            tracing::trace!("{}: {}/{} bytes", progress.path(), received, size);
            sink(progress);
        }

        file.flush()
            .await
            .map_err(|e| SyncError::local_io(temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| SyncError::local_io(temp_path, e))?;

        Ok(received)
    }
}

impl Default for Transfer {
    fn default() -> Self {
        Self::new(TransferConfig::default())
    }
}

async fn open_temp(dest: &Path) -> Result<(File, TempPath)> {
    // Ensure parent directory exists
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::local_io(parent, e))?;
    }

    let (file, temp_path) =
        temp_file::create_sibling(dest).map_err(|e| SyncError::local_io(dest, e))?;
    Ok((File::from_std(file), temp_path))
}

/// Skip `remaining` body bytes to keep the stream aligned.
async fn discard<R: AsyncRead + Unpin>(reader: &mut R, remaining: u64, buf: &mut [u8]) -> Result<()> {
    let mut left = remaining;
    while left > 0 {
        let n = left.min(buf.len() as u64) as usize;
        reader
            .read_exact(&mut buf[..n])
            .await
            .map_err(|e| SyncError::connection("draining file body", e))?;
        left -= n as u64;
    }
    Ok(())
}
