//! Temp storage for uploads in flight
//!
//! Every upload is written to its own file in the upload directory before it
//! is validated and parsed. The file is owned by a [`StagedUpload`] guard:
//! the normal paths call [`StagedUpload::release`], and if the guard is
//! dropped without that (request future cancelled on client disconnect, size
//! limit exceeded mid-stream, panic) `Drop` removes the file instead. Either
//! way the file is removed exactly once.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Staging errors
#[derive(Debug, Error)]
pub enum StagingError {
    /// Upload exceeded the configured byte limit
    #[error("File too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },

    /// Client stream failed before the upload was complete
    #[error("Upload interrupted: {0}")]
    Interrupted(String),

    /// Filesystem failure in the upload directory
    #[error("Staging I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Allocates request-scoped temp files under one upload directory
#[derive(Debug)]
pub struct TempStorage {
    dir: PathBuf,
    max_bytes: u64,
    counter: AtomicU64,
}

impl TempStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// `<field>-<unix millis>-<counter>-<random>`
    fn next_file_name(&self, field_name: &str) -> String {
        let field: String = field_name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .take(32)
            .collect();
        let field = if field.is_empty() { "upload".to_string() } else { field };

        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);

        format!("{}-{}-{}-{:09}", field, millis, seq, suffix)
    }

    /// Create an empty staged file; the upload directory is created on first use
    pub async fn begin(&self, field_name: &str) -> Result<StagedUpload, StagingError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(self.next_file_name(field_name));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "Staging upload");

        Ok(StagedUpload {
            path,
            file: Some(file),
            bytes_written: 0,
            limit: self.max_bytes,
            released: false,
        })
    }

    /// Stage an in-memory upload in one step
    pub async fn stage(&self, bytes: &[u8], field_name: &str) -> Result<StagedUpload, StagingError> {
        let mut staged = self.begin(field_name).await?;
        staged.append(bytes).await?;
        staged.finish().await?;
        Ok(staged)
    }

    /// Stage a chunked body (e.g. a multipart field), enforcing the byte limit as chunks arrive
    pub async fn stage_stream<S, E>(&self, field_name: &str, mut body: S) -> Result<StagedUpload, StagingError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let mut staged = self.begin(field_name).await?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StagingError::Interrupted(e.to_string()))?;
            staged.append(&chunk).await?;
        }

        staged.finish().await?;
        Ok(staged)
    }

    /// Release a staged upload (same as [`StagedUpload::release`])
    pub async fn release(&self, staged: StagedUpload) -> io::Result<()> {
        staged.release().await
    }

    /// Remove files left behind by a previous process
    ///
    /// Staged files never outlive a request, so anything present at startup
    /// is an orphan from a crash.
    pub async fn sweep_stale(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.dir).await?;

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::warn!(removed, dir = %self.dir.display(), "Removed stale staged uploads");
        }
        Ok(removed)
    }
}

/// Guard for one staged temp file
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
    limit: u64,
    released: bool,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_written == 0
    }

    /// Append a chunk; fails with `TooLarge` before writing past the limit
    pub async fn append(&mut self, chunk: &[u8]) -> Result<(), StagingError> {
        let new_len = self.bytes_written + chunk.len() as u64;
        if new_len > self.limit {
            return Err(StagingError::TooLarge { limit: self.limit });
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staged file already finished"))?;
        file.write_all(chunk).await?;
        self.bytes_written = new_len;
        Ok(())
    }

    /// Flush and close the write handle
    pub async fn finish(&mut self) -> Result<(), StagingError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Remove the temp file
    ///
    /// A file that is already gone counts as released.
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        self.file.take();

        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Released staged upload");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        self.file.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed unreleased staged upload");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}
