//! Streaming artifact downloads.
//!
//! Result files can be large page images, so the body is written as it
//! arrives instead of being collected first. Each chunk from the transport is
//! written in slices of at most [`CHUNK_SIZE`] bytes, and the reported size
//! is the number of bytes that actually reached the file.

use crate::error::PipelineError;
use crate::job::ArtifactType;
use crate::pipeline::retry::RetryExecutor;
use crate::transport::{HttpRequest, HttpTransport};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const CHUNK_SIZE: usize = 8192;

/// File extension for an artifact type label; unknown labels get `bin`.
pub fn extension_for(label: &str) -> &'static str {
    match label {
        "image" => "jpg",
        "pdf" => "pdf",
        "docx" => "docx",
        _ => "bin",
    }
}

/// `<dir>/<base>_step<step>_<index>.<ext>`, with `index` starting at 1.
pub fn artifact_path(dir: &Path, base: &str, step: u8, index: usize, kind: ArtifactType) -> PathBuf {
    dir.join(format!(
        "{base}_step{step}_{index}.{}",
        extension_for(kind.as_str())
    ))
}

pub struct ArtifactDownloader {
    transport: Arc<dyn HttpTransport>,
    retry: RetryExecutor,
}

impl ArtifactDownloader {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryExecutor) -> Self {
        Self { transport, retry }
    }

    /// Fetch `request` into `dest`, replacing any existing file, and return
    /// the number of bytes written.
    ///
    /// Obtaining a success response is retried; a failure while writing is
    /// not, since the partial file cannot be resumed.
    pub async fn download(&self, request: &HttpRequest, dest: &Path) -> Result<u64, PipelineError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        let response = self.retry.execute(self.transport.as_ref(), request).await?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| PipelineError::io(dest, e))?;

        let mut written: u64 = 0;
        let mut chunks = response.into_chunks();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for slice in chunk.chunks(CHUNK_SIZE) {
                file.write_all(slice)
                    .await
                    .map_err(|e| PipelineError::io(dest, e))?;
                written += slice.len() as u64;
            }
        }
        file.flush().await.map_err(|e| PipelineError::io(dest, e))?;

        debug!("Saved {} ({} bytes)", dest.display(), written);
        Ok(written)
    }
}
