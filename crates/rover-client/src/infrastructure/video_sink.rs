//! Video sinks: where the handed-off stream ends up.
//!
//! The client does not decode video.  It either records the raw transport
//! bytes to a file for an external player, or counts and discards them so
//! the stream link stays drained.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::application::stream_binder::{SinkError, StreamHandoff, VideoSink};
use crate::application::wire_link::WireLink;

// ── DiscardSink ───────────────────────────────────────────────────────────────

/// Counts stream bytes and throws them away.
#[derive(Default)]
pub struct DiscardSink {
    link: Option<Box<dyn WireLink>>,
    rover_id: String,
    bytes: u64,
    chunks: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks
    }
}

#[async_trait]
impl VideoSink for DiscardSink {
    async fn attach(&mut self, handoff: StreamHandoff) -> Result<(), SinkError> {
        self.rover_id = handoff.rover_id;
        self.link = Some(handoff.link);
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        if self.link.is_none() {
            return Err(SinkError::Detached);
        }
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut link) = self.link.take() {
            link.close();
            info!(
                "stream of rover '{}' ended: {} bytes in {} chunks discarded",
                self.rover_id, self.bytes, self.chunks
            );
        }
        Ok(())
    }
}

// ── FileRecorderSink ──────────────────────────────────────────────────────────

/// Appends the raw stream to a file.
///
/// The file is created (truncating any previous recording) on `attach`.
pub struct FileRecorderSink {
    path: PathBuf,
    file: Option<File>,
    link: Option<Box<dyn WireLink>>,
    bytes: u64,
}

impl FileRecorderSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            link: None,
            bytes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

#[async_trait]
impl VideoSink for FileRecorderSink {
    async fn attach(&mut self, handoff: StreamHandoff) -> Result<(), SinkError> {
        let file = File::create(&self.path).await?;
        info!(
            "recording stream of rover '{}' to {}",
            handoff.rover_id,
            self.path.display()
        );
        self.file = Some(file);
        self.link = Some(handoff.link);
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::Detached)?;
        file.write_all(chunk).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            info!("recorded {} bytes to {}", self.bytes, self.path.display());
        }
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
