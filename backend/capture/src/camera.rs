use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use labelscan_core::{CaptureError, ImageHandle, SlotLabel};
use tracing::debug;

/// Camera device seam. One acquisition per call; the orchestrator never
/// calls it concurrently.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn acquire(&self, slot: Option<SlotLabel>) -> Result<ImageHandle, CaptureError>;
}

/// Guess an image MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

/// Headless camera that "shoots" a fixed list of image files in order.
pub struct FileCamera {
    frames: Vec<PathBuf>,
    next: AtomicUsize,
}

impl FileCamera {
    pub fn new(frames: Vec<PathBuf>) -> Self {
        Self {
            frames,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn acquire(&self, slot: Option<SlotLabel>) -> Result<ImageHandle, CaptureError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self
            .frames
            .get(index)
            .ok_or_else(|| CaptureError::Acquisition("no more frames".into()))?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::Acquisition(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), slot = ?slot, bytes = data.len(), "Frame read from file");
        Ok(ImageHandle::new(
            format!("file://{}", path.display()),
            mime_for_path(path),
            Bytes::from(data),
        ))
    }
}
