use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ExtractionError, TransportError};
use crate::types::{CapturedImage, ExtractionResult, MergedRecord, ScanResponse, SessionId};

/// Upload progress channel. Values are percentages in `0..=100`.
pub type ProgressTx = mpsc::UnboundedSender<u8>;

/// Black-box OCR/NLP extraction for a single image.
///
/// Implementations must be safe to call concurrently for distinct images.
/// The returned result's `source_index` and `slot_label` are assigned by the
/// caller, which knows the image's position in the batch.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Provider name (e.g., "gemini", "heuristic").
    fn name(&self) -> &str;

    /// Extract label fields, raw text and confidence from encoded image bytes.
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> std::result::Result<ExtractionResult, ExtractionError>;
}

/// Client side of the scan wire contract.
#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Send one frozen batch as a single request. Exactly one outcome is returned.
    async fn upload(
        &self,
        session_id: SessionId,
        batch: &[CapturedImage],
        progress: ProgressTx,
    ) -> std::result::Result<ScanResponse, TransportError>;

    /// Side-channel readiness check. `false` means unreachable.
    async fn check_health(&self) -> bool;
}

/// External store that receives finished records keyed by session.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, session_id: SessionId, record: &MergedRecord) -> Result<()>;
}
