//! Bounded extraction pool.
//!
//! Images are extracted concurrently, at most `workers` at a time, and the
//! outcomes are returned in upload order once every call has settled. A call
//! that outlives `timeout` is abandoned and reported as a provider failure.

use std::sync::Arc;
use std::time::Duration;

use labelscan_core::{ExtractionError, ExtractionResult, Extractor};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::scan_api::UploadedImage;

pub async fn extract_all(
    extractor: Arc<dyn Extractor>,
    images: Vec<UploadedImage>,
    workers: usize,
    timeout: Duration,
) -> Vec<Result<ExtractionResult, ExtractionError>> {
    let total = images.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();

    for (index, image) in images.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let extractor = Arc::clone(&extractor);
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, Err(pool_error("worker pool closed")));
            };
            debug!(image_index = index, slot = ?image.slot, bytes = image.data.len(), "Extracting image");
            let call = extractor.extract(&image.data, &image.mime_type);
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(image_index = index, timeout_ms = timeout.as_millis() as u64, "Extraction timed out");
                    Err(ExtractionError::Provider {
                        provider: extractor.name().to_string(),
                        message: format!("no result within {}ms", timeout.as_millis()),
                    })
                }
            };
            let outcome = outcome.map(|mut result| {
                result.source_index = index;
                result.slot_label = image.slot;
                result
            });
            (index, outcome)
        });
    }

    // Join barrier: nothing is handed on until every extraction settled.
    let mut settled: Vec<Option<Result<ExtractionResult, ExtractionError>>> =
        (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, outcome)) => settled[index] = Some(outcome),
            Err(e) => error!(error = %e, "Extraction task panicked"),
        }
    }

    settled
        .into_iter()
        .map(|outcome| outcome.unwrap_or_else(|| Err(pool_error("extraction task panicked"))))
        .collect()
}

fn pool_error(message: &str) -> ExtractionError {
    ExtractionError::Provider {
        provider: "pool".into(),
        message: message.into(),
    }
}
