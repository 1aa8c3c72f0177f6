//! Offline extractor for local runs and tests.
//!
//! Images registered with [`MockExtractor::respond`] get their scripted
//! outcome. Anything else is treated as UTF-8 label text and run through the
//! heuristics, so a plain `.txt` file stands in for a photo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use labelscan_core::{ExtractionError, ExtractionResult, Extractor};

use crate::heuristics;
use crate::text_clean::{clean_block, has_readable_text};

#[derive(Default)]
pub struct MockExtractor {
    scripted: HashMap<Vec<u8>, Result<ExtractionResult, ExtractionError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        image: impl Into<Vec<u8>>,
        outcome: Result<ExtractionResult, ExtractionError>,
    ) -> Self {
        self.scripted.insert(image.into(), outcome);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(
        &self,
        image: &[u8],
        _mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(outcome) = self.scripted.get(image) {
            return outcome.clone();
        }
        let text = std::str::from_utf8(image)
            .map_err(|_| ExtractionError::InvalidImage("not UTF-8 label text".into()))?;
        let text = clean_block(text);
        if !has_readable_text(&text) {
            return Err(ExtractionError::NoText);
        }
        Ok(heuristics::extract_from_text(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelscan_core::FieldName;

    #[tokio::test]
    async fn test_scripted_outcome() {
        let mock = MockExtractor::new().respond(b"a".to_vec(), Err(ExtractionError::NoText));
        assert_eq!(mock.extract(b"a", "image/jpeg").await, Err(ExtractionError::NoText));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_text_bytes_fall_through_to_heuristics() {
        let mock = MockExtractor::new();
        let result = mock
            .extract(b"COSRX\nSnail Mucin Essence\nEXP 01/2027", "text/plain")
            .await
            .unwrap();
        assert_eq!(result.text(FieldName::Brand), Some("COSRX"));
        assert_eq!(result.text(FieldName::ExpiryDate), Some("01/2027"));
    }

    #[tokio::test]
    async fn test_binary_bytes_are_invalid() {
        let mock = MockExtractor::new();
        assert!(matches!(
            mock.extract(&[0xff, 0xfe, 0x00], "image/jpeg").await,
            Err(ExtractionError::InvalidImage(_))
        ));
    }
}
