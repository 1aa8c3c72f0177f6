//! Optical Character Recognition (OCR)
//!
//! Reads the dense text off a label photo and hands it to the heuristic
//! field extractor. The recognizer is pluggable: a vision endpoint asked only
//! to transcribe, or any local engine implementing [`TextRecognizer`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use labelscan_core::{ExtractionError, ExtractionResult, Extractor};

use crate::heuristics;
use crate::text_clean::{clean_block, has_readable_text};
use crate::vision::{describe_image, provider_client, VisionProvider};

const TRANSCRIBE_PROMPT: &str = "Transcribe every piece of text visible on this product label, \
    line by line, exactly as printed. Output only the text, with no commentary.";

/// Turns image bytes into raw text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String, ExtractionError>;
}

/// Plain transcription through a vision LLM.
pub struct VisionOcr {
    client: Client,
    provider: VisionProvider,
}

impl VisionOcr {
    pub fn new(provider: VisionProvider, timeout: Duration) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: provider_client(timeout)?,
            provider,
        })
    }
}

#[async_trait]
impl TextRecognizer for VisionOcr {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String, ExtractionError> {
        info!("Running OCR via {} on {} bytes", self.provider.name(), image.len());
        describe_image(&self.client, &self.provider, image, mime_type, TRANSCRIBE_PROMPT).await
    }
}

/// Extraction adapter: OCR first, then heuristic field parsing.
pub struct OcrExtractor {
    recognizer: Arc<dyn TextRecognizer>,
}

impl OcrExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::InvalidImage("empty image".into()));
        }
        let raw = self.recognizer.recognize(image, mime_type).await?;
        let text = clean_block(&raw);
        if !has_readable_text(&text) {
            debug!(recognizer = self.recognizer.name(), "OCR found no readable text");
            return Err(ExtractionError::NoText);
        }
        Ok(heuristics::extract_from_text(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelscan_core::FieldName;

    struct FixedText(&'static str);

    #[async_trait]
    impl TextRecognizer for FixedText {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(&self, _: &[u8], _: &str) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_ocr_then_heuristics() {
        let extractor = OcrExtractor::new(Arc::new(FixedText(
            "NIVEA\n  Soft   Moisturising Cream \n\nBest before: 05/2027",
        )));
        let result = extractor.extract(b"jpeg", "image/jpeg").await.unwrap();
        assert_eq!(result.text(FieldName::Brand), Some("NIVEA"));
        assert_eq!(result.text(FieldName::ProductName), Some("Soft Moisturising Cream"));
        assert_eq!(result.text(FieldName::ExpiryDate), Some("05/2027"));
    }

    #[tokio::test]
    async fn test_short_text_is_no_text() {
        let extractor = OcrExtractor::new(Arc::new(FixedText("~~\nab")));
        assert_eq!(
            extractor.extract(b"jpeg", "image/jpeg").await,
            Err(ExtractionError::NoText)
        );
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let extractor = OcrExtractor::new(Arc::new(FixedText("unused")));
        assert!(matches!(
            extractor.extract(b"", "image/jpeg").await,
            Err(ExtractionError::InvalidImage(_))
        ));
    }
}
