//! Per-image label understanding: vision LLM extraction, OCR with heuristic
//! field parsing, and an offline mock.

pub mod heuristics;
pub mod mock;
pub mod ocr;
pub mod text_clean;
pub mod vision;

pub use mock::MockExtractor;
pub use ocr::{OcrExtractor, TextRecognizer, VisionOcr};
pub use vision::{
    describe_image, parse_label_reply, provider_client, VisionExtractor, VisionProvider,
    DEFAULT_EXTRACTION_TIMEOUT,
};
