pub mod error;
pub mod traits;
pub mod types;

pub use error::{CaptureError, ExtractionError, ScanError, TransportError};
pub use traits::{Extractor, HistorySink, ProgressTx, ScanTransport};
pub use types::{
    CapturedImage, ExtractionResult, FieldName, FieldValue, ImageHandle, MergedRecord,
    ProcessingStage, ScanResponse, SessionId, SlotLabel,
};
