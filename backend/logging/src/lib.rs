//! Telemetry and structured logging components for LabelScan.
//!
//! Handles log redaction, JSON file output with daily rotation, and the
//! structured scan-event log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{ScanEvent, ScanEventLogger, ScanLogEntry};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
