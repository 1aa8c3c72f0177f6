//! Scan Event Logger
//!
//! One structured record per capture-session milestone, emitted under the
//! `scan_events` target so it can be filtered into its own NDJSON stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    StateChanged {
        from: String,
        to: String,
    },
    ImageCaptured {
        slot: Option<String>,
        count: usize,
    },
    UploadStarted {
        images: usize,
    },
    UploadFinished {
        empty: bool,
        confidence: Option<f64>,
    },
    UploadFailed {
        kind: String,
        message: String,
    },
    Notice {
        message: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ScanLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ScanEvent,
}

impl ScanLogEntry {
    pub fn new(session_id: &str, mut event: ScanEvent) -> Self {
        if let ScanEvent::UploadFailed { message, .. } = &mut event {
            *message = redact_sensitive_data(message);
        }
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

pub struct ScanEventLogger;

impl ScanEventLogger {
    /// Log a session event, redacting free-form failure text first.
    pub fn log_event(session_id: &str, event: ScanEvent) {
        let entry = ScanLogEntry::new(session_id, event);
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "scan_events", session_id = %entry.session_id, event = %json, "Scan event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_is_redacted() {
        let entry = ScanLogEntry::new(
            "abc",
            ScanEvent::UploadFailed {
                kind: "server_error".into(),
                message: "upstream said Bearer abc.def.ghi".into(),
            },
        );
        match &entry.event {
            ScanEvent::UploadFailed { message, .. } => {
                assert!(!message.contains("abc.def.ghi"))
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_entry_serializes_tagged() {
        let entry = ScanLogEntry::new("s1", ScanEvent::ImageCaptured { slot: Some("front".into()), count: 1 });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "image_captured");
        assert_eq!(json["event"]["slot"], "front");
        assert_eq!(json["session_id"], "s1");
    }
}
