use thiserror::Error;

/// Camera acquisition failed. Recoverable: the operator retries the same slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),
}

/// Terminal failure of a batch upload. Never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    /// Stable short name of the failure kind, used in logs and notices.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Network(_) => "network",
            TransportError::Timeout(_) => "timeout",
            TransportError::ServerError { .. } => "server_error",
            TransportError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Per-image extraction failure. Absorbed by fusion, never shown per image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no readable text in image")]
    NoText,

    #[error("extraction provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("could not parse extraction output: {0}")]
    Parse(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Reasons the server refuses a scan request outright. Extraction failures
/// are not among them: those only thin out the fused record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("batch limit exceeded: at most {max} images per scan")]
    BatchLimitExceeded { max: usize },

    #[error("part '{part}' exceeds {max_bytes} bytes")]
    ImageTooLarge { part: String, max_bytes: usize },

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kind() {
        assert_eq!(TransportError::Timeout("watchdog".into()).kind(), "timeout");
        let err = TransportError::ServerError {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.kind(), "server_error");
        assert_eq!(err.to_string(), "server error (502): bad gateway");
    }

    #[test]
    fn test_scan_error_messages() {
        let err = ScanError::ImageTooLarge {
            part: "front".into(),
            max_bytes: 1024,
        };
        assert_eq!(err.to_string(), "part 'front' exceeds 1024 bytes");
        assert_eq!(
            ScanError::InvalidRequest("no images uploaded".into()).to_string(),
            "invalid scan request: no images uploaded"
        );
    }
}
