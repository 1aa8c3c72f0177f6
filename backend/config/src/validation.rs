//! Config validation with dotted-path error messages.

use crate::defaults::{
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_WATCHDOG_TIMEOUT_MS,
};
use crate::schema::{LabelScanConfig, ProviderKind};
use thiserror::Error;

/// Upper bound on images per scan.
pub const MAX_SLOTS_LIMIT: usize = 8;

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Everything found in one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &LabelScanConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_extraction(config, &mut report);
    validate_capture(config, &mut report);
    validate_transport(config, &mut report);
    report
}

fn check_slots(path: &str, max_slots: Option<usize>, report: &mut ValidationReport) {
    if let Some(n) = max_slots {
        if !(1..=MAX_SLOTS_LIMIT).contains(&n) {
            report.error(path, format!("maxSlots must be between 1 and {MAX_SLOTS_LIMIT}, got {n}"));
        }
    }
}

fn validate_server(config: &LabelScanConfig, report: &mut ValidationReport) {
    let Some(server) = &config.server else { return };
    check_slots("server.maxSlots", server.max_slots, report);
    if server.extraction_workers == Some(0) {
        report.error("server.extractionWorkers", "extractionWorkers must be >= 1");
    }
    if server.max_image_bytes == Some(0) {
        report.error("server.maxImageBytes", "maxImageBytes must be > 0");
    }
    if let Some(port) = server.port {
        if port != 0 && port < 1024 {
            report.warn(
                "server.port",
                format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
            );
        }
    }
}

fn validate_extraction(config: &LabelScanConfig, report: &mut ValidationReport) {
    let Some(extraction) = &config.extraction else { return };
    let provider = extraction.provider.unwrap_or_default();
    let needs_key = matches!(
        provider,
        ProviderKind::Gemini | ProviderKind::OpenAI | ProviderKind::Heuristic
    );
    if needs_key && extraction.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        report.warn(
            "extraction.apiKey",
            "No API key configured; every extraction will fail and scans will come back empty",
        );
    }
    if extraction.timeout_ms == Some(0) {
        report.error("extraction.timeoutMs", "timeoutMs must be > 0");
    }
}

fn validate_capture(config: &LabelScanConfig, report: &mut ValidationReport) {
    let Some(capture) = &config.capture else { return };
    check_slots("capture.maxSlots", capture.max_slots, report);
    if capture.auto_capture == Some(true) && capture.auto_capture_delay_ms == Some(0) {
        report.warn("capture.autoCaptureDelayMs", "A zero delay fires before the operator can frame the label");
    }
}

fn validate_transport(config: &LabelScanConfig, report: &mut ValidationReport) {
    let Some(transport) = &config.transport else { return };
    let request = transport.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
    let watchdog = transport.watchdog_timeout_ms.unwrap_or(DEFAULT_WATCHDOG_TIMEOUT_MS);
    if request == 0 {
        report.error("transport.requestTimeoutMs", "requestTimeoutMs must be > 0");
    }
    if watchdog <= request {
        report.error(
            "transport.watchdogTimeoutMs",
            format!("watchdogTimeoutMs ({watchdog}) must be longer than requestTimeoutMs ({request})"),
        );
    }
    if let Some(url) = &transport.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            report.error("transport.baseUrl", format!("'{url}' is not an http(s) URL"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::{ExtractionConfig, ServerConfig, TransportConfig};

    #[test]
    fn mock_defaults_are_valid() {
        let mut cfg = LabelScanConfig::default();
        cfg.extraction = Some(ExtractionConfig {
            provider: Some(ProviderKind::Mock),
            ..Default::default()
        });
        let report = validate(&apply_all_defaults(cfg));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_api_key_is_warning() {
        let report = validate(&apply_all_defaults(LabelScanConfig::default()));
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "extraction.apiKey");
    }

    #[test]
    fn zero_extraction_timeout_is_error() {
        let mut cfg = LabelScanConfig::default();
        cfg.extraction = Some(ExtractionConfig {
            provider: Some(ProviderKind::Mock),
            timeout_ms: Some(0),
            ..Default::default()
        });
        let report = validate(&cfg);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "extraction.timeoutMs");
    }

    #[test]
    fn watchdog_must_exceed_request_timeout() {
        let mut cfg = LabelScanConfig::default();
        cfg.transport = Some(TransportConfig {
            request_timeout_ms: Some(30_000),
            watchdog_timeout_ms: Some(30_000),
            ..Default::default()
        });
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "transport.watchdogTimeoutMs");
    }

    #[test]
    fn slot_and_worker_bounds() {
        let mut cfg = LabelScanConfig::default();
        cfg.server = Some(ServerConfig {
            max_slots: Some(9),
            extraction_workers: Some(0),
            ..Default::default()
        });
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["server.maxSlots", "server.extractionWorkers"]);
    }
}
