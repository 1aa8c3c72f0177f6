//! Config defaults: applies default values to parsed config.

use crate::schema::{
    CaptureModeSetting, CaptureSection, ExtractionConfig, LabelScanConfig, LoggingConfig,
    ProviderKind, ServerConfig, TransportConfig,
};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_SLOTS: usize = 4;
/// Labeled mode always captures exactly front and back.
pub const LABELED_MAX_SLOTS: usize = 2;
pub const DEFAULT_EXTRACTION_WORKERS: usize = 2;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_EXTRACTION_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_AUTO_CAPTURE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 75_000;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: LabelScanConfig) -> LabelScanConfig {
    let config = apply_server_defaults(config);
    let config = apply_extraction_defaults(config);
    let config = apply_capture_defaults(config);
    let config = apply_transport_defaults(config);
    apply_logging_defaults(config)
}

fn apply_server_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let server = config.server.get_or_insert_with(ServerConfig::default);
    server.bind.get_or_insert_with(|| DEFAULT_BIND.to_string());
    server.port.get_or_insert(DEFAULT_PORT);
    server.max_slots.get_or_insert(DEFAULT_MAX_SLOTS);
    server.extraction_workers.get_or_insert(DEFAULT_EXTRACTION_WORKERS);
    server.max_image_bytes.get_or_insert(DEFAULT_MAX_IMAGE_BYTES);
    config
}

fn apply_extraction_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let extraction = config.extraction.get_or_insert_with(ExtractionConfig::default);
    extraction.provider.get_or_insert(ProviderKind::default());
    extraction.timeout_ms.get_or_insert(DEFAULT_EXTRACTION_TIMEOUT_MS);
    config
}

/// Labeled mode pins `maxSlots` to two regardless of what was configured.
fn apply_capture_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let capture = config.capture.get_or_insert_with(CaptureSection::default);
    let mode = *capture.mode.get_or_insert(CaptureModeSetting::default());
    match mode {
        CaptureModeSetting::Labeled => capture.max_slots = Some(LABELED_MAX_SLOTS),
        CaptureModeSetting::Unlabeled => {
            capture.max_slots.get_or_insert(DEFAULT_MAX_SLOTS);
        }
    }
    capture.auto_capture.get_or_insert(true);
    capture.auto_capture_delay_ms.get_or_insert(DEFAULT_AUTO_CAPTURE_DELAY_MS);
    capture.voice.get_or_insert(false);
    capture.haptics.get_or_insert(true);
    capture.suppress_auto_when_unreachable.get_or_insert(true);
    config
}

fn apply_transport_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let transport = config.transport.get_or_insert_with(TransportConfig::default);
    transport.base_url.get_or_insert_with(|| DEFAULT_BASE_URL.to_string());
    transport.request_timeout_ms.get_or_insert(DEFAULT_REQUEST_TIMEOUT_MS);
    transport.watchdog_timeout_ms.get_or_insert(DEFAULT_WATCHDOG_TIMEOUT_MS);
    transport.health_timeout_ms.get_or_insert(DEFAULT_HEALTH_TIMEOUT_MS);
    config
}

fn apply_logging_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_every_section() {
        let cfg = apply_all_defaults(LabelScanConfig::default());
        let server = cfg.server.unwrap();
        assert_eq!(server.port, Some(DEFAULT_PORT));
        assert_eq!(server.extraction_workers, Some(2));
        let capture = cfg.capture.unwrap();
        assert_eq!(capture.max_slots, Some(4));
        assert_eq!(capture.auto_capture_delay_ms, Some(2_000));
        let transport = cfg.transport.unwrap();
        assert_eq!(transport.request_timeout_ms, Some(60_000));
        assert_eq!(transport.watchdog_timeout_ms, Some(75_000));
        assert_eq!(cfg.logging.unwrap().level.as_deref(), Some("info"));
        assert_eq!(cfg.extraction.unwrap().timeout_ms, Some(DEFAULT_EXTRACTION_TIMEOUT_MS));
    }

    #[test]
    fn labeled_mode_forces_two_slots() {
        let cfg = LabelScanConfig {
            capture: Some(CaptureSection {
                mode: Some(CaptureModeSetting::Labeled),
                max_slots: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.capture.unwrap().max_slots, Some(LABELED_MAX_SLOTS));
    }

    #[test]
    fn does_not_override_user_values() {
        let cfg = LabelScanConfig {
            server: Some(ServerConfig {
                port: Some(9100),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.server.unwrap().port, Some(9100));
    }
}
