//! Mapping from the loaded config file to the runtime settings of each
//! component. Sections are expected to have gone through
//! `apply_all_defaults`; anything still unset falls back to the component's
//! own default.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use labelscan_capture::{CaptureConfig, CaptureMode};
use labelscan_config::{CaptureModeSetting, LabelScanConfig, ProviderKind};
use labelscan_core::Extractor;
use labelscan_gateway::ScanLimits;
use labelscan_transport::TransportSettings;
use labelscan_understanding::{
    MockExtractor, OcrExtractor, VisionExtractor, VisionOcr, VisionProvider,
    DEFAULT_EXTRACTION_TIMEOUT,
};

pub fn bind_addr(config: &LabelScanConfig, port_override: Option<u16>) -> Result<SocketAddr> {
    let server = config.server.clone().unwrap_or_default();
    let bind = server.bind.unwrap_or_else(|| "0.0.0.0".into());
    let port = port_override.or(server.port).unwrap_or(8000);
    format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {bind}:{port}"))
}

fn extraction_timeout(config: &LabelScanConfig) -> Duration {
    config
        .extraction
        .as_ref()
        .and_then(|e| e.timeout_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_EXTRACTION_TIMEOUT)
}

pub fn scan_limits(config: &LabelScanConfig) -> ScanLimits {
    let server = config.server.clone().unwrap_or_default();
    let defaults = ScanLimits::default();
    ScanLimits {
        max_slots: server.max_slots.unwrap_or(defaults.max_slots),
        workers: server.extraction_workers.unwrap_or(defaults.workers),
        max_image_bytes: server.max_image_bytes.unwrap_or(defaults.max_image_bytes),
        extraction_timeout: extraction_timeout(config),
    }
}

pub fn capture_config(config: &LabelScanConfig) -> CaptureConfig {
    let section = config.capture.clone().unwrap_or_default();
    let defaults = CaptureConfig::default();
    let mode = match section.mode.unwrap_or_default() {
        CaptureModeSetting::Labeled => CaptureMode::Labeled,
        CaptureModeSetting::Unlabeled => CaptureMode::Unlabeled,
    };
    CaptureConfig {
        mode,
        max_slots: section.max_slots.unwrap_or(defaults.max_slots),
        auto_capture: section.auto_capture.unwrap_or(defaults.auto_capture),
        auto_capture_delay: section
            .auto_capture_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.auto_capture_delay),
        voice: section.voice.unwrap_or(defaults.voice),
        haptics: section.haptics.unwrap_or(defaults.haptics),
        suppress_auto_when_unreachable: section
            .suppress_auto_when_unreachable
            .unwrap_or(defaults.suppress_auto_when_unreachable),
    }
}

pub fn transport_settings(config: &LabelScanConfig) -> TransportSettings {
    let section = config.transport.clone().unwrap_or_default();
    let defaults = TransportSettings::default();
    TransportSettings {
        base_url: section.base_url.unwrap_or(defaults.base_url),
        request_timeout: section
            .request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout),
        watchdog_timeout: section
            .watchdog_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.watchdog_timeout),
        health_timeout: section
            .health_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.health_timeout),
    }
}

/// Build the extraction adapter named by `extraction.provider`.
pub fn build_extractor(config: &LabelScanConfig) -> Result<Arc<dyn Extractor>> {
    let section = config.extraction.clone().unwrap_or_default();
    let kind = section.provider.unwrap_or_default();
    if kind == ProviderKind::Mock {
        return Ok(Arc::new(MockExtractor::new()));
    }

    let api_key = section
        .api_key
        .filter(|key| !key.trim().is_empty())
        .with_context(|| format!("extraction.apiKey is required for the {kind:?} provider"))?;
    let mut provider = match kind {
        ProviderKind::OpenAI => VisionProvider::openai(api_key),
        _ => VisionProvider::gemini(api_key),
    };
    if let Some(model) = section.model {
        provider = provider.with_model(model);
    }
    if let Some(url) = section.base_url {
        provider = provider.with_base_url(url);
    }

    let timeout = extraction_timeout(config);
    let extractor: Arc<dyn Extractor> = match kind {
        ProviderKind::Heuristic => {
            Arc::new(OcrExtractor::new(Arc::new(VisionOcr::new(provider, timeout)?)))
        }
        _ => Arc::new(VisionExtractor::new(provider, timeout)?),
    };
    Ok(extractor)
}
