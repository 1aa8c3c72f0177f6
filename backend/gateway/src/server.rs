//! Main HTTP Gateway Server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use labelscan_core::Extractor;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::{health_api, scan_api};

/// Per-request bounds on uploads and extraction concurrency.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub max_slots: usize,
    pub workers: usize,
    pub max_image_bytes: usize,
    /// Deadline for a single image; a slower extraction counts as failed.
    pub extraction_timeout: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_slots: 4,
            workers: 2,
            max_image_bytes: 10 * 1024 * 1024,
            extraction_timeout: Duration::from_secs(45),
        }
    }
}

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub extractor: Arc<dyn Extractor>,
    pub limits: ScanLimits,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(extractor: Arc<dyn Extractor>, limits: ScanLimits) -> Self {
        Self {
            extractor,
            limits,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: GatewayState) -> Router {
    // Room for every allowed image plus multipart framing.
    let body_limit = state.limits.max_slots * state.limits.max_image_bytes + 64 * 1024;
    Router::new()
        .route("/scan", post(scan_api::scan))
        .route("/health", get(health_api::get_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gateway");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use labelscan_understanding::MockExtractor;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "labelscan-test-boundary";

    fn app() -> Router {
        app_with(ScanLimits::default())
    }

    fn app_with(limits: ScanLimits) -> Router {
        build_router(GatewayState::new(Arc::new(MockExtractor::new()), limits))
    }

    fn scan_request(parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, content_type, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/scan")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        send_to(app(), request).await
    }

    async fn send_to(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_labeled_front_back_scan() {
        let (status, json) = send(scan_request(&[
            ("front", "image/jpeg", b"DOVE\nDeep Moisture Bar"),
            ("back", "image/jpeg", b"EXP 12/2026\nIngredients: Water, Glycerin"),
        ]))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["product_name"], "Deep Moisture Bar");
        assert_eq!(json["brand"], "DOVE");
        assert_eq!(json["expiry_date"], "12/2026");
        assert_eq!(json["ingredients"], serde_json::json!(["Water", "Glycerin"]));
        assert_eq!(json["image_count"], 2);
        assert_eq!(json["summary"], "Deep Moisture Bar. Expires 12/2026");
        assert!(json["raw_text_by_slot"]["front"].is_string());
        assert!(json["raw_text_by_slot"]["back"].is_string());
        assert_eq!(json["id"].as_str().unwrap().len(), 8);
        assert!(json.get("failure_reason").is_none());
    }

    #[tokio::test]
    async fn test_unlabeled_failed_image_is_dropped() {
        let (status, json) = send(scan_request(&[
            ("images", "image/jpeg", b"NIVEA\nSoft Moisturising Cream"),
            ("images", "image/jpeg", &[0xff, 0xd8, 0xff]),
            ("images", "image/png", b"Best before: 05/2027"),
        ]))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["image_count"], 3);
        assert_eq!(json["expiry_date"], "05/2027");
        let raw = json["raw_text_by_slot"].as_object().unwrap();
        assert_eq!(raw.keys().cloned().collect::<Vec<_>>(), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn test_unreadable_batch_is_ok_with_failure_reason() {
        let (status, json) = send(scan_request(&[("file", "image/jpeg", &[0xff, 0xd8, 0xff])])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["failure_reason"], "Label text could not be detected");
        assert!(json["confidence"].is_null());
        assert_eq!(json["image_count"], 1);
    }

    #[tokio::test]
    async fn test_mixed_shapes_rejected() {
        let (status, json) = send(scan_request(&[
            ("front", "image/jpeg", b"DOVE soap"),
            ("images", "image/jpeg", b"more text"),
        ]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("cannot mix"));
    }

    #[tokio::test]
    async fn test_non_image_part_rejected() {
        let (status, _) = send(scan_request(&[("file", "text/plain", b"DOVE soap")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_too_many_images() {
        let part: (&str, &str, &[u8]) = ("images", "image/jpeg", b"some label text");
        let (status, json) = send(scan_request(&[part; 5])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json["error"].as_str().unwrap().contains("at most 4"));
    }

    #[tokio::test]
    async fn test_oversized_image() {
        let limits = ScanLimits {
            max_image_bytes: 8,
            ..ScanLimits::default()
        };
        let request = scan_request(&[("front", "image/jpeg", b"DOVE Deep Moisture Bar")]);
        let (status, json) = send_to(app_with(limits), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "part 'front' exceeds 8 bytes");
    }

    #[tokio::test]
    async fn test_no_images() {
        let (status, _) = send(scan_request(&[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let (status, _) = send(scan_request(&[
            ("front", "image/jpeg", b"DOVE soap"),
            ("front", "image/jpeg", b"DOVE soap"),
        ]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["extractor"], "mock");
    }
}
