use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tracing::{debug, info, warn};

use labelscan_core::{
    CapturedImage, ProgressTx, ScanResponse, ScanTransport, SessionId, SlotLabel, TransportError,
};

use crate::progress::ProgressTracker;

const CHUNK_SIZE: usize = 16 * 1024;
const MAX_ERROR_BODY: usize = 200;

/// Part name shared by every image of an unlabeled batch.
pub const UNLABELED_PART: &str = "images";

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    /// Primary timeout, enforced by the HTTP client.
    pub request_timeout: Duration,
    /// Backstop around the whole exchange; strictly longer than the primary.
    pub watchdog_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            request_timeout: Duration::from_secs(60),
            watchdog_timeout: Duration::from_secs(75),
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Multipart part name for an image: its slot label in a labeled batch,
/// the shared unlabeled name otherwise.
pub fn part_name(slot: Option<SlotLabel>) -> &'static str {
    match slot {
        Some(slot) => slot.as_str(),
        None => UNLABELED_PART,
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "jpg",
    }
}

/// HTTP implementation of [`ScanTransport`]. One attempt per call, no retries.
pub struct HttpTransport {
    client: Client,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(mut settings: TransportSettings) -> Result<Self, TransportError> {
        if settings.watchdog_timeout <= settings.request_timeout {
            let widened = settings.request_timeout + Duration::from_secs(1);
            warn!(
                request_ms = settings.request_timeout.as_millis() as u64,
                watchdog_ms = settings.watchdog_timeout.as_millis() as u64,
                "Watchdog not longer than request timeout; widening"
            );
            settings.watchdog_timeout = widened;
        }
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self::from_parts(client, settings))
    }

    /// Use a prebuilt client as-is. No timeout adjustment is applied.
    pub fn from_parts(client: Client, mut settings: TransportSettings) -> Self {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        Self { client, settings }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn build_form(batch: &[CapturedImage], tracker: &Arc<ProgressTracker>) -> Result<Form, TransportError> {
        let labeled = batch.iter().all(|img| img.slot_label.is_some());
        let mut form = Form::new();
        for (index, image) in batch.iter().enumerate() {
            let slot = if labeled { image.slot_label } else { None };
            let data = image.handle.data.clone();
            let len = data.len() as u64;

            let chunks: Vec<Bytes> = (0..data.len())
                .step_by(CHUNK_SIZE)
                .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
                .collect();
            let tracker = Arc::clone(tracker);
            let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
                tracker.advance(chunk.len());
                Ok::<_, std::io::Error>(chunk)
            })));

            let file_name = format!("{}_{index}.{}", part_name(slot), extension_for(&image.handle.mime_type));
            let part = Part::stream_with_length(body, len)
                .file_name(file_name)
                .mime_str(&image.handle.mime_type)
                .map_err(|e| TransportError::Network(format!("bad mime type: {e}")))?;
            form = form.part(part_name(slot), part);
        }
        Ok(form)
    }

    async fn send(&self, session_id: SessionId, batch: &[CapturedImage], progress: ProgressTx) -> Result<ScanResponse, TransportError> {
        let total: u64 = batch.iter().map(|img| img.handle.data.len() as u64).sum();
        let tracker = Arc::new(ProgressTracker::new(total, progress));
        let form = Self::build_form(batch, &tracker)?;

        let url = format!("{}/scan", self.settings.base_url);
        info!(session_id = %session_id, images = batch.len(), bytes = total, "Uploading scan batch");

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(TransportError::ServerError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let response: ScanResponse = serde_json::from_slice(&body)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        tracker.finish();
        debug!(session_id = %session_id, id = %response.id, "Scan response received");
        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_decode() {
        TransportError::MalformedResponse(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Prefer the server's `{ "error": ... }` text, else the raw body, truncated.
fn error_message(body: &[u8]) -> String {
    let parsed = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
    let mut message = parsed.unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY).rev().find(|&i| message.is_char_boundary(i)).unwrap_or(0);
        message.truncate(cut);
    }
    message
}

#[async_trait]
impl ScanTransport for HttpTransport {
    async fn upload(
        &self,
        session_id: SessionId,
        batch: &[CapturedImage],
        progress: ProgressTx,
    ) -> Result<ScanResponse, TransportError> {
        let watchdog = self.settings.watchdog_timeout;
        match tokio::time::timeout(watchdog, self.send(session_id, batch, progress)).await {
            Ok(outcome) => {
                if let Err(e) = &outcome {
                    warn!(session_id = %session_id, kind = e.kind(), error = %e, "Scan upload failed");
                }
                outcome
            }
            Err(_) => {
                warn!(session_id = %session_id, watchdog_ms = watchdog.as_millis() as u64, "Watchdog fired");
                Err(TransportError::Timeout(format!(
                    "no response within {}ms",
                    watchdog.as_millis()
                )))
            }
        }
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.settings.base_url);
        let request = self.client.get(&url).timeout(self.settings.health_timeout).send();
        match tokio::time::timeout(self.settings.health_timeout, request).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            Ok(Err(e)) => {
                debug!(error = %e, "Health check failed");
                false
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use labelscan_core::{ImageHandle, MergedRecord};
    use tokio::sync::{mpsc, Mutex};
    use uuid::Uuid;

    type Seen = Arc<Mutex<Vec<(String, usize)>>>;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn record_parts(State(seen): State<Seen>, mut multipart: Multipart) -> Json<ScanResponse> {
        let mut count = 0;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap();
            seen.lock().await.push((name, bytes.len()));
            count += 1;
        }
        let record = MergedRecord {
            product_name: Some("Dove Soap".into()),
            confidence: Some(0.8),
            ..Default::default()
        };
        Json(ScanResponse::new(record, count))
    }

    fn image(bytes: usize, slot: Option<SlotLabel>) -> CapturedImage {
        CapturedImage::new(
            ImageHandle::new("mem://img", "image/jpeg", Bytes::from(vec![7u8; bytes])),
            slot,
        )
    }

    fn settings(base_url: String) -> TransportSettings {
        TransportSettings {
            base_url,
            request_timeout: Duration::from_secs(5),
            watchdog_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_labeled_upload_success_with_progress() {
        let seen: Seen = Arc::default();
        let router = Router::new().route("/scan", post(record_parts)).with_state(seen.clone());
        let transport = HttpTransport::new(settings(spawn(router).await)).unwrap();

        let batch = vec![image(40_000, Some(SlotLabel::Front)), image(10, Some(SlotLabel::Back))];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = transport.upload(Uuid::new_v4(), &batch, tx).await.unwrap();

        assert_eq!(response.record.product_name.as_deref(), Some("Dove Soap"));
        assert_eq!(response.image_count, 2);
        assert_eq!(
            *seen.lock().await,
            vec![("front".to_string(), 40_000), ("back".to_string(), 10)]
        );

        let mut last = 0;
        while let Ok(pct) = rx.try_recv() {
            assert!(pct > last);
            last = pct;
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_unlabeled_parts_keep_order() {
        let seen: Seen = Arc::default();
        let router = Router::new().route("/scan", post(record_parts)).with_state(seen.clone());
        let transport = HttpTransport::new(settings(spawn(router).await)).unwrap();

        let batch = vec![image(3, None), image(1, None), image(2, None)];
        let (tx, _rx) = mpsc::unbounded_channel();
        transport.upload(Uuid::new_v4(), &batch, tx).await.unwrap();

        let seen = seen.lock().await;
        let sizes: Vec<usize> = seen.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![3, 1, 2]);
        assert!(seen.iter().all(|(name, _)| name == UNLABELED_PART));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let router = Router::new().route(
            "/scan",
            post(|| async {
                (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "overloaded"})))
            }),
        );
        let transport = HttpTransport::new(settings(spawn(router).await)).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.upload(Uuid::new_v4(), &[image(5, None)], tx).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::ServerError { status: 503, message: "overloaded".into() }
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let router = Router::new().route("/scan", post(|| async { "not json" }));
        let transport = HttpTransport::new(settings(spawn(router).await)).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.upload(Uuid::new_v4(), &[image(5, None)], tx).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[tokio::test]
    async fn test_primary_timeout() {
        let router = Router::new().route(
            "/scan",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let mut s = settings(spawn(router).await);
        s.request_timeout = Duration::from_millis(200);
        s.watchdog_timeout = Duration::from_secs(2);
        let transport = HttpTransport::new(s).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.upload(Uuid::new_v4(), &[image(5, None)], tx).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn test_watchdog_fires_without_client_timeout() {
        let router = Router::new().route(
            "/scan",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let mut s = settings(spawn(router).await);
        s.watchdog_timeout = Duration::from_millis(200);
        // A client without any timeout stands in for an unresponsive primary.
        let transport = HttpTransport::from_parts(Client::new(), s);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.upload(Uuid::new_v4(), &[image(5, None)], tx).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(msg) if msg.contains("200ms")));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = HttpTransport::new(settings(format!("http://{addr}"))).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.upload(Uuid::new_v4(), &[image(5, None)], tx).await.unwrap_err();
        assert_eq!(err.kind(), "network");
        assert!(!transport.check_health().await);
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = Router::new().route("/health", get(|| async { Json(serde_json::json!({"status": "ok"})) }));
        let transport = HttpTransport::new(settings(spawn(router).await)).unwrap();
        assert!(transport.check_health().await);
    }

    #[tokio::test]
    async fn test_watchdog_widened_when_too_short() {
        let transport = HttpTransport::new(TransportSettings {
            request_timeout: Duration::from_secs(5),
            watchdog_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        assert!(transport.settings().watchdog_timeout > transport.settings().request_timeout);
    }

    #[test]
    fn test_error_message_prefers_json_error() {
        assert_eq!(error_message(br#"{"error":"too many images"}"#), "too many images");
        assert_eq!(error_message(b"plain"), "plain");
        assert_eq!(error_message(&[b'x'; 500]).len(), MAX_ERROR_BODY);
    }
}
