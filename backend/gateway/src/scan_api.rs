//! `POST /scan`: multipart upload of one to `maxSlots` label photos.
//!
//! Part names select the request shape:
//! - `front` / `back`: slot-aware labeled mode
//! - repeated `images`: unlabeled multi-angle mode, position indexed
//! - a single `file`: single-image mode (unlabeled)

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use labelscan_core::{ScanError, ScanResponse, SlotLabel};
use labelscan_fusion::fuse_outcomes;
use tracing::info;

use crate::error::ApiError;
use crate::pipeline::extract_all;
use crate::server::{GatewayState, ScanLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    Labeled,
    Unlabeled,
    Single,
}

impl RequestShape {
    fn for_part(name: &str) -> Option<(Self, Option<SlotLabel>)> {
        match name {
            "images" => Some((RequestShape::Unlabeled, None)),
            "file" => Some((RequestShape::Single, None)),
            other => other
                .parse::<SlotLabel>()
                .ok()
                .map(|slot| (RequestShape::Labeled, Some(slot))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub slot: Option<SlotLabel>,
    pub mime_type: String,
    pub data: Bytes,
}

/// Read and check every image part, keeping upload order.
pub async fn read_images(
    mut multipart: Multipart,
    limits: &ScanLimits,
) -> Result<(RequestShape, Vec<UploadedImage>), ApiError> {
    let mut shape: Option<RequestShape> = None;
    let mut images: Vec<UploadedImage> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let (part_shape, slot) = RequestShape::for_part(&name)
            .ok_or_else(|| ScanError::InvalidRequest(format!("unexpected part '{name}'")))?;

        match shape {
            None => shape = Some(part_shape),
            Some(existing) if existing != part_shape => {
                return Err(invalid("cannot mix labeled (front/back) and unlabeled image parts"));
            }
            Some(RequestShape::Single) => {
                return Err(invalid("only one 'file' part is allowed"));
            }
            Some(_) => {}
        }
        if slot.is_some() && images.iter().any(|img| img.slot == slot) {
            return Err(invalid(format!("duplicate '{name}' part")));
        }
        if images.len() >= limits.max_slots {
            return Err(ScanError::BatchLimitExceeded { max: limits.max_slots }.into());
        }

        let mime_type = field.content_type().unwrap_or_default().to_string();
        if !mime_type.starts_with("image/") {
            return Err(invalid(format!(
                "part '{name}' must be an image, got '{mime_type}'"
            )));
        }
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(invalid(format!("part '{name}' is empty")));
        }
        if data.len() > limits.max_image_bytes {
            return Err(ScanError::ImageTooLarge {
                part: name,
                max_bytes: limits.max_image_bytes,
            }
            .into());
        }
        images.push(UploadedImage { slot, mime_type, data });
    }

    match shape {
        Some(shape) => Ok((shape, images)),
        None => Err(invalid("no images uploaded")),
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ScanError::InvalidRequest(message.into()).into()
}

/// Handler for `POST /scan`
pub async fn scan(
    State(state): State<GatewayState>,
    multipart: Multipart,
) -> Result<Json<ScanResponse>, ApiError> {
    let (shape, images) = read_images(multipart, &state.limits).await?;
    let image_count = images.len();
    info!(shape = ?shape, images = image_count, extractor = state.extractor.name(), "Scan request");

    let outcomes = extract_all(
        state.extractor.clone(),
        images,
        state.limits.workers,
        state.limits.extraction_timeout,
    )
    .await;
    let record = fuse_outcomes(outcomes);
    let response = ScanResponse::new(record, image_count);

    info!(
        id = %response.id,
        empty = response.failure_reason.is_some(),
        confidence = ?response.record.confidence,
        "Scan complete"
    );
    Ok(Json(response))
}
