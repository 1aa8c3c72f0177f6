//! LabelScan Gateway HTTP Server
//!
//! Accepts a batch of label photos as one multipart request, extracts each
//! image on a bounded worker pool and answers with the fused record.

pub mod error;
pub mod health_api;
pub mod pipeline;
pub mod scan_api;
pub mod server;

pub use error::ApiError;
pub use pipeline::extract_all;
pub use scan_api::{RequestShape, UploadedImage};
pub use server::{build_router, start_server, GatewayState, ScanLimits};
