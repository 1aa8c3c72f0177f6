//! Transport client: ships one captured batch to the scan server as a
//! single multipart request and reports exactly one terminal outcome.

pub mod client;
pub mod progress;

pub use client::{part_name, HttpTransport, TransportSettings};
pub use progress::ProgressTracker;
