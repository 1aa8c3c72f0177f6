//! Capture orchestration: a pure state machine deciding what happens next,
//! and an async driver that runs its effects against a camera, a transport,
//! a history sink and an operator notifier.

pub mod camera;
pub mod config;
pub mod driver;
pub mod history;
pub mod machine;
pub mod notifier;
pub mod state;

pub use camera::{mime_for_path, Camera, FileCamera};
pub use config::{CaptureConfig, CaptureMode};
pub use driver::{CaptureDeps, CaptureDriver, CaptureHandle, CaptureSnapshot};
pub use history::MemoryHistory;
pub use machine::CaptureMachine;
pub use notifier::{Feedback, LogNotifier, Notifier};
pub use state::{CaptureEvent, CaptureState, Effect, FailureReason, Notice, Trigger};
