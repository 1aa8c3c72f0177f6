//! States, events and effects of the capture state machine.

use std::fmt;
use std::time::Duration;

use labelscan_core::{
    CaptureError, CapturedImage, MergedRecord, ProcessingStage, ScanResponse, SessionId,
    SlotLabel, TransportError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The upload never produced a record.
    Transport(TransportError),
    /// The server answered but no label field could be read.
    UnreadableLabel,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(e) => write!(f, "{e}"),
            FailureReason::UnreadableLabel => f.write_str("unable to read label"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    /// Camera not ready.
    Idle,
    ReadyEmpty,
    AwaitingMore,
    Uploading,
    Processing(ProcessingStage),
    Done(MergedRecord),
    Failed(FailureReason),
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::ReadyEmpty => "ready_empty",
            CaptureState::AwaitingMore => "awaiting_more",
            CaptureState::Uploading => "uploading",
            CaptureState::Processing(_) => "processing",
            CaptureState::Done(_) => "done",
            CaptureState::Failed(_) => "failed",
        }
    }

    pub fn accepts_capture(&self) -> bool {
        matches!(self, CaptureState::ReadyEmpty | CaptureState::AwaitingMore)
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, CaptureState::Uploading | CaptureState::Processing(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Done(_) | CaptureState::Failed(_))
    }
}

/// What asked for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    /// Auto-capture timer fire, tagged with the generation it was armed under.
    Timer { generation: u64 },
}

/// Input to the state machine. All events for a session are handled one at
/// a time, in arrival order.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    CameraReady,
    CaptureRequested(Trigger),
    FrameAcquired {
        session_id: SessionId,
        image: CapturedImage,
    },
    CaptureFailed {
        session_id: SessionId,
        error: CaptureError,
    },
    FinalizeRequested,
    CancelRequested,
    UploadProgress {
        session_id: SessionId,
        percent: u8,
    },
    TransportFinished {
        session_id: SessionId,
        result: Result<ScanResponse, TransportError>,
    },
    BackendReachability(bool),
    /// Operator left the scan screen.
    Detached,
    RestartRequested,
}

/// Operator-facing feedback. Fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    CameraReady,
    Captured {
        count: usize,
        max: usize,
        slot: Option<SlotLabel>,
    },
    MaximumReached {
        max: usize,
    },
    NoPhotosYet,
    CaptureFailed(String),
    Uploading {
        images: usize,
    },
    Stage(ProcessingStage),
    BackendUnreachable,
    Done {
        summary: Option<String>,
    },
    UnreadableLabel,
    TransportFailed {
        kind: &'static str,
        message: String,
    },
    Cancelled,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::CameraReady => "Camera ready".into(),
            Notice::Captured { count, max, slot: Some(slot) } => {
                format!("Captured {slot} ({count} of {max})")
            }
            Notice::Captured { count, max, slot: None } => format!("Photo {count} of {max} captured"),
            Notice::MaximumReached { max } => format!("Maximum of {max} photos reached"),
            Notice::NoPhotosYet => "No photos yet".into(),
            Notice::CaptureFailed(reason) => format!("Capture failed, try again: {reason}"),
            Notice::Uploading { images } => format!("Sending {images} photo(s)"),
            Notice::Stage(stage) => format!("Processing: {stage}"),
            Notice::BackendUnreachable => "Scan server unreachable".into(),
            Notice::Done { summary: Some(summary) } => summary.clone(),
            Notice::Done { summary: None } => "Scan complete".into(),
            Notice::UnreadableLabel => "Unable to read label".into(),
            Notice::TransportFailed { message, .. } => format!("Scan failed: {message}"),
            Notice::Cancelled => "Scan cancelled".into(),
        }
    }

    /// Whether this notice deserves a haptic pulse.
    pub fn is_haptic(&self) -> bool {
        matches!(
            self,
            Notice::Captured { .. }
                | Notice::Done { .. }
                | Notice::UnreadableLabel
                | Notice::TransportFailed { .. }
                | Notice::CaptureFailed(_)
        )
    }
}

/// Work the driver performs on behalf of the state machine.
#[derive(Debug, Clone)]
pub enum Effect {
    ArmTimer { generation: u64, delay: Duration },
    DisarmTimer,
    AcquireFrame {
        session_id: SessionId,
        slot: Option<SlotLabel>,
    },
    Upload {
        session_id: SessionId,
        batch: Vec<CapturedImage>,
    },
    Notify(Notice),
    Persist {
        session_id: SessionId,
        record: MergedRecord,
    },
}
