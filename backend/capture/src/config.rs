use std::time::Duration;

use labelscan_core::SlotLabel;
use serde::{Deserialize, Serialize};

/// How many shots a session takes and whether they carry slot labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Front then back.
    Labeled,
    /// Any angles, position only.
    Unlabeled,
}

/// Everything the orchestrator needs to know about operator preferences.
/// Passed in at session creation; nothing is read from global state.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    pub max_slots: usize,
    pub auto_capture: bool,
    pub auto_capture_delay: Duration,
    pub voice: bool,
    pub haptics: bool,
    /// Skip the auto-capture timer while the backend is known unreachable.
    pub suppress_auto_when_unreachable: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Unlabeled,
            max_slots: 4,
            auto_capture: true,
            auto_capture_delay: Duration::from_millis(2000),
            voice: false,
            haptics: true,
            suppress_auto_when_unreachable: true,
        }
    }
}

impl CaptureConfig {
    pub fn labeled() -> Self {
        Self {
            mode: CaptureMode::Labeled,
            max_slots: SlotLabel::SEQUENCE.len(),
            ..Default::default()
        }
    }

    pub fn unlabeled(max_slots: usize) -> Self {
        Self {
            max_slots,
            ..Default::default()
        }
    }

    pub fn without_auto_capture(mut self) -> Self {
        self.auto_capture = false;
        self
    }

    /// Slot capacity; labeled mode never exceeds the label sequence.
    pub fn capacity(&self) -> usize {
        match self.mode {
            CaptureMode::Labeled => self.max_slots.min(SlotLabel::SEQUENCE.len()),
            CaptureMode::Unlabeled => self.max_slots,
        }
        .max(1)
    }

    /// Label for the slot at `index`, if this mode labels slots.
    pub fn slot_label(&self, index: usize) -> Option<SlotLabel> {
        match self.mode {
            CaptureMode::Labeled => SlotLabel::SEQUENCE.get(index).copied(),
            CaptureMode::Unlabeled => None,
        }
    }
}
