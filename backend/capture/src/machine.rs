use std::collections::HashSet;

use labelscan_core::{CapturedImage, ProcessingStage, ScanResponse, SessionId, TransportError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CaptureConfig;
use crate::state::{CaptureEvent, CaptureState, Effect, FailureReason, Notice, Trigger};

/// Pure capture state machine: events in, effects out.
///
/// Holds no clocks, tasks or devices. The same event sequence against the
/// same config always yields the same effects.
#[derive(Debug)]
pub struct CaptureMachine {
    config: CaptureConfig,
    session_id: SessionId,
    state: CaptureState,
    slots: Vec<CapturedImage>,
    /// Re-entrancy guard: a frame acquisition is outstanding.
    capturing: bool,
    /// Generation of the currently armed auto-capture timer.
    armed: Option<u64>,
    next_generation: u64,
    /// The auto-capture timer already fired once this session.
    auto_fired: bool,
    progress: u8,
    reachable: Option<bool>,
    /// Sessions left mid-upload whose outcome still goes to history.
    abandoned: HashSet<SessionId>,
}

impl CaptureMachine {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4(),
            state: CaptureState::Idle,
            slots: Vec::new(),
            capturing: false,
            armed: None,
            next_generation: 0,
            auto_fired: false,
            progress: 0,
            reachable: None,
            abandoned: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn slots(&self) -> &[CapturedImage] {
        &self.slots
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn armed_timer(&self) -> Option<u64> {
        self.armed
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn reachable(&self) -> Option<bool> {
        self.reachable
    }

    pub fn handle(&mut self, event: CaptureEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            CaptureEvent::CameraReady => self.on_camera_ready(&mut effects),
            CaptureEvent::CaptureRequested(trigger) => self.on_capture_requested(trigger, &mut effects),
            CaptureEvent::FrameAcquired { session_id, image } => {
                self.on_frame_acquired(session_id, image, &mut effects)
            }
            CaptureEvent::CaptureFailed { session_id, error } => {
                if session_id == self.session_id && self.capturing {
                    self.capturing = false;
                    warn!(session_id = %session_id, error = %error, "Frame acquisition failed");
                    effects.push(Effect::Notify(Notice::CaptureFailed(error.to_string())));
                }
            }
            CaptureEvent::FinalizeRequested => self.on_finalize(&mut effects),
            CaptureEvent::CancelRequested => {
                if self.state.accepts_capture() {
                    info!(session_id = %self.session_id, slots = self.slots.len(), "Session cancelled");
                    self.start_fresh_session(&mut effects);
                    effects.push(Effect::Notify(Notice::Cancelled));
                }
            }
            CaptureEvent::UploadProgress { session_id, percent } => {
                self.on_progress(session_id, percent, &mut effects)
            }
            CaptureEvent::TransportFinished { session_id, result } => {
                self.on_transport_finished(session_id, result, &mut effects)
            }
            CaptureEvent::BackendReachability(reachable) => {
                self.on_reachability(reachable, &mut effects)
            }
            CaptureEvent::Detached => {
                if self.state.in_flight() {
                    info!(session_id = %self.session_id, "Left screen during upload; outcome goes to history only");
                    self.abandoned.insert(self.session_id);
                }
                self.start_fresh_session(&mut effects);
            }
            CaptureEvent::RestartRequested => {
                if self.state.is_terminal() {
                    self.start_fresh_session(&mut effects);
                }
            }
        }
        effects
    }

    fn auto_allowed(&self) -> bool {
        self.config.auto_capture
            && !self.auto_fired
            && !(self.config.suppress_auto_when_unreachable && self.reachable == Some(false))
    }

    /// Arm the auto-capture timer unless one is armed or a capture is running.
    fn maybe_arm(&mut self, effects: &mut Vec<Effect>) {
        if self.state != CaptureState::ReadyEmpty
            || self.armed.is_some()
            || self.capturing
            || !self.auto_allowed()
        {
            return;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed = Some(generation);
        debug!(session_id = %self.session_id, generation, "Auto-capture timer armed");
        effects.push(Effect::ArmTimer {
            generation,
            delay: self.config.auto_capture_delay,
        });
    }

    fn disarm(&mut self, effects: &mut Vec<Effect>) {
        if self.armed.take().is_some() {
            effects.push(Effect::DisarmTimer);
        }
    }

    fn on_camera_ready(&mut self, effects: &mut Vec<Effect>) {
        match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::ReadyEmpty;
                effects.push(Effect::Notify(Notice::CameraReady));
                self.maybe_arm(effects);
            }
            // Repeated readiness callbacks: arming is idempotent.
            CaptureState::ReadyEmpty => self.maybe_arm(effects),
            _ => debug!(state = self.state.name(), "Camera ready ignored"),
        }
    }

    fn on_capture_requested(&mut self, trigger: Trigger, effects: &mut Vec<Effect>) {
        if let Trigger::Timer { generation } = trigger {
            if self.armed != Some(generation) {
                debug!(generation, armed = ?self.armed, "Stale timer fire ignored");
                return;
            }
            self.armed = None;
            self.auto_fired = true;
        }

        if !self.state.accepts_capture() || self.capturing {
            debug!(state = self.state.name(), capturing = self.capturing, "Capture request ignored");
            return;
        }
        let max = self.config.capacity();
        if self.slots.len() >= max {
            effects.push(Effect::Notify(Notice::MaximumReached { max }));
            return;
        }

        // A manual shot supersedes a pending auto shot.
        self.disarm(effects);
        self.capturing = true;
        effects.push(Effect::AcquireFrame {
            session_id: self.session_id,
            slot: self.config.slot_label(self.slots.len()),
        });
    }

    fn on_frame_acquired(&mut self, session_id: SessionId, image: CapturedImage, effects: &mut Vec<Effect>) {
        if session_id != self.session_id || !self.capturing {
            debug!(session_id = %session_id, "Frame for a stale session dropped");
            return;
        }
        self.capturing = false;
        if !self.state.accepts_capture() || self.slots.len() >= self.config.capacity() {
            debug!(state = self.state.name(), "Frame arrived after slots froze; dropped");
            return;
        }
        let slot = image.slot_label;
        self.slots.push(image);
        self.state = CaptureState::AwaitingMore;
        effects.push(Effect::Notify(Notice::Captured {
            count: self.slots.len(),
            max: self.config.capacity(),
            slot,
        }));
    }

    fn on_finalize(&mut self, effects: &mut Vec<Effect>) {
        if !self.state.accepts_capture() {
            debug!(state = self.state.name(), "Finalize ignored");
            return;
        }
        if self.slots.is_empty() {
            effects.push(Effect::Notify(Notice::NoPhotosYet));
            return;
        }
        if self.capturing {
            debug!("Finalize ignored while a frame is being acquired");
            return;
        }
        self.disarm(effects);
        self.state = CaptureState::Uploading;
        self.progress = 0;
        info!(session_id = %self.session_id, images = self.slots.len(), "Finalizing batch");
        effects.push(Effect::Notify(Notice::Uploading {
            images: self.slots.len(),
        }));
        effects.push(Effect::Upload {
            session_id: self.session_id,
            batch: self.slots.clone(),
        });
    }

    fn on_progress(&mut self, session_id: SessionId, percent: u8, effects: &mut Vec<Effect>) {
        if session_id != self.session_id || !self.state.in_flight() {
            return;
        }
        self.progress = self.progress.max(percent.min(100));
        // Every byte is on the wire at 99; the server is extracting from then on.
        let stage = if self.progress >= 99 {
            ProcessingStage::Extracting
        } else {
            ProcessingStage::Uploading
        };
        if self.state != CaptureState::Processing(stage) {
            self.state = CaptureState::Processing(stage);
            effects.push(Effect::Notify(Notice::Stage(stage)));
        }
    }

    fn on_transport_finished(
        &mut self,
        session_id: SessionId,
        result: Result<ScanResponse, TransportError>,
        effects: &mut Vec<Effect>,
    ) {
        if session_id != self.session_id {
            if self.abandoned.remove(&session_id) {
                match result {
                    Ok(response) if !response.record.is_empty() => effects.push(Effect::Persist {
                        session_id,
                        record: response.record,
                    }),
                    Ok(_) => debug!(session_id = %session_id, "Abandoned session read nothing"),
                    Err(e) => warn!(session_id = %session_id, error = %e, "Abandoned session upload failed"),
                }
            } else {
                warn!(session_id = %session_id, "Transport outcome for unknown session ignored");
            }
            return;
        }
        if !self.state.in_flight() {
            warn!(state = self.state.name(), "Transport outcome outside an upload ignored");
            return;
        }

        match result {
            Ok(response) if response.record.is_empty() => {
                info!(session_id = %session_id, "No label fields could be read");
                self.state = CaptureState::Failed(FailureReason::UnreadableLabel);
                effects.push(Effect::Notify(Notice::UnreadableLabel));
            }
            Ok(response) => {
                let record = response.record;
                self.progress = 100;
                effects.push(Effect::Notify(Notice::Stage(ProcessingStage::Complete)));
                effects.push(Effect::Persist {
                    session_id,
                    record: record.clone(),
                });
                effects.push(Effect::Notify(Notice::Done {
                    summary: record.summary(),
                }));
                self.state = CaptureState::Done(record);
            }
            Err(e) => {
                effects.push(Effect::Notify(Notice::TransportFailed {
                    kind: e.kind(),
                    message: e.to_string(),
                }));
                self.state = CaptureState::Failed(FailureReason::Transport(e));
            }
        }
    }

    fn on_reachability(&mut self, reachable: bool, effects: &mut Vec<Effect>) {
        let previous = self.reachable.replace(reachable);
        if reachable {
            self.maybe_arm(effects);
            return;
        }
        if previous != Some(false) {
            effects.push(Effect::Notify(Notice::BackendUnreachable));
        }
        if self.config.suppress_auto_when_unreachable {
            self.disarm(effects);
        }
    }

    /// Throw away the current session and start over in `Idle`.
    fn start_fresh_session(&mut self, effects: &mut Vec<Effect>) {
        self.disarm(effects);
        self.session_id = Uuid::new_v4();
        self.state = CaptureState::Idle;
        self.slots.clear();
        self.capturing = false;
        self.auto_fired = false;
        self.progress = 0;
    }
}
