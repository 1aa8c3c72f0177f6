//! Async executor for the capture state machine.
//!
//! Every event, whether from the operator, a timer, the camera or the
//! transport, goes through one channel and is handled in arrival order.
//! Effects are run as spawned tasks that report back as events.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use labelscan_core::{CapturedImage, HistorySink, ScanTransport, SessionId};
use labelscan_logging::{ScanEvent, ScanEventLogger};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::config::CaptureConfig;
use crate::machine::CaptureMachine;
use crate::notifier::{Feedback, Notifier};
use crate::state::{CaptureEvent, CaptureState, Effect, Notice, Trigger};

/// External collaborators of a capture session.
#[derive(Clone)]
pub struct CaptureDeps {
    pub camera: Arc<dyn Camera>,
    pub transport: Arc<dyn ScanTransport>,
    pub history: Arc<dyn HistorySink>,
    pub notifier: Arc<dyn Notifier>,
}

/// Read-only view of the machine published after every event.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSnapshot {
    pub session_id: SessionId,
    pub state: CaptureState,
    pub slots: usize,
    pub max_slots: usize,
    pub capturing: bool,
    pub progress: u8,
    pub reachable: Option<bool>,
}

impl CaptureSnapshot {
    fn of(machine: &CaptureMachine) -> Self {
        Self {
            session_id: machine.session_id(),
            state: machine.state().clone(),
            slots: machine.slots().len(),
            max_slots: machine.config().capacity(),
            capturing: machine.is_capturing(),
            progress: machine.progress(),
            reachable: machine.reachable(),
        }
    }
}

/// Operator-side handle to a running driver.
///
/// Dropping every handle lets the driver finish outstanding work (an upload
/// in flight still reaches history) and then stop.
#[derive(Clone)]
pub struct CaptureHandle {
    events: mpsc::UnboundedSender<CaptureEvent>,
    snapshot: watch::Receiver<CaptureSnapshot>,
}

impl CaptureHandle {
    pub fn send(&self, event: CaptureEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("capture driver has stopped"))
    }

    pub fn camera_ready(&self) -> Result<()> {
        self.send(CaptureEvent::CameraReady)
    }

    pub fn capture(&self) -> Result<()> {
        self.send(CaptureEvent::CaptureRequested(Trigger::Manual))
    }

    pub fn finalize(&self) -> Result<()> {
        self.send(CaptureEvent::FinalizeRequested)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(CaptureEvent::CancelRequested)
    }

    pub fn detach(&self) -> Result<()> {
        self.send(CaptureEvent::Detached)
    }

    pub fn restart(&self) -> Result<()> {
        self.send(CaptureEvent::RestartRequested)
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `pred`.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&CaptureSnapshot) -> bool,
    ) -> Result<CaptureSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| anyhow!("capture driver has stopped"))?;
        Ok(snapshot.clone())
    }
}

pub struct CaptureDriver {
    machine: CaptureMachine,
    deps: CaptureDeps,
    inbox: mpsc::UnboundedReceiver<CaptureEvent>,
    events: mpsc::WeakUnboundedSender<CaptureEvent>,
    timer: Option<JoinHandle<()>>,
    snapshot: watch::Sender<CaptureSnapshot>,
}

impl CaptureDriver {
    /// Start a driver task for a fresh session and check backend health.
    pub fn spawn(config: CaptureConfig, deps: CaptureDeps) -> (CaptureHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let machine = CaptureMachine::new(config);
        let (snapshot, snapshot_rx) = watch::channel(CaptureSnapshot::of(&machine));

        let driver = Self {
            machine,
            deps,
            inbox,
            events: tx.downgrade(),
            timer: None,
            snapshot,
        };
        driver.check_health(tx.clone());

        let task = tokio::spawn(driver.run());
        (
            CaptureHandle {
                events: tx,
                snapshot: snapshot_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            self.dispatch(event);
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        debug!("Capture driver stopped");
    }

    fn check_health(&self, tx: mpsc::UnboundedSender<CaptureEvent>) {
        let transport = Arc::clone(&self.deps.transport);
        tokio::spawn(async move {
            let reachable = transport.check_health().await;
            let _ = tx.send(CaptureEvent::BackendReachability(reachable));
        });
    }

    fn dispatch(&mut self, event: CaptureEvent) {
        let before = self.machine.state().name();
        let session_id = self.machine.session_id();
        let effects = self.machine.handle(event);

        let after = self.machine.state().name();
        if before != after {
            ScanEventLogger::log_event(
                &session_id.to_string(),
                ScanEvent::StateChanged {
                    from: before.into(),
                    to: after.into(),
                },
            );
        }
        for effect in effects {
            self.execute(effect);
        }
        self.snapshot.send_replace(CaptureSnapshot::of(&self.machine));
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::ArmTimer { generation, delay } => {
                self.cancel_timer();
                let Some(tx) = self.events.upgrade() else { return };
                self.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(CaptureEvent::CaptureRequested(Trigger::Timer { generation }));
                }));
            }
            Effect::DisarmTimer => self.cancel_timer(),
            Effect::AcquireFrame { session_id, slot } => {
                let Some(tx) = self.events.upgrade() else { return };
                let camera = Arc::clone(&self.deps.camera);
                tokio::spawn(async move {
                    let event = match camera.acquire(slot).await {
                        Ok(handle) => CaptureEvent::FrameAcquired {
                            session_id,
                            image: CapturedImage::new(handle, slot),
                        },
                        Err(error) => CaptureEvent::CaptureFailed { session_id, error },
                    };
                    let _ = tx.send(event);
                });
            }
            Effect::Upload { session_id, batch } => self.start_upload(session_id, batch),
            Effect::Notify(notice) => self.notify(notice),
            Effect::Persist { session_id, record } => {
                let history = Arc::clone(&self.deps.history);
                tokio::spawn(async move {
                    if let Err(e) = history.record(session_id, &record).await {
                        warn!(session_id = %session_id, error = %e, "Failed to persist scan record");
                    }
                });
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn start_upload(&self, session_id: SessionId, batch: Vec<CapturedImage>) {
        let Some(tx) = self.events.upgrade() else { return };
        let transport = Arc::clone(&self.deps.transport);
        ScanEventLogger::log_event(
            &session_id.to_string(),
            ScanEvent::UploadStarted { images: batch.len() },
        );

        tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let forward_tx = tx.clone();
            let forward = tokio::spawn(async move {
                while let Some(percent) = progress_rx.recv().await {
                    let _ = forward_tx.send(CaptureEvent::UploadProgress { session_id, percent });
                }
            });

            let result = transport.upload(session_id, &batch, progress_tx).await;
            forward.abort();

            let event = match &result {
                Ok(response) => ScanEvent::UploadFinished {
                    empty: response.record.is_empty(),
                    confidence: response.record.confidence,
                },
                Err(e) => ScanEvent::UploadFailed {
                    kind: e.kind().into(),
                    message: e.to_string(),
                },
            };
            ScanEventLogger::log_event(&session_id.to_string(), event);
            let _ = tx.send(CaptureEvent::TransportFinished { session_id, result });
        });
    }

    fn notify(&self, notice: Notice) {
        let config = self.machine.config();
        let feedback = Feedback {
            voice: config.voice,
            haptic: config.haptics && notice.is_haptic(),
        };
        self.deps.notifier.notify(&notice, feedback);

        let session_id = self.machine.session_id().to_string();
        let event = match &notice {
            Notice::Captured { count, slot, .. } => ScanEvent::ImageCaptured {
                slot: slot.map(|s| s.to_string()),
                count: *count,
            },
            other => ScanEvent::Notice {
                message: other.message(),
            },
        };
        ScanEventLogger::log_event(&session_id, event);
    }
}
