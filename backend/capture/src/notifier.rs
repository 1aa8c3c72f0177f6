use tracing::info;

use crate::state::Notice;

/// Which feedback channels the operator enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feedback {
    pub voice: bool,
    pub haptic: bool,
}

/// Operator feedback seam (toast, speech, vibration). Fire-and-forget:
/// nothing here can affect the state machine.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice, feedback: Feedback);
}

/// Writes notices to the log; used by the headless CLI.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice, feedback: Feedback) {
        info!(
            target: "labelscan::notice",
            speak = feedback.voice,
            haptic = feedback.haptic,
            "{}",
            notice.message()
        );
    }
}
