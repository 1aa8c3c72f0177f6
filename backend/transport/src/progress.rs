use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use labelscan_core::ProgressTx;

/// Converts byte counts into a non-decreasing percentage stream.
///
/// Only strictly larger percentages are forwarded, so a retried body read
/// or a late chunk never moves the value backwards.
pub struct ProgressTracker {
    total: u64,
    sent: AtomicU64,
    last: AtomicU8,
    tx: ProgressTx,
}

impl ProgressTracker {
    pub fn new(total: u64, tx: ProgressTx) -> Self {
        Self {
            total,
            sent: AtomicU64::new(0),
            last: AtomicU8::new(0),
            tx,
        }
    }

    /// Record `bytes` more written to the wire. Stops short of 100 until
    /// [`ProgressTracker::finish`] so completion means the server answered.
    pub fn advance(&self, bytes: usize) {
        let sent = self.sent.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        let pct = if self.total == 0 {
            99
        } else {
            ((sent.min(self.total) * 99) / self.total) as u8
        };
        self.publish(pct);
    }

    pub fn finish(&self) {
        self.publish(100);
    }

    fn publish(&self, pct: u8) {
        let prev = self.last.fetch_max(pct, Ordering::SeqCst);
        if pct > prev {
            // Receiver gone means nobody is watching; progress is advisory.
            let _ = self.tx.send(pct);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_progress_is_monotonic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = ProgressTracker::new(200, tx);
        tracker.advance(100);
        tracker.advance(0);
        tracker.advance(100);
        tracker.advance(50);
        tracker.finish();
        tracker.finish();

        let mut seen = Vec::new();
        while let Ok(pct) = rx.try_recv() {
            seen.push(pct);
        }
        assert_eq!(seen, vec![49, 99, 100]);
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = ProgressTracker::new(10, tx);
        tracker.advance(10);
        tracker.finish();
    }
}
