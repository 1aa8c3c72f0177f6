//! Headless capture session: each file plays the part of one camera shot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::time::timeout;
use tracing::info;

use labelscan_capture::{
    CaptureDeps, CaptureDriver, CaptureHandle, CaptureSnapshot, CaptureState, FileCamera,
    LogNotifier, MemoryHistory,
};
use labelscan_config::LabelScanConfig;
use labelscan_transport::HttpTransport;

use crate::config::{capture_config, transport_settings};

const SHOT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: &LabelScanConfig, files: Vec<PathBuf>, auto: bool) -> Result<()> {
    let mut capture = capture_config(config);
    if files.len() > capture.capacity() {
        bail!(
            "{} files given but a session holds at most {} photos",
            files.len(),
            capture.capacity()
        );
    }
    for file in &files {
        if !file.is_file() {
            bail!("{} is not a readable file", file.display());
        }
    }
    capture.auto_capture = auto;

    let settings = transport_settings(config);
    let deadline = settings.watchdog_timeout + SHOT_TIMEOUT;
    let transport = HttpTransport::new(settings)?;
    let deps = CaptureDeps {
        camera: Arc::new(FileCamera::new(files.clone())),
        transport: Arc::new(transport),
        history: Arc::new(MemoryHistory::new()),
        notifier: Arc::new(LogNotifier),
    };

    let (handle, _driver) = CaptureDriver::spawn(capture, deps);
    handle.camera_ready()?;

    for shot in 0..files.len() {
        let auto_shot = auto && shot == 0;
        if !auto_shot {
            wait(&handle, SHOT_TIMEOUT, |s| s.state.accepts_capture() && !s.capturing).await?;
            handle.capture()?;
        }
        wait(&handle, SHOT_TIMEOUT, |s| s.slots > shot)
            .await
            .with_context(|| format!("photo {} was not captured", shot + 1))?;
    }

    handle.finalize()?;
    let done = wait(&handle, deadline, |s| s.state.is_terminal()).await?;
    info!(session = %done.session_id, state = done.state.name(), "Scan session finished");

    match done.state {
        CaptureState::Done(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        CaptureState::Failed(reason) => Err(anyhow!("scan failed: {reason}")),
        other => Err(anyhow!("unexpected final state {}", other.name())),
    }
}

async fn wait(
    handle: &CaptureHandle,
    limit: Duration,
    pred: impl FnMut(&CaptureSnapshot) -> bool,
) -> Result<CaptureSnapshot> {
    timeout(limit, handle.wait_for(pred))
        .await
        .map_err(|_| anyhow!("timed out after {}s", limit.as_secs()))?
}
