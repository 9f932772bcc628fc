use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::KeypointSource;

use super::loop_worker::{capture_loop, FrameProcessor};
use super::state::{CaptureCommand, CaptureConfig, CaptureExit, CaptureFeed};

/// Owns the capture task for at most one session at a time.
pub struct CaptureController {
    feed: CaptureFeed,
    handle: Option<JoinHandle<CaptureExit>>,
    cancel_token: Option<CancellationToken>,
    command_tx: Option<mpsc::UnboundedSender<CaptureCommand>>,
}

impl CaptureController {
    pub fn new(feed: CaptureFeed) -> Self {
        Self {
            feed,
            handle: None,
            cancel_token: None,
            command_tx: None,
        }
    }

    pub fn feed(&self) -> &CaptureFeed {
        &self.feed
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_capture(
        &mut self,
        source: Box<dyn KeypointSource>,
        config: CaptureConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture already active");
        }

        // A new session starts without the previous session's snapshot,
        // alerts or break flag.
        self.feed.reset();

        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let break_check_interval = config.break_check_interval;
        let unavailable_backoff = config.unavailable_backoff;
        let processor = FrameProcessor::new(config, Utc::now());

        let handle = tokio::spawn(capture_loop(
            source,
            processor,
            self.feed.clone(),
            command_rx,
            break_check_interval,
            unavailable_backoff,
            cancel_token.clone(),
        ));

        info!("capture started");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.command_tx = Some(command_tx);
        Ok(())
    }

    pub fn acknowledge_break(&self) -> Result<()> {
        let Some(tx) = &self.command_tx else {
            bail!("capture not active");
        };
        tx.send(CaptureCommand::AcknowledgeBreak)
            .context("capture loop is no longer running")
    }

    /// Cancels the loop and waits for it, so the source has been released
    /// by the time this returns. `None` when nothing was running.
    pub async fn stop_capture(&mut self) -> Result<Option<CaptureExit>> {
        self.command_tx = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            let exit = handle.await.context("capture loop task failed to join")?;
            info!("capture stopped: {exit:?}");
            Ok(Some(exit))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PipelineStatus;
    use crate::pose::metrics::tests::upright_frame;
    use crate::source::ReplaySource;
    use std::sync::atomic::Ordering;
    use tokio::time::Duration;

    fn long_replay() -> ReplaySource {
        ReplaySource::from_frames(
            std::iter::repeat_with(upright_frame).take(1_000),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut controller = CaptureController::new(CaptureFeed::new());
        controller
            .start_capture(Box::new(long_replay()), CaptureConfig::default())
            .unwrap();
        assert!(controller
            .start_capture(Box::new(long_replay()), CaptureConfig::default())
            .is_err());
        controller.stop_capture().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_waits_for_release() {
        let mut controller = CaptureController::new(CaptureFeed::new());
        let source = long_replay();
        let released = source.released_flag();
        controller
            .start_capture(Box::new(source), CaptureConfig::default())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(controller.feed().latest().is_some());

        let exit = controller.stop_capture().await.unwrap();
        assert_eq!(exit, Some(CaptureExit::Cancelled));
        assert!(released.load(Ordering::SeqCst));
        assert!(!controller.is_active());
        assert_eq!(controller.feed().status(), PipelineStatus::Idle);
        assert_eq!(controller.stop_capture().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_acknowledge_requires_active_capture() {
        let mut controller = CaptureController::new(CaptureFeed::new());
        assert!(controller.acknowledge_break().is_err());
        controller
            .start_capture(Box::new(long_replay()), CaptureConfig::default())
            .unwrap();
        controller.acknowledge_break().unwrap();
        controller.stop_capture().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_clears_previous_session() {
        let mut controller = CaptureController::new(CaptureFeed::new());
        controller
            .start_capture(Box::new(long_replay()), CaptureConfig::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop_capture().await.unwrap();
        assert!(controller.feed().latest().is_some());

        let idle = ReplaySource::from_frames(Vec::new(), Duration::from_secs(60));
        controller
            .start_capture(Box::new(idle), CaptureConfig::default())
            .unwrap();
        assert!(controller.feed().latest().is_none());
        controller.stop_capture().await.unwrap();
    }
}
