use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alerts::{Alert, AlertStream};
use crate::pose::{extract_metrics, Frame};
use crate::posture::{evaluate, Snapshot};
use crate::source::{KeypointSource, SourceError};
use crate::wellness::{WellnessEstimator, WellnessMetrics};

use super::state::{CaptureCommand, CaptureConfig, CaptureExit, CaptureFeed, PipelineStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug)]
pub enum FrameOutcome {
    /// Arrived inside the frame-rate ceiling.
    Dropped,
    /// Accepted, but the required joints were missing or unsure.
    Undetermined,
    Scored {
        snapshot: Arc<Snapshot>,
        emit: bool,
        raised: Vec<Alert>,
    },
}

/// Per-session scoring state: frame gate, wellness counters and the alert
/// stream. Only the capture task touches it.
pub struct FrameProcessor {
    config: CaptureConfig,
    estimator: WellnessEstimator,
    alerts: AlertStream,
    last_accepted: Option<Instant>,
    last_emitted: Option<Instant>,
    last_wellness: Option<WellnessMetrics>,
}

impl FrameProcessor {
    pub fn new(config: CaptureConfig, now: DateTime<Utc>) -> Self {
        let estimator =
            WellnessEstimator::with_probability(config.blink_probability, config.blink_seed, now);
        Self::with_estimator(config, estimator, now)
    }

    pub fn with_estimator(
        config: CaptureConfig,
        estimator: WellnessEstimator,
        now: DateTime<Utc>,
    ) -> Self {
        let alerts = AlertStream::new(config.alerts, now);
        Self {
            config,
            estimator,
            alerts,
            last_accepted: None,
            last_emitted: None,
            last_wellness: None,
        }
    }

    /// Starts a fresh session timeline: wellness counters, alert history,
    /// the break clock and both rate gates.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.estimator.reset(now);
        self.alerts.reset(now);
        self.last_accepted = None;
        self.last_emitted = None;
        self.last_wellness = None;
    }

    pub fn alerts(&self) -> &[Alert] {
        self.alerts.alerts()
    }

    pub fn break_due(&self) -> bool {
        self.alerts.break_due()
    }

    pub fn check_break(&mut self, now: DateTime<Utc>) -> bool {
        self.alerts.check_break(now)
    }

    pub fn acknowledge_break(&mut self, now: DateTime<Utc>) {
        self.alerts.acknowledge_break(now);
    }

    /// Runs one frame through extraction, classification, wellness and
    /// alerts. `at` drives the frame and emit gates, `now` stamps the result.
    pub fn process(&mut self, frame: &Frame, at: Instant, now: DateTime<Utc>) -> FrameOutcome {
        if let Some(last) = self.last_accepted {
            if at.saturating_duration_since(last) < self.config.min_frame_interval {
                return FrameOutcome::Dropped;
            }
        }
        self.last_accepted = Some(at);

        if let Some(wellness) = self.estimator.update(frame, now) {
            self.last_wellness = Some(wellness);
        }

        let Some(metrics) = extract_metrics(frame) else {
            return FrameOutcome::Undetermined;
        };

        let snapshot = Snapshot::new(metrics, self.last_wellness, evaluate(&metrics), now);
        let raised = self.alerts.on_snapshot(&snapshot);

        let emit = match self.last_emitted {
            Some(last) => at.saturating_duration_since(last) >= self.config.emit_interval,
            None => true,
        };
        if emit {
            self.last_emitted = Some(at);
        }

        FrameOutcome::Scored {
            snapshot: Arc::new(snapshot),
            emit,
            raised,
        }
    }
}

/// The single processing timeline for one session. Polls `source` serially
/// until cancelled or the source is lost, then releases it.
pub async fn capture_loop(
    mut source: Box<dyn KeypointSource>,
    mut processor: FrameProcessor,
    feed: CaptureFeed,
    mut commands: mpsc::UnboundedReceiver<CaptureCommand>,
    break_check_interval: tokio::time::Duration,
    unavailable_backoff: tokio::time::Duration,
    cancel_token: CancellationToken,
) -> CaptureExit {
    let mut break_ticker = tokio::time::interval_at(
        Instant::now() + break_check_interval,
        break_check_interval,
    );
    break_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    processor.reset(Utc::now());
    feed.set_status(PipelineStatus::Running);
    let mut detector_down = false;

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break CaptureExit::Cancelled;
            }
            Some(command) = commands.recv() => match command {
                CaptureCommand::AcknowledgeBreak => {
                    processor.acknowledge_break(Utc::now());
                    feed.set_break_due(false);
                }
            },
            _ = break_ticker.tick() => {
                if processor.check_break(Utc::now()) {
                    log_info!("break reminder due");
                    feed.set_break_due(true);
                }
            }
            result = source.next_frame() => match result {
                Ok(frame) => {
                    if detector_down {
                        log_info!("keypoint detector available again");
                        detector_down = false;
                        feed.set_status(PipelineStatus::Running);
                    }
                    let outcome = processor.process(&frame, Instant::now(), Utc::now());
                    publish(&feed, &processor, outcome);
                }
                Err(SourceError::Unavailable(reason)) => {
                    if !detector_down {
                        log_warn!("keypoint detector unavailable: {}", reason);
                        detector_down = true;
                    }
                    feed.set_status(PipelineStatus::DetectorUnavailable { reason });
                    tokio::select! {
                        _ = tokio::time::sleep(unavailable_backoff) => {}
                        _ = cancel_token.cancelled() => {
                            log_info!("capture loop shutting down");
                            break CaptureExit::Cancelled;
                        }
                    }
                }
                Err(SourceError::Lost(reason)) => {
                    log_error!("keypoint source lost: {}", reason);
                    break CaptureExit::SourceLost(reason);
                }
            },
        }
    };

    source.release().await;

    match &exit {
        CaptureExit::Cancelled => feed.set_status(PipelineStatus::Idle),
        CaptureExit::SourceLost(reason) => feed.set_status(PipelineStatus::Stopped {
            reason: reason.clone(),
        }),
    }
    exit
}

fn publish(feed: &CaptureFeed, processor: &FrameProcessor, outcome: FrameOutcome) {
    match outcome {
        FrameOutcome::Dropped | FrameOutcome::Undetermined => {}
        FrameOutcome::Scored {
            snapshot,
            emit,
            raised,
        } => {
            if !raised.is_empty() {
                for alert in &raised {
                    log_debug!("alert {}: {}", alert.id, alert.message);
                }
                feed.set_alerts(processor.alerts());
            }
            feed.set_break_due(processor.break_due());
            feed.set_latest(Arc::clone(&snapshot));
            if emit {
                feed.emit(snapshot);
            }
        }
    }
}
