use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::Duration;

use crate::alerts::{Alert, AlertConfig};
use crate::posture::Snapshot;
use crate::settings::PipelineSettings;
use crate::wellness::DEFAULT_BLINK_PROBABILITY;

const EMITTED_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PipelineStatus {
    Idle,
    Running,
    DetectorUnavailable { reason: String },
    Stopped { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    AcknowledgeBreak,
}

/// How the capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    Cancelled,
    SourceLost(String),
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Frames closer together than this are dropped.
    pub min_frame_interval: Duration,
    /// Minimum spacing of snapshots on the emitted feed.
    pub emit_interval: Duration,
    pub break_check_interval: Duration,
    pub unavailable_backoff: Duration,
    pub alerts: AlertConfig,
    pub blink_probability: f64,
    pub blink_seed: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_frame_interval: Duration::from_millis(100),
            emit_interval: Duration::from_millis(200),
            break_check_interval: Duration::from_secs(60),
            unavailable_backoff: Duration::from_millis(500),
            alerts: AlertConfig::default(),
            blink_probability: DEFAULT_BLINK_PROBABILITY,
            blink_seed: None,
        }
    }
}

impl From<&PipelineSettings> for CaptureConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            min_frame_interval: Duration::from_millis(settings.min_frame_interval_ms),
            emit_interval: Duration::from_millis(settings.emit_interval_ms),
            alerts: AlertConfig {
                break_interval: chrono::Duration::minutes(settings.break_interval_mins as i64),
                wellness_interval: chrono::Duration::minutes(
                    settings.wellness_alert_interval_mins as i64,
                ),
            },
            blink_probability: settings.blink_probability,
            blink_seed: settings.blink_seed,
            ..Self::default()
        }
    }
}

struct FeedChannels {
    latest: watch::Sender<Option<Arc<Snapshot>>>,
    status: watch::Sender<PipelineStatus>,
    alerts: watch::Sender<Vec<Alert>>,
    break_due: watch::Sender<bool>,
    emitted: broadcast::Sender<Arc<Snapshot>>,
}

/// Everything the capture loop publishes. Cloning is cheap; all clones
/// observe the same channels.
///
/// `latest` changes on every scored frame and is what the periodic workers
/// read. The emitted broadcast is rate-limited for display consumers.
#[derive(Clone)]
pub struct CaptureFeed {
    channels: Arc<FeedChannels>,
}

impl Default for CaptureFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureFeed {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(PipelineStatus::Idle);
        let (alerts, _) = watch::channel(Vec::new());
        let (break_due, _) = watch::channel(false);
        let (emitted, _) = broadcast::channel(EMITTED_CAPACITY);
        Self {
            channels: Arc::new(FeedChannels {
                latest,
                status,
                alerts,
                break_due,
                emitted,
            }),
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.channels.latest.borrow().clone()
    }

    pub fn status(&self) -> PipelineStatus {
        self.channels.status.borrow().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.channels.alerts.borrow().clone()
    }

    pub fn break_due(&self) -> bool {
        *self.channels.break_due.borrow()
    }

    pub fn watch_latest(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.channels.latest.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<PipelineStatus> {
        self.channels.status.subscribe()
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.channels.emitted.subscribe()
    }

    pub(crate) fn reset(&self) {
        self.channels.latest.send_replace(None);
        self.channels.alerts.send_replace(Vec::new());
        self.channels.break_due.send_replace(false);
    }

    pub(crate) fn set_latest(&self, snapshot: Arc<Snapshot>) {
        self.channels.latest.send_replace(Some(snapshot));
    }

    pub(crate) fn set_status(&self, status: PipelineStatus) {
        self.channels.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub(crate) fn set_alerts(&self, alerts: &[Alert]) {
        self.channels.alerts.send_replace(alerts.to_vec());
    }

    pub(crate) fn set_break_due(&self, due: bool) {
        self.channels.break_due.send_if_modified(|current| {
            let changed = *current != due;
            *current = due;
            changed
        });
    }

    pub(crate) fn emit(&self, snapshot: Arc<Snapshot>) {
        // No subscribers is fine; the snapshot is still in `latest`.
        let _ = self.channels.emitted.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_state_tag() {
        let status = PipelineStatus::Stopped {
            reason: "camera unplugged".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["reason"], "camera unplugged");

        let json = serde_json::to_value(PipelineStatus::DetectorUnavailable {
            reason: "loading".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "detectorUnavailable");
    }

    #[test]
    fn test_config_follows_settings() {
        let settings = PipelineSettings {
            min_frame_interval_ms: 50,
            break_interval_mins: 30,
            blink_seed: Some(9),
            ..PipelineSettings::default()
        };
        let config = CaptureConfig::from(&settings);
        assert_eq!(config.min_frame_interval, Duration::from_millis(50));
        assert_eq!(config.emit_interval, Duration::from_millis(200));
        assert_eq!(config.alerts.break_interval, chrono::Duration::minutes(30));
        assert_eq!(config.blink_seed, Some(9));
    }

    #[tokio::test]
    async fn test_status_watch_only_wakes_on_change() {
        let feed = CaptureFeed::new();
        let mut rx = feed.watch_status();
        feed.set_status(PipelineStatus::Idle);
        assert!(!rx.has_changed().unwrap());
        feed.set_status(PipelineStatus::Running);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PipelineStatus::Running);
    }
}
