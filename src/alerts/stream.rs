use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::posture::{PostureStatus, Snapshot};
use crate::wellness::WellnessMetrics;

pub const MAX_ALERTS: usize = 5;
const LOW_BLINK_RATE: u32 = 5;
const DEFAULT_POSTURE_PROMPT: &str = "Adjust your posture";
const LOW_BLINK_MESSAGE: &str =
    "Low blink rate detected. Look away from the screen and blink a few times.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Good,
    Warning,
    Bad,
    Unknown,
    Info,
}

impl From<PostureStatus> for AlertSeverity {
    fn from(status: PostureStatus) -> Self {
        match status {
            PostureStatus::Good => AlertSeverity::Good,
            PostureStatus::Warning => AlertSeverity::Warning,
            PostureStatus::Bad => AlertSeverity::Bad,
            PostureStatus::Unknown => AlertSeverity::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertConfig {
    pub break_interval: Duration,
    pub wellness_interval: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            break_interval: Duration::minutes(45),
            wellness_interval: Duration::minutes(20),
        }
    }
}

/// Alert feed for one session: posture transitions, low-blink reminders and
/// the break timer. `alerts` is newest-first and never longer than
/// [`MAX_ALERTS`].
#[derive(Debug, Clone)]
pub struct AlertStream {
    config: AlertConfig,
    alerts: Vec<Alert>,
    last_status: PostureStatus,
    last_wellness_alert: DateTime<Utc>,
    break_due: bool,
    session_start: DateTime<Utc>,
}

impl AlertStream {
    pub fn new(config: AlertConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            alerts: Vec::with_capacity(MAX_ALERTS + 1),
            last_status: PostureStatus::Unknown,
            last_wellness_alert: now,
            break_due: false,
            session_start: now,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(self.config, now);
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn last_status(&self) -> PostureStatus {
        self.last_status
    }

    pub fn break_due(&self) -> bool {
        self.break_due
    }

    /// Feed one snapshot through the posture, wellness and break checks.
    /// Returns the alerts raised by this snapshot, oldest first.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Vec<Alert> {
        let mut raised = Vec::new();

        if snapshot.status != PostureStatus::Good && snapshot.status != self.last_status {
            let alert = Alert {
                id: format!(
                    "{}-{}",
                    snapshot.timestamp.timestamp_millis(),
                    snapshot.status.as_str()
                ),
                message: snapshot
                    .headline_issue()
                    .unwrap_or(DEFAULT_POSTURE_PROMPT)
                    .to_string(),
                severity: snapshot.status.into(),
                timestamp: snapshot.timestamp,
            };
            self.push(alert.clone());
            raised.push(alert);
        }
        self.last_status = snapshot.status;

        if let Some(wellness) = &snapshot.wellness {
            if let Some(alert) = self.check_wellness(wellness, snapshot.timestamp) {
                raised.push(alert);
            }
        }

        self.check_break(snapshot.timestamp);

        raised
    }

    /// Emits at most one low-blink reminder per `wellness_interval`.
    pub fn check_wellness(
        &mut self,
        wellness: &WellnessMetrics,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if wellness.blink_rate >= LOW_BLINK_RATE {
            return None;
        }
        if now - self.last_wellness_alert <= self.config.wellness_interval {
            return None;
        }

        self.last_wellness_alert = now;
        let alert = Alert {
            id: format!("{}-wellness", now.timestamp_millis()),
            message: LOW_BLINK_MESSAGE.to_string(),
            severity: AlertSeverity::Info,
            timestamp: now,
        };
        self.push(alert.clone());
        Some(alert)
    }

    /// Returns `true` only on the call that flips the break flag on.
    pub fn check_break(&mut self, now: DateTime<Utc>) -> bool {
        if self.break_due {
            return false;
        }
        if now - self.session_start > self.config.break_interval {
            self.break_due = true;
            return true;
        }
        false
    }

    /// Clears the break flag and restarts the break clock.
    pub fn acknowledge_break(&mut self, now: DateTime<Utc>) {
        self.break_due = false;
        self.session_start = now;
    }

    fn push(&mut self, alert: Alert) {
        self.alerts.insert(0, alert);
        self.alerts.truncate(MAX_ALERTS);
    }
}
