use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pose::PostureMetrics;
use crate::wellness::WellnessMetrics;

use super::classifier::{Evaluation, PostureStatus};

/// One scored frame. Built once and shared as `Arc<Snapshot>`; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub metrics: PostureMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wellness: Option<WellnessMetrics>,
    pub status: PostureStatus,
    pub score: u8,
    pub issues: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        metrics: PostureMetrics,
        wellness: Option<WellnessMetrics>,
        evaluation: Evaluation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            metrics,
            wellness,
            status: evaluation.status,
            score: evaluation.score,
            issues: evaluation.issues,
            timestamp,
        }
    }

    pub fn headline_issue(&self) -> Option<&str> {
        self.issues.first().map(String::as_str)
    }
}
