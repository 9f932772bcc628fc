//! Boundaries to the storage side: the write path for periodic posture
//! samples and the read path for weekly analytics.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsSummary;
use crate::pose::PostureMetrics;
use crate::posture::{PostureStatus, Snapshot};

/// Payload written once per persistence tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSample {
    pub uid: String,
    pub session_id: Option<String>,
    pub score: u8,
    pub status: PostureStatus,
    pub metrics: PostureMetrics,
    pub timestamp: DateTime<Utc>,
}

impl SessionSample {
    pub fn from_snapshot(uid: &str, session_id: Option<&str>, snapshot: &Snapshot) -> Self {
        Self {
            uid: uid.to_string(),
            session_id: session_id.map(str::to_string),
            score: snapshot.score,
            status: snapshot.status,
            metrics: snapshot.metrics,
            timestamp: snapshot.timestamp,
        }
    }
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Callers treat failures as non-fatal: log and move on, no retry.
    async fn record_sample(&self, sample: SessionSample) -> Result<()>;
}

#[async_trait]
pub trait AnalyticsQuery: Send + Sync {
    async fn weekly_summary(&self, uid: &str) -> Result<AnalyticsSummary>;
}
