use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::SessionSample;
use crate::pose::PostureMetrics;
use crate::posture::PostureStatus;

/// A persisted posture reading. `client_timestamp` is when the frame was
/// scored, `created_at` is when the row was written; analytics bucket by
/// `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostureSample {
    pub id: String,
    pub uid: String,
    pub session_id: Option<String>,
    pub score: Option<u8>,
    pub status: PostureStatus,
    pub metrics: PostureMetrics,
    pub client_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PostureSample {
    pub fn from_session_sample(sample: SessionSample, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uid: sample.uid,
            session_id: sample.session_id,
            score: Some(sample.score),
            status: sample.status,
            metrics: sample.metrics,
            client_timestamp: sample.timestamp,
            created_at,
        }
    }
}
