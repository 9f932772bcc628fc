use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::analytics::{aggregate_week, window_start, AnalyticsSummary, ScoreSample};
use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::PostureSample,
};
use crate::gateway::{AnalyticsQuery, PersistenceGateway, SessionSample};
use crate::pose::PostureMetrics;
use crate::posture::PostureStatus;

fn row_to_sample(row: &Row) -> Result<PostureSample> {
    let score: Option<i64> = row.get("score")?;
    let status: String = row.get("status")?;
    let client_timestamp: String = row.get("client_timestamp")?;
    let created_at: String = row.get("created_at")?;

    Ok(PostureSample {
        id: row.get("id")?,
        uid: row.get("uid")?,
        session_id: row.get("session_id")?,
        score: score
            .map(|value| u8::try_from(value).with_context(|| format!("score {value} out of range")))
            .transpose()?,
        status: PostureStatus::parse(&status)?,
        metrics: PostureMetrics {
            spine_angle: row.get("spine_angle")?,
            neck_tilt: row.get("neck_tilt")?,
            shoulder_tilt: row.get("shoulder_tilt")?,
            confidence: row.get("confidence")?,
        },
        client_timestamp: parse_datetime(&client_timestamp, "client_timestamp")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Stores one sample and bumps the owning session's `sample_count` in
    /// the same transaction.
    pub async fn insert_posture_sample(&self, sample: &PostureSample) -> Result<()> {
        let record = sample.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO posture_samples (
                    id, uid, session_id, score, status,
                    spine_angle, neck_tilt, shoulder_tilt, confidence,
                    client_timestamp, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.uid,
                    record.session_id,
                    record.score.map(i64::from),
                    record.status.as_str(),
                    record.metrics.spine_angle,
                    record.metrics.neck_tilt,
                    record.metrics.shoulder_tilt,
                    record.metrics.confidence,
                    format_datetime(&record.client_timestamp),
                    format_datetime(&record.created_at),
                ],
            )
            .context("failed to insert posture sample")?;

            if let Some(session_id) = &record.session_id {
                tx.execute(
                    "UPDATE capture_sessions
                     SET sample_count = sample_count + 1,
                         updated_at = ?1
                     WHERE id = ?2",
                    params![format_datetime(&record.created_at), session_id],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn get_samples_for_session(&self, session_id: &str) -> Result<Vec<PostureSample>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uid, session_id, score, status,
                        spine_angle, neck_tilt, shoulder_tilt, confidence,
                        client_timestamp, created_at
                 FROM posture_samples
                 WHERE session_id = ?1
                 ORDER BY client_timestamp ASC",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }
            Ok(samples)
        })
        .await
    }

    /// Score rows for `uid` with `created_at` in `[start, end]`.
    pub async fn get_scores_in_range(
        &self,
        uid: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScoreSample>> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT uid, score, created_at
                 FROM posture_samples
                 WHERE uid = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query(params![uid, format_datetime(&start), format_datetime(&end)])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                let created_at: String = row.get("created_at")?;
                samples.push(ScoreSample {
                    uid: row.get("uid")?,
                    score: row.get::<_, Option<i64>>("score")?.map(|score| score as f64),
                    created_at: parse_datetime(&created_at, "created_at")?,
                });
            }
            Ok(samples)
        })
        .await
    }

    pub async fn weekly_summary_at(&self, uid: &str, now: DateTime<Utc>) -> Result<AnalyticsSummary> {
        let samples = self.get_scores_in_range(uid, window_start(now), now).await?;
        Ok(aggregate_week(&samples, now))
    }
}

#[async_trait]
impl PersistenceGateway for Database {
    async fn record_sample(&self, sample: SessionSample) -> Result<()> {
        let record = PostureSample::from_session_sample(sample, Utc::now());
        self.insert_posture_sample(&record).await
    }
}

#[async_trait]
impl AnalyticsQuery for Database {
    async fn weekly_summary(&self, uid: &str) -> Result<AnalyticsSummary> {
        self.weekly_summary_at(uid, Utc::now()).await
    }
}
