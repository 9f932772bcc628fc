use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u64},
    models::{CaptureSession, SessionStatus},
};

const SESSION_COLUMNS: &str =
    "id, uid, started_at, stopped_at, status, sample_count, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<CaptureSession> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;
    let sample_count: i64 = row.get("sample_count")?;

    Ok(CaptureSession {
        id: row.get("id")?,
        uid: row.get("uid")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        sample_count: to_u64(sample_count, "sample_count")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &CaptureSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO capture_sessions (id, uid, started_at, stopped_at, status, sample_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.uid,
                    format_datetime(&record.started_at),
                    record.stopped_at.as_ref().map(format_datetime),
                    record.status.as_str(),
                    to_i64(record.sample_count)?,
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        stopped_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE capture_sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    status.as_str(),
                    stopped_at.as_ref().map(format_datetime),
                    format_datetime(&updated_at),
                    session_id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(anyhow::anyhow!("Session {session_id} not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mark_session_status(
            session_id,
            SessionStatus::Interrupted,
            Some(stopped_at),
            stopped_at,
        )
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<CaptureSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM capture_sessions WHERE id = ?1");
            let session = conn
                .query_row(&sql, params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    /// Sessions still marked `Running`, newest first. After a restart these
    /// are leftovers from a process that never closed them.
    pub async fn get_incomplete_sessions(&self) -> Result<Vec<CaptureSession>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM capture_sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn list_sessions_for_uid(
        &self,
        uid: &str,
        limit: usize,
    ) -> Result<Vec<CaptureSession>> {
        let uid = uid.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM capture_sessions
                 WHERE uid = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![uid, limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
