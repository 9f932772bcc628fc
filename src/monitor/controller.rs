use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::Alert,
    analytics::{AnalyticsService, AnalyticsSummary},
    capture::{
        persistence_loop, CaptureConfig, CaptureController, CaptureExit, CaptureFeed,
        PipelineStatus, SampleSink,
    },
    db::{CaptureSession, Database, SessionStatus},
    gateway::{AnalyticsQuery, PersistenceGateway},
    posture::Snapshot,
    settings::PipelineSettings,
    source::KeypointSource,
};

/// What a finished session looked like when it was closed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: CaptureSession,
    pub snapshot: Option<Snapshot>,
    pub alerts: Vec<Alert>,
    pub status: PipelineStatus,
    pub analytics: AnalyticsSummary,
}

struct ActiveSession {
    session: CaptureSession,
    sink: SampleSink,
    workers_token: CancellationToken,
    persistence: JoinHandle<Option<Arc<Snapshot>>>,
    analytics: JoinHandle<()>,
}

/// Session lifecycle on top of the capture pipeline: opens the session
/// record, runs the periodic persistence and analytics workers, and closes
/// everything down again.
#[derive(Clone)]
pub struct PostureMonitor {
    db: Database,
    gateway: Arc<dyn PersistenceGateway>,
    query: Arc<dyn AnalyticsQuery>,
    settings: PipelineSettings,
    capture: Arc<Mutex<CaptureController>>,
    analytics: AnalyticsService,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl PostureMonitor {
    pub fn new(db: Database, settings: PipelineSettings) -> Self {
        let settings = settings.normalized();
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(db.clone());
        let query: Arc<dyn AnalyticsQuery> = Arc::new(db.clone());
        let analytics =
            AnalyticsService::new(Duration::from_secs(settings.analytics_timeout_secs));

        Self {
            db,
            gateway,
            query,
            settings,
            capture: Arc::new(Mutex::new(CaptureController::new(CaptureFeed::new()))),
            analytics,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn feed(&self) -> CaptureFeed {
        self.capture.lock().await.feed().clone()
    }

    pub fn analytics(&self) -> AnalyticsSummary {
        self.analytics.current()
    }

    pub async fn active_session(&self) -> Option<CaptureSession> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Fetches the weekly summary for `uid` now, bypassing the cache timer.
    pub async fn refresh_analytics(&self, uid: &str) -> AnalyticsSummary {
        self.analytics.refresh(self.query.as_ref(), uid).await;
        self.analytics.current()
    }

    pub async fn start_session(
        &self,
        uid: &str,
        source: Box<dyn KeypointSource>,
    ) -> Result<CaptureSession> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(anyhow!("session already active"));
        }

        let session = CaptureSession::start(uid, Utc::now());
        self.db.insert_session(&session).await?;

        let feed = {
            let mut capture = self.capture.lock().await;
            if let Err(err) = capture.start_capture(source, CaptureConfig::from(&self.settings)) {
                self.db
                    .mark_session_status(
                        &session.id,
                        SessionStatus::Cancelled,
                        Some(Utc::now()),
                        Utc::now(),
                    )
                    .await?;
                return Err(err);
            }
            capture.feed().clone()
        };

        let sink = SampleSink {
            gateway: Arc::clone(&self.gateway),
            uid: uid.to_string(),
            session_id: Some(session.id.clone()),
        };
        let workers_token = CancellationToken::new();

        let persistence = tokio::spawn(persistence_loop(
            sink.clone(),
            feed.watch_latest(),
            Duration::from_secs(self.settings.persist_interval_secs),
            workers_token.clone(),
        ));
        let analytics = tokio::spawn(self.analytics.clone().refresh_loop(
            Arc::clone(&self.query),
            uid.to_string(),
            Duration::from_secs(self.settings.analytics_refresh_secs),
            workers_token.clone(),
        ));

        info!("session {} started for {}", session.id, uid);
        *active = Some(ActiveSession {
            session: session.clone(),
            sink,
            workers_token,
            persistence,
            analytics,
        });

        Ok(session)
    }

    /// Stops capture, writes the last unsaved snapshot and closes the session
    /// record. A session whose source was lost is closed as `Interrupted`.
    pub async fn end_session(&self) -> Result<SessionReport> {
        let mut active = self
            .active
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("no active session to end"))?;

        let stopped = {
            let mut capture = self.capture.lock().await;
            capture
                .stop_capture()
                .await
                .map(|exit| (exit, capture.feed().clone()))
        };
        let last_written = stop_workers(&mut active).await;

        let (exit, feed) = match stopped {
            Ok(stopped) => stopped,
            Err(err) => {
                error!("capture for session {} failed: {err:?}", active.session.id);
                self.db
                    .mark_session_interrupted(&active.session.id, Utc::now())
                    .await?;
                return Err(err);
            }
        };

        let latest = feed.latest();
        if let Some(snapshot) = &latest {
            let already_written = last_written
                .as_ref()
                .is_some_and(|prev| Arc::ptr_eq(prev, snapshot));
            if !already_written {
                active.sink.persist(snapshot).await;
            }
        }

        let status = match exit {
            Some(CaptureExit::SourceLost(_)) => SessionStatus::Interrupted,
            _ => SessionStatus::Completed,
        };
        let stopped_at = Utc::now();
        self.db
            .mark_session_status(&active.session.id, status, Some(stopped_at), stopped_at)
            .await?;

        let session = self
            .db
            .get_session(&active.session.id)
            .await?
            .ok_or_else(|| anyhow!("session {} disappeared", active.session.id))?;
        let analytics = self.refresh_analytics(&session.uid).await;

        info!(
            "session {} ended as {} with {} samples",
            session.id,
            status.as_str(),
            session.sample_count
        );

        Ok(SessionReport {
            session,
            snapshot: latest.map(|snapshot| (*snapshot).clone()),
            alerts: feed.alerts(),
            status: feed.status(),
            analytics,
        })
    }

    /// Abandons the active session without a final write. No-op when idle.
    pub async fn cancel_session(&self) -> Result<()> {
        let Some(mut active) = self.active.lock().await.take() else {
            return Ok(());
        };

        self.capture.lock().await.stop_capture().await?;
        stop_workers(&mut active).await;

        let cancelled_at = Utc::now();
        self.db
            .mark_session_status(
                &active.session.id,
                SessionStatus::Cancelled,
                Some(cancelled_at),
                cancelled_at,
            )
            .await?;
        info!("session {} cancelled", active.session.id);
        Ok(())
    }

    pub async fn acknowledge_break(&self) -> Result<()> {
        self.capture.lock().await.acknowledge_break()
    }

    /// Marks sessions left `Running` by an earlier process as `Interrupted`.
    pub async fn recover_incomplete_sessions(&self) -> Result<usize> {
        let incomplete = self.db.get_incomplete_sessions().await?;
        let active_id = self.active_session().await.map(|session| session.id);
        let mut recovered = 0;

        for session in incomplete {
            if active_id.as_deref() == Some(session.id.as_str()) {
                continue;
            }
            warn!(
                "Found incomplete session {} from {}, marking as Interrupted",
                session.id, session.started_at
            );
            match self
                .db
                .mark_session_interrupted(&session.id, Utc::now())
                .await
            {
                Ok(()) => recovered += 1,
                Err(err) => error!("Failed to mark session {} interrupted: {err:?}", session.id),
            }
        }

        Ok(recovered)
    }
}

async fn stop_workers(active: &mut ActiveSession) -> Option<Arc<Snapshot>> {
    active.workers_token.cancel();
    if let Err(err) = (&mut active.analytics).await {
        error!("analytics worker failed to join: {err}");
    }
    match (&mut active.persistence).await {
        Ok(last_written) => last_written,
        Err(err) => {
            error!("persistence worker failed to join: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::metrics::tests::upright_frame;
    use crate::source::ReplaySource;

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            min_frame_interval_ms: 0,
            emit_interval_ms: 0,
            blink_seed: Some(1),
            ..PipelineSettings::default()
        }
    }

    fn replay(frames: usize, pace_ms: u64) -> Box<ReplaySource> {
        Box::new(ReplaySource::from_frames(
            std::iter::repeat_with(upright_frame).take(frames),
            Duration::from_millis(pace_ms),
        ))
    }

    #[tokio::test]
    async fn test_only_one_session_at_a_time() {
        let monitor = PostureMonitor::new(Database::in_memory().unwrap(), fast_settings());
        monitor.start_session("user-1", replay(1_000, 10)).await.unwrap();
        assert!(monitor.start_session("user-1", replay(10, 10)).await.is_err());
        monitor.cancel_session().await.unwrap();
        assert!(monitor.active_session().await.is_none());
    }

    #[tokio::test]
    async fn test_end_without_session_fails() {
        let monitor = PostureMonitor::new(Database::in_memory().unwrap(), fast_settings());
        assert!(monitor.end_session().await.is_err());
        monitor.cancel_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_session_flushes_latest_snapshot() {
        let db = Database::in_memory().unwrap();
        let monitor = PostureMonitor::new(db.clone(), fast_settings());
        let session = monitor.start_session("user-1", replay(1_000, 5)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let report = monitor.end_session().await.unwrap();

        assert_eq!(report.session.id, session.id);
        assert_eq!(report.session.status, SessionStatus::Completed);
        assert_eq!(report.session.sample_count, 1);
        assert!(report.snapshot.is_some());
        assert_eq!(report.status, PipelineStatus::Idle);
        assert_eq!(report.analytics.total_samples, 1);
        assert_eq!(db.get_samples_for_session(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_marks_session_cancelled_without_write() {
        let db = Database::in_memory().unwrap();
        let monitor = PostureMonitor::new(db.clone(), fast_settings());
        let session = monitor.start_session("user-1", replay(1_000, 5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        monitor.cancel_session().await.unwrap();
        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Cancelled);
        assert_eq!(stored.sample_count, 0);
    }

    #[tokio::test]
    async fn test_recovery_skips_active_session() {
        let db = Database::in_memory().unwrap();
        let stale = CaptureSession::start("user-1", Utc::now());
        db.insert_session(&stale).await.unwrap();

        let monitor = PostureMonitor::new(db.clone(), fast_settings());
        let live = monitor.start_session("user-1", replay(1_000, 10)).await.unwrap();

        assert_eq!(monitor.recover_incomplete_sessions().await.unwrap(), 1);
        let stale = db.get_session(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Interrupted);
        let live = db.get_session(&live.id).await.unwrap().unwrap();
        assert_eq!(live.status, SessionStatus::Running);

        monitor.cancel_session().await.unwrap();
    }

    struct PanickingSource;

    #[async_trait::async_trait]
    impl KeypointSource for PanickingSource {
        async fn next_frame(&mut self) -> Result<crate::pose::Frame, crate::source::SourceError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            panic!("detector crashed");
        }

        async fn release(&mut self) {}
    }

    #[tokio::test]
    async fn test_zero_worker_intervals_keep_workers_alive() {
        let settings: PipelineSettings = serde_json::from_str(
            r#"{"persistIntervalSecs":0,"analyticsRefreshSecs":0,"minFrameIntervalMs":0,"emitIntervalMs":0,"blinkSeed":1}"#,
        )
        .unwrap();
        let db = Database::in_memory().unwrap();
        let monitor = PostureMonitor::new(db.clone(), settings);
        let session = monitor.start_session("user-1", replay(1_000, 5)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let active = monitor.active.lock().await;
            let active = active.as_ref().unwrap();
            assert!(!active.persistence.is_finished());
            assert!(!active.analytics.is_finished());
        }

        // One-second persistence ticks land while the session runs.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(!db.get_samples_for_session(&session.id).await.unwrap().is_empty());
        monitor.cancel_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_capture_still_closes_session() {
        let db = Database::in_memory().unwrap();
        let monitor = PostureMonitor::new(db.clone(), fast_settings());
        let session = monitor
            .start_session("user-1", Box::new(PanickingSource))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(monitor.end_session().await.is_err());
        assert!(monitor.active_session().await.is_none());
        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Interrupted);

        monitor.start_session("user-1", replay(1_000, 10)).await.unwrap();
        monitor.cancel_session().await.unwrap();
    }
}
