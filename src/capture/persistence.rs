use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::gateway::{PersistenceGateway, SessionSample};
use crate::posture::Snapshot;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const WRITE_TIMEOUT_SECS: u64 = 10;

/// Where samples go and whom they belong to.
#[derive(Clone)]
pub struct SampleSink {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub uid: String,
    pub session_id: Option<String>,
}

impl SampleSink {
    /// Writes one snapshot. Failures are logged and dropped; there is no
    /// retry.
    pub async fn persist(&self, snapshot: &Snapshot) -> bool {
        let sample =
            SessionSample::from_snapshot(&self.uid, self.session_id.as_deref(), snapshot);
        let write = self.gateway.record_sample(sample);
        match tokio::time::timeout(Duration::from_secs(WRITE_TIMEOUT_SECS), write).await {
            Ok(Ok(())) => {
                log_debug!("persisted sample for {} (score {})", self.uid, snapshot.score);
                true
            }
            Ok(Err(err)) => {
                log_error!("failed to persist sample for {}: {err:?}", self.uid);
                false
            }
            Err(_) => {
                log_warn!(
                    "persisting sample for {} timed out (> {}s)",
                    self.uid,
                    WRITE_TIMEOUT_SECS
                );
                false
            }
        }
    }
}

/// Every `every`, writes the latest snapshot if it changed since the last
/// write. Reads `latest` only; never waits on the capture task.
pub async fn persistence_loop(
    sink: SampleSink,
    latest: watch::Receiver<Option<Arc<Snapshot>>>,
    every: Duration,
    cancel_token: CancellationToken,
) -> Option<Arc<Snapshot>> {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_written: Option<Arc<Snapshot>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = latest.borrow().clone();
                let Some(snapshot) = current else {
                    continue;
                };
                if last_written.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &snapshot)) {
                    continue;
                }
                sink.persist(&snapshot).await;
                last_written = Some(snapshot);
            }
            _ = cancel_token.cancelled() => {
                log_info!("persistence loop shutting down");
                break;
            }
        }
    }

    last_written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::metrics::tests::upright_frame;
    use crate::pose::extract_metrics;
    use crate::posture::evaluate;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        samples: Mutex<Vec<SessionSample>>,
        fail: bool,
    }

    #[async_trait]
    impl PersistenceGateway for RecordingGateway {
        async fn record_sample(&self, sample: SessionSample) -> Result<()> {
            if self.fail {
                return Err(anyhow!("write rejected"));
            }
            self.samples.lock().await.push(sample);
            Ok(())
        }
    }

    fn snapshot() -> Arc<Snapshot> {
        let metrics = extract_metrics(&upright_frame()).unwrap();
        Arc::new(Snapshot::new(metrics, None, evaluate(&metrics), Utc::now()))
    }

    fn sink(gateway: Arc<RecordingGateway>) -> SampleSink {
        SampleSink {
            gateway,
            uid: "user-1".into(),
            session_id: Some("session-1".into()),
        }
    }

    #[tokio::test]
    async fn test_writes_only_new_snapshots() {
        let gateway = Arc::new(RecordingGateway::default());
        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();
        let handle = tokio::spawn(persistence_loop(
            sink(gateway.clone()),
            rx,
            Duration::from_millis(20),
            token.clone(),
        ));

        // Nothing yet: ticks are no-ops.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gateway.samples.lock().await.is_empty());

        let first = snapshot();
        tx.send_replace(Some(Arc::clone(&first)));
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(gateway.samples.lock().await.len(), 1);

        tx.send_replace(Some(snapshot()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        token.cancel();
        let last = handle.await.unwrap();
        let samples = gateway.samples.lock().await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].uid, "user-1");
        assert_eq!(samples[0].session_id.as_deref(), Some("session-1"));
        assert_eq!(samples[0].score, first.score);
        assert!(last.is_some());
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let gateway = Arc::new(RecordingGateway {
            fail: true,
            ..RecordingGateway::default()
        });
        assert!(!sink(gateway).persist(&snapshot()).await);
    }
}
