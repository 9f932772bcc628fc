use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::gateway::AnalyticsQuery;

use super::weekly::AnalyticsSummary;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Cached weekly summary, refreshed from an [`AnalyticsQuery`].
///
/// A failed or timed-out refresh leaves the previous summary in place.
#[derive(Clone)]
pub struct AnalyticsService {
    cache: Arc<watch::Sender<AnalyticsSummary>>,
    timeout: Duration,
}

impl AnalyticsService {
    pub fn new(timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(AnalyticsSummary::empty(Utc::now()));
        Self {
            cache: Arc::new(tx),
            timeout,
        }
    }

    pub fn current(&self) -> AnalyticsSummary {
        self.cache.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalyticsSummary> {
        self.cache.subscribe()
    }

    /// Returns `true` when the cache was replaced.
    pub async fn refresh(&self, query: &dyn AnalyticsQuery, uid: &str) -> bool {
        match tokio::time::timeout(self.timeout, query.weekly_summary(uid)).await {
            Ok(Ok(summary)) => {
                log_debug!(
                    "analytics refreshed for {}: {} samples, average {:?}",
                    uid,
                    summary.total_samples,
                    summary.week_average
                );
                self.cache.send_replace(summary);
                true
            }
            Ok(Err(err)) => {
                log_warn!("analytics query failed for {}: {err:?}", uid);
                false
            }
            Err(_) => {
                log_warn!(
                    "analytics query timed out after {}s for {}",
                    self.timeout.as_secs(),
                    uid
                );
                false
            }
        }
    }

    /// Refresh immediately, then every `every`, until `cancel_token` fires.
    pub async fn refresh_loop(
        self,
        query: Arc<dyn AnalyticsQuery>,
        uid: String,
        every: Duration,
        cancel_token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh(query.as_ref(), &uid).await;
                }
                _ = cancel_token.cancelled() => break,
            }
        }
    }
}
