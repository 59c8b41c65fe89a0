//! Periodic removal of expired pairing codes
//!
//! Each sweep queries every document whose expiry is before the sweep's
//! clock reading and deletes them in one batch. Codes never change after
//! they are written, so a document that was expired at query time is still
//! expired at delete time. Documents redeemed in between are skipped by the
//! batch delete, which makes sweeps safe to overlap, run late or skip.

use crate::storage::{CodeQuery, CodeStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Default time between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep failures
///
/// The batch is all-or-nothing, so after either failure every expired code is
/// still present and the next scheduled run retries it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("Failed to query expired pairing codes")]
    Query,
    #[error("Failed to delete {matched} expired pairing codes")]
    Delete { matched: usize },
}

/// Counts from a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired documents found by the query
    pub matched: usize,
    /// Documents actually removed by the batch
    pub deleted: usize,
}

/// Deletes expired pairing codes on a fixed schedule
pub struct ExpirySweeper {
    codes: Arc<dyn CodeStore>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(codes: Arc<dyn CodeStore>) -> Self {
        Self {
            codes,
            period: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Builder pattern: set the sweep period
    pub fn with_interval(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run one sweep now
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep against the clock reading `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let expired = self
            .codes
            .query(&CodeQuery::new().expires_before(now))
            .await
            .map_err(|e| {
                error!("Error querying expired pairing codes: {}", e);
                SweepError::Query
            })?;

        if expired.is_empty() {
            debug!("No expired pairing codes found");
            return Ok(SweepReport::default());
        }

        let ids: Vec<_> = expired.into_iter().map(|record| record.id).collect();
        let matched = ids.len();
        let deleted = self.codes.delete_batch(&ids).await.map_err(|e| {
            error!("Error deleting {} expired pairing codes: {}", matched, e);
            SweepError::Delete { matched }
        })?;

        info!("Deleted {} expired pairing codes", deleted);
        Ok(SweepReport { matched, deleted })
    }

    /// Sweep every period until `shutdown` flips to `true` or its sender drops
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Expiry sweeper running every {:?}", self.period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are already logged; the next tick retries
                        let _ = self.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        })
    }
}
