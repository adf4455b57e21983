//! Pending deposit sweeper
//!
//! Callbacks can be lost. This worker periodically re-verifies deposits that
//! have sat in `pending` longer than `min_age` and feeds them through the
//! same reconciler the callback endpoint uses. Each sweep resumes after the
//! last record of the previous batch, so a backlog of long-pending deposits
//! cannot hide newer ones. Deposits still unresolved after `expire_after`
//! are failed as expired.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::database::models::{PendingCursor, TransactionType};
use crate::database::repository::TransactionLedger;
use crate::error::AppResult;
use crate::services::{ReconcileOutcome, Reconciler};

const SWEEP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct PendingReconcilerConfig {
    pub enabled: bool,
    /// How often the worker wakes up.
    pub poll_interval: Duration,
    /// Deposits younger than this are left to their callback.
    pub min_age: Duration,
    /// Deposits older than this that the gateway cannot settle are expired.
    pub expire_after: Duration,
    pub batch_size: i64,
}

impl Default for PendingReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            min_age: Duration::from_secs(120),
            expire_after: Duration::from_secs(24 * 60 * 60),
            batch_size: 50,
        }
    }
}

impl PendingReconcilerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = std::env::var("PENDING_SWEEP_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(cfg.enabled);
        cfg.poll_interval = Duration::from_secs(
            std::env::var("PENDING_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.min_age = Duration::from_secs(
            std::env::var("PENDING_SWEEP_MIN_AGE_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.min_age.as_secs()),
        );
        cfg.expire_after = Duration::from_secs(
            std::env::var("PENDING_SWEEP_EXPIRE_AFTER_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.expire_after.as_secs()),
        );
        cfg.batch_size = std::env::var("PENDING_SWEEP_BATCH")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub expired: usize,
    pub still_pending: usize,
    pub errors: usize,
}

pub struct PendingReconcilerWorker {
    ledger: Arc<dyn TransactionLedger>,
    reconciler: Arc<Reconciler>,
    config: PendingReconcilerConfig,
    cursor: Mutex<Option<PendingCursor>>,
}

impl PendingReconcilerWorker {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        reconciler: Arc<Reconciler>,
        config: PendingReconcilerConfig,
    ) -> Self {
        Self {
            ledger,
            reconciler,
            config,
            cursor: Mutex::new(None),
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            min_age_secs = self.config.min_age.as_secs(),
            expire_after_secs = self.config.expire_after.as_secs(),
            batch_size = self.config.batch_size,
            "pending deposit sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending deposit sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.sweep_once().await {
                        Ok(report) if report.examined > 0 => {
                            info!(?report, "pending deposit sweep finished");
                        }
                        Ok(_) => debug!("no stale pending deposits"),
                        Err(e) => warn!(error = %e, "pending deposit sweep failed"),
                    }
                }
            }
        }

        info!("pending deposit sweeper stopped");
    }

    /// Reconciles the next batch of stale pending deposits.
    pub async fn sweep_once(&self) -> AppResult<SweepReport> {
        let now = Utc::now();
        let min_age = chrono::Duration::from_std(self.config.min_age)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let expire_after = chrono::Duration::from_std(self.config.expire_after)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = now - min_age;
        let expire_cutoff = now - expire_after;

        let mut cursor = self.cursor.lock().await;
        let pending = self
            .ledger
            .list_pending(
                TransactionType::Deposit,
                cutoff,
                cursor.as_ref(),
                self.config.batch_size,
            )
            .await?;

        // A short batch means the end was reached; the next sweep starts over.
        *cursor = if (pending.len() as i64) < self.config.batch_size {
            None
        } else {
            pending.last().map(PendingCursor::from)
        };
        drop(cursor);

        let mut report = SweepReport {
            examined: pending.len(),
            ..SweepReport::default()
        };

        let results: Vec<_> = stream::iter(pending)
            .map(|record| async move {
                let result = self.reconciler.reconcile(&record.tx_ref).await;
                (record, result)
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        for (record, result) in results {
            let stale = record.created_at <= expire_cutoff;
            match result {
                Ok(ReconcileOutcome::Completed) => report.completed += 1,
                Ok(ReconcileOutcome::Failed) => report.failed += 1,
                Ok(ReconcileOutcome::StillPending) if stale => {
                    self.expire(&record.tx_ref, &mut report).await
                }
                Ok(ReconcileOutcome::StillPending) => report.still_pending += 1,
                Ok(ReconcileOutcome::AlreadySettled(_)) => {}
                Err(e) if stale && !e.is_retryable() => {
                    warn!(tx_ref = %record.tx_ref, error = %e, "stale deposit cannot be verified");
                    self.expire(&record.tx_ref, &mut report).await
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(tx_ref = %record.tx_ref, error = %e, retryable = e.is_retryable(), "sweep reconcile failed");
                }
            }
        }

        Ok(report)
    }

    async fn expire(&self, tx_ref: &str, report: &mut SweepReport) {
        match self.reconciler.expire_pending(tx_ref).await {
            Ok(ReconcileOutcome::Failed) => report.expired += 1,
            Ok(_) => {}
            Err(e) => {
                report.errors += 1;
                warn!(tx_ref = %tx_ref, error = %e, "could not expire pending deposit");
            }
        }
    }
}
