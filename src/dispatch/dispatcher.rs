//! Lifecycle triggers — login, logout, manual rebalance and reconcile.
//!
//! Every pass (flip the worker's active flag, snapshot workers, snapshot
//! scope items, clear, assign) runs while holding the dispatcher's
//! redistribution lock, so two passes never
//! interleave their reads and writes. Waiting for the lock is bounded; a
//! timed-out pass is retried as a whole, never partially applied.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::engine;
use super::model::{
    DistributionReport, LifecycleReport, Outcome, Scope, Trigger, WorkItem, WorkerId,
};
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::store::Database;

/// Owns the shared store handle and the redistribution lock.
pub struct Dispatcher {
    db: Arc<dyn Database>,
    config: DispatchConfig,
    pass_lock: Mutex<()>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(db: Arc<dyn Database>, config: DispatchConfig) -> Self {
        Self {
            db,
            config,
            pass_lock: Mutex::new(()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Mark the worker active and redistribute the whole pending pool.
    pub async fn on_employee_login(
        &self,
        worker_id: WorkerId,
    ) -> Result<LifecycleReport, DispatchError> {
        self.run_with_retry(Trigger::Login, Some(worker_id), Scope::Full)
            .await
    }

    /// Mark the worker inactive and re-home only the items they held.
    pub async fn on_employee_logout(
        &self,
        worker_id: WorkerId,
    ) -> Result<LifecycleReport, DispatchError> {
        self.run_with_retry(Trigger::Logout, Some(worker_id), Scope::Vacated(worker_id))
            .await
    }

    /// Redistribute the whole pending pool without a status change.
    pub async fn on_manual_rebalance(&self) -> Result<LifecycleReport, DispatchError> {
        info!("Manual rebalance requested");
        self.run_with_retry(Trigger::ManualRebalance, None, Scope::Full)
            .await
    }

    /// Re-home pending items that are unassigned or held by inactive workers.
    pub async fn reconcile(&self) -> Result<LifecycleReport, DispatchError> {
        self.run_with_retry(Trigger::Reconcile, None, Scope::Orphaned)
            .await
    }

    /// Pending items currently held by a worker.
    pub async fn assigned_items(&self, worker_id: WorkerId) -> Result<Vec<WorkItem>, DispatchError> {
        if self.db.get_worker(worker_id).await?.is_none() {
            return Err(DispatchError::UnknownWorker(worker_id));
        }
        Ok(self.db.list_pending_items_for(worker_id).await?)
    }

    #[cfg(test)]
    pub(crate) async fn lock_passes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.pass_lock.lock().await
    }

    async fn run_with_retry(
        &self,
        trigger: Trigger,
        worker_id: Option<WorkerId>,
        scope: Scope,
    ) -> Result<LifecycleReport, DispatchError> {
        let mut attempt: u32 = 1;
        let mut status_applied = false;
        loop {
            match self
                .run_pass(trigger, worker_id, scope, &mut status_applied)
                .await
            {
                Ok(report) => {
                    log_report(&report);
                    return Ok(report);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.retry_backoff * attempt;
                    warn!(
                        trigger = ?trigger,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Redistribution pass failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(trigger = ?trigger, attempt, error = %e, "Redistribution pass abandoned");
                    if status_applied && !matches!(e, DispatchError::UnknownWorker(_)) {
                        return Err(DispatchError::PassIncomplete(Box::new(e)));
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One serialized pass over `scope`.
    ///
    /// Login and logout write the worker's active flag under the same lock
    /// as the pass, so flag order always matches pass order. `status_applied`
    /// is set once that write lands.
    async fn run_pass(
        &self,
        trigger: Trigger,
        worker_id: Option<WorkerId>,
        scope: Scope,
        status_applied: &mut bool,
    ) -> Result<LifecycleReport, DispatchError> {
        let waited = self.config.lock_timeout;
        let _guard = tokio::time::timeout(waited, self.pass_lock.lock())
            .await
            .map_err(|_| DispatchError::Busy { waited })?;

        if let (Some(worker), Some(active)) = (worker_id, trigger.status_change()) {
            match self.db.set_worker_active(worker, active).await {
                Ok(true) => *status_applied = true,
                Ok(false) => return Err(DispatchError::UnknownWorker(worker)),
                Err(e) => return Err(DispatchError::StatusUpdate(e)),
            }
            info!(worker_id = %worker, active, "Employee status updated");
        }

        let mut workers = self.db.list_active_worker_ids().await?;
        let items = match scope {
            Scope::Full => self.db.list_pending_items().await?,
            Scope::Vacated(departing) => {
                workers.retain(|w| *w != departing);
                self.db.list_pending_items_for(departing).await?
            }
            Scope::Orphaned => {
                let pending = self.db.list_pending_items().await?;
                pending
                    .into_iter()
                    .filter(|item| match item.assignee {
                        Some(holder) => workers.binary_search(&holder).is_err(),
                        None => true,
                    })
                    .collect()
            }
        };
        debug!(
            trigger = ?trigger,
            scope = ?scope,
            workers = workers.len(),
            items = items.len(),
            "Redistribution snapshot taken"
        );

        let (items_cleared, distribution) = if workers.is_empty() {
            let (cleared, failures) = engine::release(self.db.as_ref(), &items).await;
            let mut report = DistributionReport::empty(Outcome::NoActiveWorkers, 0, items.len());
            report.failures = failures;
            (cleared, report)
        } else {
            (0, engine::distribute(self.db.as_ref(), &workers, &items).await)
        };

        Ok(LifecycleReport {
            trigger,
            worker_id,
            scope,
            items_cleared,
            distribution,
        })
    }
}

fn log_report(report: &LifecycleReport) {
    let d = &report.distribution;
    if d.is_partial() {
        warn!(
            trigger = ?report.trigger,
            failed = d.failures.len(),
            assigned = d.items_assigned,
            "Redistribution completed with failed items"
        );
    }
    match d.outcome {
        Outcome::Distributed => info!(
            trigger = ?report.trigger,
            workers = d.workers_considered,
            items = d.items_considered,
            assigned = d.items_assigned,
            unchanged = d.items_unchanged,
            "Pending items redistributed"
        ),
        Outcome::NoActiveWorkers => info!(
            trigger = ?report.trigger,
            items = d.items_considered,
            cleared = report.items_cleared,
            "No active workers, items left unassigned"
        ),
        Outcome::NoPendingItems => debug!(trigger = ?report.trigger, "No pending items to redistribute"),
    }
}

/// Spawn the orphan reconciliation sweep.
pub fn spawn_reconcile_ticker(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Reconcile sweep started (interval: {}s)", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = dispatcher.reconcile().await {
                warn!(error = %e, "Reconcile sweep failed, will retry next tick");
            }
        }
    })
}
