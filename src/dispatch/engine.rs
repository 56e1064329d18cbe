//! Distribution engine — base/extra balancing of pending items over active
//! workers, and application of the resulting plan to the store.
//!
//! Items are consumed in ascending id order and handed out in contiguous
//! slices to workers in ascending id order. With `N` items and `M` workers
//! the first `N % M` workers take `N / M + 1` items and the rest take
//! `N / M`, so per-worker load never differs by more than one.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::model::{
    Assignment, DistributionReport, ItemFailure, ItemId, ItemStatus, Outcome, WorkItem, WorkerId,
};
use crate::store::Database;

/// Slice length for each of `workers` workers sharing `items` items.
pub fn share_sizes(workers: usize, items: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    let base = items / workers;
    let extra = items % workers;
    (0..workers)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Compute the item -> worker mapping.
///
/// Inputs are sorted and de-duplicated first, so the mapping depends only on
/// the sets of ids, not on the order the caller read them in.
pub fn plan(workers: &[WorkerId], items: &[ItemId]) -> Vec<Assignment> {
    let mut workers = workers.to_vec();
    workers.sort_unstable();
    workers.dedup();
    let mut items = items.to_vec();
    items.sort_unstable();
    items.dedup();

    let mut assignments = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter();
    for (worker_id, size) in workers.iter().zip(share_sizes(workers.len(), remaining.len())) {
        for item_id in remaining.by_ref().take(size) {
            assignments.push(Assignment {
                item_id,
                worker_id: *worker_id,
            });
        }
    }
    assignments
}

/// Plan and persist a distribution of `items` over `workers`.
///
/// Only items whose planned worker differs from their current assignee are
/// written, so repeating a pass over unchanged state performs no writes.
/// A failed write is recorded and the remaining items are still assigned.
pub async fn distribute(
    db: &dyn Database,
    workers: &[WorkerId],
    items: &[WorkItem],
) -> DistributionReport {
    let pending: Vec<&WorkItem> = items
        .iter()
        .filter(|item| item.status == ItemStatus::Pending)
        .collect();
    let current: HashMap<ItemId, Option<WorkerId>> =
        pending.iter().map(|item| (item.id, item.assignee)).collect();

    let mut worker_ids = workers.to_vec();
    worker_ids.sort_unstable();
    worker_ids.dedup();

    if worker_ids.is_empty() {
        debug!(items = current.len(), "No active workers, nothing assigned");
        return DistributionReport::empty(Outcome::NoActiveWorkers, 0, current.len());
    }
    if current.is_empty() {
        debug!(workers = worker_ids.len(), "No pending items, nothing assigned");
        return DistributionReport::empty(Outcome::NoPendingItems, worker_ids.len(), 0);
    }

    let item_ids: Vec<ItemId> = current.keys().copied().collect();
    let assignments = plan(&worker_ids, &item_ids);

    let mut report = DistributionReport::empty(Outcome::Distributed, worker_ids.len(), current.len());
    for Assignment { item_id, worker_id } in assignments {
        if current.get(&item_id).copied().flatten() == Some(worker_id) {
            report.items_unchanged += 1;
            continue;
        }
        match db.set_item_assignee(item_id, Some(worker_id)).await {
            Ok(true) => report.items_assigned += 1,
            Ok(false) => {
                debug!(item_id = %item_id, "Item no longer pending, skipped");
                report.items_skipped += 1;
            }
            Err(e) => {
                warn!(item_id = %item_id, worker_id = %worker_id, error = %e, "Failed to persist assignment");
                report.failures.push(ItemFailure {
                    item_id,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Clear the assignee of every pending item in `items` that holds one.
///
/// Returns the number of items cleared plus any per-item write failures.
pub async fn release(db: &dyn Database, items: &[WorkItem]) -> (usize, Vec<ItemFailure>) {
    let mut cleared = 0;
    let mut failures = Vec::new();
    for item in items
        .iter()
        .filter(|i| i.status == ItemStatus::Pending && i.assignee.is_some())
    {
        match db.set_item_assignee(item.id, None).await {
            Ok(true) => cleared += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Failed to release item");
                failures.push(ItemFailure {
                    item_id: item.id,
                    reason: e.to_string(),
                });
            }
        }
    }
    (cleared, failures)
}
