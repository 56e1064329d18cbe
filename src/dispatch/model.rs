//! Dispatch data model: workers, work items, and pass reports.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable employee identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub i64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable recharge request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of a recharge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Paid,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// An employee account that can hold assigned work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    /// Flipped by login/logout.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// Create an inactive worker.
    pub fn new(id: WorkerId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: mark active.
    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }
}

/// A customer recharge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub mobile_number: String,
    pub amount: Decimal,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a pending, unassigned request.
    pub fn new(id: ItemId, mobile_number: impl Into<String>, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id,
            mobile_number: mobile_number.into(),
            amount,
            status: ItemStatus::Pending,
            assignee: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: pre-assign to a worker.
    pub fn assigned_to(mut self, worker: WorkerId) -> Self {
        self.assignee = Some(worker);
        self
    }

    /// Builder: set status.
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }
}

/// A single planned item -> worker mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub item_id: ItemId,
    pub worker_id: WorkerId,
}

/// Which pending items a pass redistributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "worker_id")]
pub enum Scope {
    /// Every pending item, across all active workers.
    Full,
    /// Only pending items held by the departing worker.
    Vacated(WorkerId),
    /// Pending items that are unassigned or held by an inactive worker.
    Orphaned,
}

/// What kind of event started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Login,
    Logout,
    ManualRebalance,
    Reconcile,
}

impl Trigger {
    /// Active flag this trigger writes for its worker, if any.
    pub fn status_change(self) -> Option<bool> {
        match self {
            Self::Login => Some(true),
            Self::Logout => Some(false),
            Self::ManualRebalance | Self::Reconcile => None,
        }
    }
}

/// How a distribution pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NoActiveWorkers,
    NoPendingItems,
    Distributed,
}

/// One item whose new assignee could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub reason: String,
}

/// Result of one Distribution Engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub outcome: Outcome,
    pub workers_considered: usize,
    pub items_considered: usize,
    /// Items whose assignee was written to a new worker.
    pub items_assigned: usize,
    /// Items that already held their planned worker.
    pub items_unchanged: usize,
    /// Items that stopped being pending during the pass.
    pub items_skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl DistributionReport {
    pub(crate) fn empty(outcome: Outcome, workers: usize, items: usize) -> Self {
        Self {
            outcome,
            workers_considered: workers,
            items_considered: items,
            items_assigned: 0,
            items_unchanged: 0,
            items_skipped: 0,
            failures: Vec::new(),
        }
    }

    /// Whether the engine actually ran a distribution.
    pub fn did_work(&self) -> bool {
        self.outcome == Outcome::Distributed
    }

    /// Whether any item write failed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result of one lifecycle trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub trigger: Trigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub scope: Scope,
    /// Items released without a new worker (no active workers left).
    pub items_cleared: usize,
    pub distribution: DistributionReport,
}

impl LifecycleReport {
    /// Summary shape returned to the admin rebalance action.
    pub fn summary(&self) -> RebalanceSummary {
        RebalanceSummary {
            active_workers: self.distribution.workers_considered,
            pending_items: self.distribution.items_considered,
            items_assigned: self.distribution.items_assigned,
            items_failed: self.distribution.failures.len(),
            did_rebalance: self.distribution.did_work(),
        }
    }
}

/// Admin-facing rebalance summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSummary {
    pub active_workers: usize,
    pub pending_items: usize,
    pub items_assigned: usize,
    pub items_failed: usize,
    pub did_rebalance: bool,
}
