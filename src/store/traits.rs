//! `Database` trait — the worker registry and work item store behind one
//! async interface.
//!
//! Everything here is a single-row lookup or update. Serializing whole
//! redistribution passes is the dispatcher's job, not the store's.

use async_trait::async_trait;

use crate::dispatch::model::{ItemId, ItemStatus, WorkItem, Worker, WorkerId};
use crate::error::DatabaseError;

/// Backend-agnostic database trait covering workers and work items.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Workers ─────────────────────────────────────────────────────

    /// Insert a worker.
    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError>;

    /// Get a worker by ID.
    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, DatabaseError>;

    /// Set a worker's active flag. Returns `false` if no such worker exists.
    async fn set_worker_active(&self, id: WorkerId, active: bool) -> Result<bool, DatabaseError>;

    /// IDs of all active workers, ascending.
    async fn list_active_worker_ids(&self) -> Result<Vec<WorkerId>, DatabaseError>;

    // ── Work items ──────────────────────────────────────────────────

    /// Insert a work item.
    async fn insert_work_item(&self, item: &WorkItem) -> Result<(), DatabaseError>;

    /// Get a work item by ID.
    async fn get_work_item(&self, id: ItemId) -> Result<Option<WorkItem>, DatabaseError>;

    /// All pending work items, ascending by ID.
    async fn list_pending_items(&self) -> Result<Vec<WorkItem>, DatabaseError>;

    /// Pending work items held by one worker, ascending by ID.
    async fn list_pending_items_for(&self, worker: WorkerId)
    -> Result<Vec<WorkItem>, DatabaseError>;

    /// Update an item's processing status.
    async fn update_item_status(&self, id: ItemId, status: ItemStatus)
    -> Result<(), DatabaseError>;

    /// Write an item's assignee, only while it is still pending.
    ///
    /// Returns `false` if the item is missing or no longer pending.
    async fn set_item_assignee(
        &self,
        id: ItemId,
        assignee: Option<WorkerId>,
    ) -> Result<bool, DatabaseError>;
}
