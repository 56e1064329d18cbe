//! Store double that injects write and read failures on top of an
//! in-memory backend.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::dispatch::model::{ItemId, ItemStatus, WorkItem, Worker, WorkerId};
use crate::error::DatabaseError;
use crate::store::{Database, LibSqlBackend};

pub(crate) struct FlakyDb {
    pub inner: LibSqlBackend,
    broken_item: Option<ItemId>,
    fail_status_updates: bool,
    fail_snapshots: bool,
    pub assignee_writes: AtomicUsize,
}

impl FlakyDb {
    pub fn new(inner: LibSqlBackend) -> Self {
        Self {
            inner,
            broken_item: None,
            fail_status_updates: false,
            fail_snapshots: false,
            assignee_writes: AtomicUsize::new(0),
        }
    }

    /// Builder: every assignee write for `id` fails.
    pub fn failing_item(mut self, id: ItemId) -> Self {
        self.broken_item = Some(id);
        self
    }

    /// Builder: active-flag writes fail.
    pub fn failing_status_updates(mut self) -> Self {
        self.fail_status_updates = true;
        self
    }

    /// Builder: reading the active worker list fails.
    pub fn failing_snapshots(mut self) -> Self {
        self.fail_snapshots = true;
        self
    }

    pub fn writes(&self) -> usize {
        self.assignee_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for FlakyDb {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.inner.init_schema().await
    }

    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        self.inner.insert_worker(worker).await
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, DatabaseError> {
        self.inner.get_worker(id).await
    }

    async fn set_worker_active(&self, id: WorkerId, active: bool) -> Result<bool, DatabaseError> {
        if self.fail_status_updates {
            return Err(DatabaseError::Query("database is locked".into()));
        }
        self.inner.set_worker_active(id, active).await
    }

    async fn list_active_worker_ids(&self) -> Result<Vec<WorkerId>, DatabaseError> {
        if self.fail_snapshots {
            return Err(DatabaseError::Query("database is locked".into()));
        }
        self.inner.list_active_worker_ids().await
    }

    async fn insert_work_item(&self, item: &WorkItem) -> Result<(), DatabaseError> {
        self.inner.insert_work_item(item).await
    }

    async fn get_work_item(&self, id: ItemId) -> Result<Option<WorkItem>, DatabaseError> {
        self.inner.get_work_item(id).await
    }

    async fn list_pending_items(&self) -> Result<Vec<WorkItem>, DatabaseError> {
        self.inner.list_pending_items().await
    }

    async fn list_pending_items_for(
        &self,
        worker: WorkerId,
    ) -> Result<Vec<WorkItem>, DatabaseError> {
        self.inner.list_pending_items_for(worker).await
    }

    async fn update_item_status(
        &self,
        id: ItemId,
        status: ItemStatus,
    ) -> Result<(), DatabaseError> {
        self.inner.update_item_status(id, status).await
    }

    async fn set_item_assignee(
        &self,
        id: ItemId,
        assignee: Option<WorkerId>,
    ) -> Result<bool, DatabaseError> {
        self.assignee_writes.fetch_add(1, Ordering::SeqCst);
        if self.broken_item == Some(id) {
            return Err(DatabaseError::Query("disk I/O error".into()));
        }
        self.inner.set_item_assignee(id, assignee).await
    }
}
