//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::dispatch::model::{ItemId, ItemStatus, WorkItem, Worker, WorkerId};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_items(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<WorkItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut items = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => items.push(row_to_item(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op} row: {e}"))),
            }
        }
        Ok(items)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_worker(id: Option<WorkerId>) -> Value {
    match id {
        Some(id) => Value::Integer(id.0),
        None => Value::Null,
    }
}

/// Map a libsql Row to a Worker.
///
/// Column order matches WORKER_COLUMNS.
fn row_to_worker(row: &libsql::Row) -> Result<Worker, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("worker row parse: {e}"));
    let id: i64 = row.get(0).map_err(parse)?;
    let name: String = row.get(1).map_err(parse)?;
    let active: i64 = row.get(2).map_err(parse)?;
    let created: String = row.get(3).map_err(parse)?;
    let updated: String = row.get(4).map_err(parse)?;

    Ok(Worker {
        id: WorkerId(id),
        name,
        active: active != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Map a libsql Row to a WorkItem.
///
/// Column order matches ITEM_COLUMNS.
fn row_to_item(row: &libsql::Row) -> Result<WorkItem, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("payment row parse: {e}"));
    let id: i64 = row.get(0).map_err(parse)?;
    let mobile_number: String = row.get(1).map_err(parse)?;
    let amount_str: String = row.get(2).map_err(parse)?;
    let status_str: String = row.get(3).map_err(parse)?;
    let assignee = match row.get_value(4).map_err(parse)? {
        Value::Integer(id) => Some(WorkerId(id)),
        _ => None,
    };
    let created: String = row.get(5).map_err(parse)?;
    let updated: String = row.get(6).map_err(parse)?;

    let amount = Decimal::from_str(&amount_str)
        .map_err(|e| DatabaseError::Serialization(format!("payment {id} amount: {e}")))?;
    let status = status_str
        .parse::<ItemStatus>()
        .map_err(DatabaseError::Serialization)?;

    Ok(WorkItem {
        id: ItemId(id),
        mobile_number,
        amount,
        status,
        assignee,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const WORKER_COLUMNS: &str = "id, name, active, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, mobile_number, amount, status, assignee_id, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Workers ─────────────────────────────────────────────────────

    async fn insert_worker(&self, worker: &Worker) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO employees (id, name, active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    worker.id.0,
                    worker.name.as_str(),
                    worker.active as i64,
                    worker.created_at.to_rfc3339(),
                    worker.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_worker: {e}")))?;

        debug!(worker_id = %worker.id, "Worker inserted");
        Ok(())
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {WORKER_COLUMNS} FROM employees WHERE id = ?1"),
                params![id.0],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_worker: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_worker(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_worker row: {e}"))),
        }
    }

    async fn set_worker_active(&self, id: WorkerId, active: bool) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE employees SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active as i64, now, id.0],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_worker_active: {e}")))?;

        debug!(worker_id = %id, active, "Worker active flag updated");
        Ok(count > 0)
    }

    async fn list_active_worker_ids(&self) -> Result<Vec<WorkerId>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id FROM employees WHERE active = 1 ORDER BY id ASC", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_worker_ids: {e}")))?;

        let mut ids = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let id: i64 = row.get(0).map_err(|e| {
                        DatabaseError::Query(format!("list_active_worker_ids row parse: {e}"))
                    })?;
                    ids.push(WorkerId(id));
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(DatabaseError::Query(format!(
                        "list_active_worker_ids row: {e}"
                    )));
                }
            }
        }
        Ok(ids)
    }

    // ── Work items ──────────────────────────────────────────────────

    async fn insert_work_item(&self, item: &WorkItem) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO payments (id, mobile_number, amount, status, assignee_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id.0,
                    item.mobile_number.as_str(),
                    item.amount.to_string(),
                    item.status.as_str(),
                    opt_worker(item.assignee),
                    item.created_at.to_rfc3339(),
                    item.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_work_item: {e}")))?;

        debug!(item_id = %item.id, "Payment inserted");
        Ok(())
    }

    async fn get_work_item(&self, id: ItemId) -> Result<Option<WorkItem>, DatabaseError> {
        let mut items = self
            .query_items(
                &format!("SELECT {ITEM_COLUMNS} FROM payments WHERE id = ?1"),
                params![id.0],
                "get_work_item",
            )
            .await?;
        Ok(items.pop())
    }

    async fn list_pending_items(&self) -> Result<Vec<WorkItem>, DatabaseError> {
        self.query_items(
            &format!("SELECT {ITEM_COLUMNS} FROM payments WHERE status = 'pending' ORDER BY id ASC"),
            (),
            "list_pending_items",
        )
        .await
    }

    async fn list_pending_items_for(
        &self,
        worker: WorkerId,
    ) -> Result<Vec<WorkItem>, DatabaseError> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM payments WHERE status = 'pending' AND assignee_id = ?1 ORDER BY id ASC"
            ),
            params![worker.0],
            "list_pending_items_for",
        )
        .await
    }

    async fn update_item_status(
        &self,
        id: ItemId,
        status: ItemStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id.0],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_item_status: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "payment".into(),
                id: id.to_string(),
            });
        }
        debug!(item_id = %id, status = status.as_str(), "Payment status updated");
        Ok(())
    }

    async fn set_item_assignee(
        &self,
        id: ItemId,
        assignee: Option<WorkerId>,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE payments SET assignee_id = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![opt_worker(assignee), now, id.0],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_item_assignee: {e}")))?;

        debug!(item_id = %id, assignee = ?assignee, "Payment assignee updated");
        Ok(count > 0)
    }
}
