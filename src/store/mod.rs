//! Persistence layer — SQLite-backed worker registry and work item store.

pub mod libsql_backend;
pub mod migrations;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
