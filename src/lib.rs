//! Recharge dispatch — fair distribution of pending recharge requests
//! across active employees.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod store;
