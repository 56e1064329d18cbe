//! Work distribution — balancing pending recharge requests across active
//! employees, triggered by login, logout and admin rebalance.

pub mod dispatcher;
pub mod engine;
pub mod model;

pub use dispatcher::{Dispatcher, spawn_reconcile_ticker};
pub use model::{
    DistributionReport, ItemId, ItemStatus, LifecycleReport, Outcome, RebalanceSummary, Scope,
    Trigger, WorkItem, Worker, WorkerId,
};
