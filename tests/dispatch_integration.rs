//! Integration tests for the dispatch hooks.
//!
//! Each HTTP test spins up an Axum server on a random port backed by an
//! in-memory database and drives the REST contract with reqwest.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use recharge_dispatch::config::DispatchConfig;
use recharge_dispatch::dispatch::{Dispatcher, ItemId, WorkItem, Worker, WorkerId};
use recharge_dispatch::routes::dispatch_routes;
use recharge_dispatch::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Seed workers and pending items into a fresh in-memory store.
async fn seeded_dispatcher(active: &[i64], inactive: &[i64], items: &[i64]) -> Arc<Dispatcher> {
    let db = LibSqlBackend::new_memory().await.unwrap();
    for id in active {
        db.insert_worker(&Worker::new(WorkerId(*id), format!("employee-{id}")).active())
            .await
            .unwrap();
    }
    for id in inactive {
        db.insert_worker(&Worker::new(WorkerId(*id), format!("employee-{id}")))
            .await
            .unwrap();
    }
    for id in items {
        db.insert_work_item(&WorkItem::new(ItemId(*id), "9123456780", dec!(149)))
            .await
            .unwrap();
    }
    Arc::new(Dispatcher::new(Arc::new(db), DispatchConfig::default()))
}

/// Start an Axum server on a random port, return its base URL.
async fn start_server(dispatcher: Arc<Dispatcher>) -> String {
    let app = dispatch_routes(dispatcher);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn loads(dispatcher: &Dispatcher) -> BTreeMap<WorkerId, usize> {
    let mut counts = BTreeMap::new();
    for item in dispatcher.store().list_pending_items().await.unwrap() {
        if let Some(worker) = item.assignee {
            *counts.entry(worker).or_insert(0) += 1;
        }
    }
    counts
}

async fn holders(dispatcher: &Dispatcher) -> BTreeMap<ItemId, Option<WorkerId>> {
    dispatcher
        .store()
        .list_pending_items()
        .await
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.assignee))
        .collect()
}

// ── Library hooks ───────────────────────────────────────────────────────

#[tokio::test]
async fn three_workers_ten_items() {
    let d = seeded_dispatcher(&[1, 2, 3], &[], &(101..=110).collect::<Vec<_>>()).await;

    let summary = d.on_manual_rebalance().await.unwrap().summary();
    assert_eq!(summary.active_workers, 3);
    assert_eq!(summary.pending_items, 10);
    assert_eq!(summary.items_assigned, 10);
    assert!(summary.did_rebalance);

    let counts = loads(&d).await;
    assert_eq!(counts[&WorkerId(1)], 4);
    assert_eq!(counts[&WorkerId(2)], 3);
    assert_eq!(counts[&WorkerId(3)], 3);
}

#[tokio::test]
async fn logout_redistributes_vacated_slice_only() {
    let d = seeded_dispatcher(&[1, 2, 3], &[], &(101..=110).collect::<Vec<_>>()).await;
    // Worker 2 holds 104..106; the others hold the rest.
    for (item, worker) in [
        (101, 1), (102, 1), (103, 1), (107, 1),
        (104, 2), (105, 2), (106, 2),
        (108, 3), (109, 3), (110, 3),
    ] {
        d.store()
            .set_item_assignee(ItemId(item), Some(WorkerId(worker)))
            .await
            .unwrap();
    }
    let before = holders(&d).await;

    d.on_employee_logout(WorkerId(2)).await.unwrap();

    let after = holders(&d).await;
    for (item, holder) in &before {
        if *holder != Some(WorkerId(2)) {
            assert_eq!(after[item], *holder);
        }
    }
    assert_eq!(after[&ItemId(104)], Some(WorkerId(1)));
    assert_eq!(after[&ItemId(105)], Some(WorkerId(1)));
    assert_eq!(after[&ItemId(106)], Some(WorkerId(3)));
}

#[tokio::test]
async fn single_worker_takes_all() {
    let d = seeded_dispatcher(&[], &[1], &[1, 2, 3, 4, 5]).await;
    let report = d.on_employee_login(WorkerId(1)).await.unwrap();
    assert_eq!(report.distribution.items_assigned, 5);
    assert_eq!(loads(&d).await[&WorkerId(1)], 5);
}

#[tokio::test]
async fn no_pending_items_is_noop() {
    let d = seeded_dispatcher(&[1, 2, 3, 4], &[], &[]).await;
    let report = d.on_manual_rebalance().await.unwrap();
    assert!(!report.distribution.did_work());
    assert_eq!(report.distribution.items_assigned, 0);
    assert_eq!(report.items_cleared, 0);
}

#[tokio::test]
async fn rebalance_twice_is_stable() {
    let d = seeded_dispatcher(&[1, 2, 3], &[], &(1..=11).collect::<Vec<_>>()).await;
    d.on_manual_rebalance().await.unwrap();
    let first = holders(&d).await;

    let second = d.on_manual_rebalance().await.unwrap().summary();
    assert_eq!(second.items_assigned, 0);
    assert!(second.did_rebalance);
    assert_eq!(holders(&d).await, first);
}

#[tokio::test]
async fn balanced_for_many_sizes() {
    for m in 1..=5_i64 {
        for n in [0_i64, 1, 4, 7, 13] {
            let workers: Vec<i64> = (1..=m).collect();
            let items: Vec<i64> = (1..=n).collect();
            let d = seeded_dispatcher(&workers, &[], &items).await;
            d.on_manual_rebalance().await.unwrap();

            let assigned = holders(&d).await;
            assert!(assigned.values().all(Option::is_some));

            let counts = loads(&d).await;
            let base = (n / m) as usize;
            let larger = counts.values().filter(|c| **c == base + 1).count();
            assert_eq!(larger, (n % m) as usize, "m={m} n={n}");
            assert!(counts.values().all(|c| *c == base || *c == base + 1));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_end_balanced() {
    let workers: Vec<i64> = (1..=8).collect();
    let d = seeded_dispatcher(&[], &workers, &(1..=50).collect::<Vec<_>>()).await;

    let logins = workers.iter().map(|id| {
        let d = Arc::clone(&d);
        let id = WorkerId(*id);
        tokio::spawn(async move { d.on_employee_login(id).await })
    });
    let results = timeout(TEST_TIMEOUT, futures::future::join_all(logins))
        .await
        .expect("logins hung");
    for result in results {
        result.unwrap().unwrap();
    }

    let assigned = holders(&d).await;
    assert_eq!(assigned.len(), 50);
    assert!(assigned.values().all(Option::is_some));

    let counts = loads(&d).await;
    assert_eq!(counts.len(), 8);
    assert_eq!(counts.values().filter(|c| **c == 7).count(), 2);
    assert_eq!(counts.values().filter(|c| **c == 6).count(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_login_logout_leaves_no_item_with_inactive_worker() {
    let d = seeded_dispatcher(&[1, 2, 3], &[4, 5], &(1..=30).collect::<Vec<_>>()).await;
    d.on_manual_rebalance().await.unwrap();

    let mut tasks = Vec::new();
    for id in [4, 5] {
        let d = Arc::clone(&d);
        tasks.push(tokio::spawn(async move { d.on_employee_login(WorkerId(id)).await }));
    }
    for id in [1, 2] {
        let d = Arc::clone(&d);
        tasks.push(tokio::spawn(async move { d.on_employee_logout(WorkerId(id)).await }));
    }
    let results = timeout(TEST_TIMEOUT, futures::future::join_all(tasks))
        .await
        .expect("triggers hung");
    for result in results {
        result.unwrap().unwrap();
    }

    let active = d.store().list_active_worker_ids().await.unwrap();
    assert_eq!(active, vec![WorkerId(3), WorkerId(4), WorkerId(5)]);
    for holder in holders(&d).await.values() {
        let holder = holder.expect("every pending item is assigned");
        assert!(active.contains(&holder), "item held by inactive worker {holder}");
    }
}

// ── HTTP hooks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    let base = start_server(seeded_dispatcher(&[], &[], &[]).await).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn http_login_then_rebalance_summary() {
    let d = seeded_dispatcher(&[1, 2], &[3], &(101..=110).collect::<Vec<_>>()).await;
    let base = start_server(Arc::clone(&d)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/employees/3/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "logged_in");
    assert_eq!(body["report"]["distribution"]["items_assigned"], 10);

    let resp = client
        .post(format!("{base}/api/admin/rebalance"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["activeWorkers"], 3);
    assert_eq!(summary["pendingItems"], 10);
    assert_eq!(summary["itemsAssigned"], 0);
    assert_eq!(summary["didRebalance"], true);

    let items: Value = client
        .get(format!("{base}/api/employees/1/items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn http_logout_reports_vacated_scope() {
    let d = seeded_dispatcher(&[1, 2], &[], &[1, 2, 3, 4]).await;
    d.on_manual_rebalance().await.unwrap();
    let base = start_server(Arc::clone(&d)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/employees/2/logout"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "logged_out");
    assert_eq!(body["report"]["scope"]["kind"], "vacated");
    assert_eq!(body["report"]["distribution"]["items_assigned"], 2);
    assert_eq!(loads(&d).await[&WorkerId(1)], 4);
}

#[tokio::test]
async fn http_unknown_and_invalid_employee() {
    let base = start_server(seeded_dispatcher(&[1], &[], &[]).await).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/employees/42/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let resp = client
        .post(format!("{base}/api/employees/not-a-number/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .get(format!("{base}/api/employees/42/items"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
