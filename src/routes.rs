//! REST hooks called by the session and admin layers.
//!
//! Login and logout answer 200 once the employee's status change is stored.
//! If the redistribution pass after it fails, the error is reported in the
//! body and the status change stands. A failed status write is a 500, and a
//! lock that never frees is a 503; in both cases nothing changed.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::warn;

use crate::dispatch::{Dispatcher, LifecycleReport, WorkerId};
use crate::error::DispatchError;

/// Shared state for dispatch routes.
#[derive(Clone)]
pub struct DispatchState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the dispatch REST routes.
pub fn dispatch_routes(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/employees/{id}/login", post(login))
        .route("/api/employees/{id}/logout", post(logout))
        .route("/api/employees/{id}/items", get(assigned_items))
        .route("/api/admin/rebalance", post(rebalance))
        .with_state(DispatchState { dispatcher })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "recharge-dispatch"
    }))
}

fn parse_worker_id(id: &str) -> Option<WorkerId> {
    id.parse::<i64>().ok().map(WorkerId)
}

fn bad_worker_id() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "Invalid employee ID"})),
    )
}

fn unknown_worker(id: WorkerId) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("Employee {id} not found")})),
    )
}

/// Shape a login/logout hook result.
fn lifecycle_response(
    status: &str,
    worker_id: WorkerId,
    result: Result<LifecycleReport, DispatchError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": status, "report": report})),
        ),
        Err(DispatchError::UnknownWorker(id)) => unknown_worker(id),
        Err(e) if e.status_persisted() => {
            warn!(worker_id = %worker_id, error = %e, "Redistribution failed after {status}");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": status,
                    "report": null,
                    "redistribution_error": e.to_string(),
                })),
            )
        }
        Err(e) => {
            warn!(worker_id = %worker_id, error = %e, "Status change not applied");
            let code = match e {
                DispatchError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, Json(serde_json::json!({"error": e.to_string()})))
        }
    }
}

/// POST /api/employees/{id}/login
async fn login(State(state): State<DispatchState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(worker_id) = parse_worker_id(&id) else {
        return bad_worker_id();
    };
    let result = state.dispatcher.on_employee_login(worker_id).await;
    lifecycle_response("logged_in", worker_id, result)
}

/// POST /api/employees/{id}/logout
async fn logout(State(state): State<DispatchState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(worker_id) = parse_worker_id(&id) else {
        return bad_worker_id();
    };
    let result = state.dispatcher.on_employee_logout(worker_id).await;
    lifecycle_response("logged_out", worker_id, result)
}

/// GET /api/employees/{id}/items
async fn assigned_items(
    State(state): State<DispatchState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(worker_id) = parse_worker_id(&id) else {
        return bad_worker_id();
    };
    match state.dispatcher.assigned_items(worker_id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!(items))),
        Err(DispatchError::UnknownWorker(id)) => unknown_worker(id),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// POST /api/admin/rebalance
async fn rebalance(State(state): State<DispatchState>) -> impl IntoResponse {
    match state.dispatcher.on_manual_rebalance().await {
        Ok(report) => (StatusCode::OK, Json(serde_json::json!(report.summary()))),
        Err(e) => {
            warn!(error = %e, "Manual rebalance failed");
            let status = if e.is_retryable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(serde_json::json!({"error": e.to_string()})))
        }
    }
}
