//! REST API handlers.
//!
//! Workload and reading handlers read/write via `StateStore`; status and
//! metrics handlers read the autoscaler's latest cycle report.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use orbital_autoscale::epoch_secs;
use orbital_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ── Workloads ──────────────────────────────────────────────────

/// Workload registration body.
#[derive(Debug, Deserialize)]
pub struct WorkloadRequest {
    pub namespace: String,
    pub name: String,
    /// Initial replicas; defaults to `min_replicas` for a new workload and
    /// to the current count for an existing one.
    pub replicas: Option<u32>,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub metrics: Vec<MetricTarget>,
}

/// GET /api/v1/workloads
pub async fn list_workloads(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_workloads() {
        Ok(workloads) => ApiResponse::ok(workloads).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/workloads/{id}
pub async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/workloads
///
/// Creates the workload, or updates bounds and metrics of an existing one
/// while keeping its creation time and, unless given, its replica count.
/// The read of the stored record and the write share one transaction.
pub async fn put_workload(
    State(state): State<ApiState>,
    Json(req): Json<WorkloadRequest>,
) -> impl IntoResponse {
    let id = format!("{}/{}", req.namespace, req.name);
    let now = epoch_secs();

    let result = state.store.upsert_workload(&id, |existing| WorkloadRecord {
        id: id.clone(),
        replicas: req
            .replicas
            .or(existing.map(|w| w.replicas))
            .unwrap_or(req.min_replicas),
        namespace: req.namespace,
        name: req.name,
        min_replicas: req.min_replicas,
        max_replicas: req.max_replicas,
        metrics: req.metrics,
        created_at: existing.map_or(now, |w| w.created_at),
        updated_at: now,
    });

    match result {
        Ok((record, created)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, ApiResponse::ok(record)).into_response()
        }
        Err(e @ StateError::Invalid(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/workloads/{id}
pub async fn delete_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_workload(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Readings ───────────────────────────────────────────────────

/// Reading ingestion body.
#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub metric: String,
    pub value: f64,
    /// Unix seconds; defaults to now.
    pub epoch: Option<u64>,
}

/// POST /api/v1/workloads/{id}/readings
pub async fn record_reading(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ReadingRequest>,
) -> impl IntoResponse {
    if !(req.value.is_finite() && req.value >= 0.0) {
        return error_response("value must be a non-negative number", StatusCode::BAD_REQUEST)
            .into_response();
    }

    match state.store.get_workload(&id) {
        Ok(Some(workload)) => {
            if !workload.metrics.iter().any(|m| m.metric == req.metric) {
                return error_response(
                    &format!("workload {id} does not scale on metric {}", req.metric),
                    StatusCode::BAD_REQUEST,
                )
                .into_response();
            }
        }
        Ok(None) => {
            return error_response("workload not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }

    let reading = MetricReading {
        workload_id: id,
        metric: req.metric,
        value: req.value,
        epoch: req.epoch.unwrap_or_else(epoch_secs),
    };

    match state.store.put_reading(&reading) {
        Ok(()) => {
            debug!(workload = %reading.workload_id, metric = %reading.metric, value = reading.value, "reading recorded");
            (StatusCode::CREATED, ApiResponse::ok(reading)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Autoscaler ─────────────────────────────────────────────────

/// GET /api/v1/status
///
/// `data` is null until the first cycle completes.
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.status.latest().await).into_response()
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let latest = state.status.latest().await;
    let body = orbital_autoscale::render_prometheus(latest.as_ref());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
