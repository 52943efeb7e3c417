//! orbital-api — REST API for the Orbital autoscaler.
//!
//! Provides axum route handlers for registering workloads, ingesting
//! metric readings, and inspecting the autoscaler's latest cycle.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/api/v1/workloads` | List all workloads |
//! | POST | `/api/v1/workloads` | Register or update a workload |
//! | GET | `/api/v1/workloads/{id}` | Get workload details |
//! | DELETE | `/api/v1/workloads/{id}` | Remove a workload and its readings |
//! | POST | `/api/v1/workloads/{id}/readings` | Record a metric reading |
//! | GET | `/api/v1/status` | Latest cycle report |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Workload IDs contain a `/` and must be percent-encoded in paths
//! (`default%2Fapi`).

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use orbital_autoscale::ControllerStatus;
use orbital_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub status: ControllerStatus,
}

/// Build the complete API router (REST + status + metrics).
pub fn build_router(store: StateStore, status: ControllerStatus) -> Router {
    let api_state = ApiState { store, status };

    let api_routes = Router::new()
        .route("/workloads", get(handlers::list_workloads).post(handlers::put_workload))
        .route("/workloads/{id}", get(handlers::get_workload).delete(handlers::delete_workload))
        .route("/workloads/{id}/readings", post(handlers::record_reading))
        .route("/status", get(handlers::status))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
