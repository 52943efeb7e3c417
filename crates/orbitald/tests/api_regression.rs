//! API regression tests.
//!
//! Drives the assembled router the way the daemon serves it: workload
//! registration, reading ingestion, status, and Prometheus exposition.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use orbital_api::build_router;
use orbital_autoscale::{
    AutoscaleError, ControllerStatus, CycleReport, CycleSummary, TargetEvaluation,
};
use orbital_state::StateStore;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_router() -> (Router, StateStore, ControllerStatus) {
    let store = StateStore::open_in_memory().unwrap();
    let status = ControllerStatus::new();
    (build_router(store.clone(), status.clone()), store, status)
}

fn workload_body(ns: &str, name: &str) -> Value {
    json!({
        "namespace": ns,
        "name": name,
        "min_replicas": 2,
        "max_replicas": 10,
        "metrics": [{ "metric": "cpu", "target_value": 50.0 }]
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let (router, _, _) = test_router();
    let resp = router.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_and_get_workload() {
    let (router, _, _) = test_router();

    let resp = router
        .clone()
        .oneshot(post("/api/v1/workloads", &workload_body("default", "api")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router
        .oneshot(get("/api/v1/workloads/default%2Fapi"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "default/api");
    assert_eq!(body["data"]["replicas"], 2);
}

#[tokio::test]
async fn reregistering_returns_ok() {
    let (router, _, _) = test_router();
    let body = workload_body("default", "api");

    let first = router
        .clone()
        .oneshot(post("/api/v1/workloads", &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router
        .oneshot(post("/api/v1/workloads", &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_workload_is_bad_request() {
    let (router, store, _) = test_router();
    let mut body = workload_body("default", "api");
    body["metrics"] = json!([]);

    let resp = router
        .oneshot(post("/api/v1/workloads", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(store.list_workloads().unwrap().is_empty());
}

#[tokio::test]
async fn delete_workload_drops_its_readings() {
    let (router, store, _) = test_router();
    router
        .clone()
        .oneshot(post("/api/v1/workloads", &workload_body("default", "web")))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(post(
            "/api/v1/workloads/default%2Fweb/readings",
            &json!({ "metric": "cpu", "value": 40.0, "epoch": 1000 }),
        ))
        .await
        .unwrap();

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/v1/workloads/default%2Fweb")
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(get("/api/v1/workloads/default%2Fweb"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(
        store
            .readings_in_range("default/web", "cpu", 0, 2000)
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn readings_are_stored_and_validated() {
    let (router, store, _) = test_router();
    router
        .clone()
        .oneshot(post("/api/v1/workloads", &workload_body("default", "api")))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(post(
            "/api/v1/workloads/default%2Fapi/readings",
            &json!({ "metric": "cpu", "value": 90.0, "epoch": 1000 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router
        .clone()
        .oneshot(post(
            "/api/v1/workloads/default%2Fapi/readings",
            &json!({ "metric": "memory", "value": 1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .oneshot(post(
            "/api/v1/workloads/other%2Fsvc/readings",
            &json!({ "metric": "cpu", "value": 1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let stored = store
        .readings_in_range("default/api", "cpu", 0, 2000)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].value, 90.0);
}

#[tokio::test]
async fn status_is_null_before_first_cycle() {
    let (router, _, _) = test_router();
    let resp = router.oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn status_reports_published_cycle() {
    let (router, _, status) = test_router();
    let id = "default/api".to_string();
    let evaluations = vec![TargetEvaluation::failed(
        &id,
        Some(4),
        &AutoscaleError::NoUsableMetrics(id.clone()),
    )];
    status
        .publish(CycleReport {
            summary: CycleSummary::tally(3, 1000, 12, &evaluations, 1),
            evaluations,
        })
        .await;

    let resp = router.oneshot(get("/api/v1/status")).await.unwrap();
    let body = body_json(resp).await;
    let report = &body["data"];
    assert_eq!(report["summary"]["cycle"], 3);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["skipped"], 1);
    assert_eq!(report["evaluations"][0]["target"], "default/api");
    assert_eq!(report["evaluations"][0]["outcome"], "failed");
    assert_eq!(report["evaluations"][0]["error_kind"], "no_usable_metrics");
}

#[tokio::test]
async fn skipped_cycle_surfaces_its_error() {
    let (router, _, status) = test_router();
    status
        .publish(CycleReport::skipped(
            7,
            1000,
            5,
            &AutoscaleError::ListTargets("capacity api down".to_string()),
        ))
        .await;

    let resp = router.oneshot(get("/api/v1/status")).await.unwrap();
    let body = body_json(resp).await;
    let error = body["data"]["summary"]["error"].as_str().unwrap();
    assert!(error.contains("capacity api down"));
}

#[tokio::test]
async fn prometheus_exposes_latest_cycle() {
    let (router, _, status) = test_router();
    let id = "default/api".to_string();
    let evaluations = vec![TargetEvaluation::failed(
        &id,
        Some(4),
        &AutoscaleError::CycleTimeout(id.clone()),
    )];
    status
        .publish(CycleReport {
            summary: CycleSummary::tally(2, 1000, 30, &evaluations, 0),
            evaluations,
        })
        .await;

    let resp = router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("orbital_target_current_replicas{target=\"default/api\"} 4"));
    assert!(text.contains("orbital_target_failed{target=\"default/api\"} 1"));
    assert!(text.contains("orbital_cycle_number 2"));
}
