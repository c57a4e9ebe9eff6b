use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use vigil_api::{build_router, ApiState};
use vigil_core::AppConfig;
use vigil_ingest::IngestCoordinator;
use vigil_store::LogStore;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("vigil-api-test-{}", uuid::Uuid::new_v4()))
}

fn test_app() -> (axum::Router, PathBuf) {
    let dir = temp_dir();
    let mut config = AppConfig::default();
    config.anomaly.min_data_points = 2;
    config.anomaly.min_training_size = 2;

    let log = Arc::new(LogStore::new(&dir, 100).unwrap());
    let coordinator = Arc::new(IngestCoordinator::new(config, log));
    let state = Arc::new(ApiState {
        coordinator,
        metrics: PrometheusBuilder::new().build_recorder().handle(),
    });
    (build_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_active_sensors() {
    let (app, dir) = test_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sensors"], 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn analyze_returns_the_detector_verdict() {
    let (app, dir) = test_app();

    let request = post_json(
        "/analyze",
        json!({
            "sensor_id": "S1",
            "sensor_type": "temperature",
            "value": 21.5,
            "unit": "C"
        }),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["sensor_type"], "temperature");
    assert_eq!(body["is_anomaly"], false);
    assert_eq!(body["system_status"], "Initializing");

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn invalid_reading_yields_stable_error_shape() {
    let (app, dir) = test_app();

    let request = post_json(
        "/analyze",
        json!({ "sensor_type": "", "value": 1.0 }),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "validation");
    assert!(body["detail"].as_str().unwrap().contains("sensor_type"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn config_round_trip_via_http_is_identity() {
    let (app, dir) = test_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let config = body_json(response).await;

    let put = Request::builder()
        .method("PUT")
        .uri("/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(config.to_string()))
        .unwrap();
    let response = app.clone().oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await, config);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn invalid_config_update_is_rejected() {
    let (app, dir) = test_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut config = body_json(response).await;
    config["anomaly"]["z_score_threshold"] = json!(-1.0);

    let put = Request::builder()
        .method("PUT")
        .uri("/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(config.to_string()))
        .unwrap();
    let response = app.clone().oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn reset_clears_detector_state() {
    let (app, dir) = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/analyze",
            json!({ "sensor_type": "t", "value": 1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["active_sensors"], 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn auto_report_status_exposes_state_and_counters() {
    let (app, dir) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auto-report/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["current_state"], "NORMAL");
    assert_eq!(body["enabled"], true);
    assert_eq!(body["dispatch"]["reports_dispatched"], 0);
    assert_eq!(body["dispatch"]["reports_failed"], 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn history_groups_by_sensor_type() {
    let (app, dir) = test_app();

    for (sensor, value) in [("a", 1.0), ("b", 2.0), ("a", 3.0)] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/analyze",
                json!({ "sensor_type": sensor, "value": value }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["a"].as_array().unwrap().len(), 2);
    assert_eq!(body["b"].as_array().unwrap().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
