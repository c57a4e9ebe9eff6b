use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vigil_core::types::{AnomalyResult, Reading};
use vigil_core::{AppConfig, ReportingConfig};
use vigil_detect::DetectorStats;
use vigil_ingest::{AutoReportStatus, HealthInfo};

use crate::error::ApiError;
use crate::ApiState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub sensor_id: Option<String>,
    pub sensor_type: String,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl AnalyzeRequest {
    fn into_reading(self) -> Reading {
        Reading {
            sensor_id: self.sensor_id.unwrap_or_else(|| "unknown".to_string()),
            sensor_type: self.sensor_type,
            value: self.value,
            unit: self.unit.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// POST /analyze
pub async fn analyze(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnomalyResult>, ApiError> {
    let timeout_ms = state.coordinator.config().await.server.request_timeout_ms;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let result = state
        .coordinator
        .ingest_with_deadline(request.into_reading(), Some(deadline))
        .await?;
    Ok(Json(result))
}

/// GET /stats
pub async fn stats(State(state): State<Arc<ApiState>>) -> Json<DetectorStats> {
    Json(state.coordinator.stats().await)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /history
pub async fn history(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HashMap<String, Vec<AnomalyResult>>> {
    Json(state.coordinator.history(query.limit.unwrap_or(100)).await)
}

/// GET /anomalies
pub async fn anomalies(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let anomalies = state
        .coordinator
        .recent_anomalies(query.limit.unwrap_or(100))
        .await;
    let stats = state.coordinator.log_stats().await;
    Json(json!({ "anomalies": anomalies, "stats": stats }))
}

/// GET /config
pub async fn get_config(State(state): State<Arc<ApiState>>) -> Json<AppConfig> {
    Json((*state.coordinator.config().await).clone())
}

/// PUT /config
pub async fn put_config(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<AppConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.coordinator.update_config(config).await?;
    Ok(Json(json!({ "status": "updated" })))
}

/// POST /reset
pub async fn reset(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    state.coordinator.reset().await;
    Json(json!({ "status": "reset" }))
}

/// GET /health
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthInfo> {
    Json(state.coordinator.health().await)
}

/// GET /auto-report/status
pub async fn auto_report_status(State(state): State<Arc<ApiState>>) -> Json<AutoReportStatus> {
    Json(state.coordinator.auto_report_status().await)
}

/// PUT /auto-report/config
pub async fn put_auto_report_config(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<ReportingConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.coordinator.update_reporting(config).await?;
    Ok(Json(json!({ "status": "updated" })))
}

/// POST /auto-report/clear-buffer
pub async fn clear_auto_report_buffer(
    State(state): State<Arc<ApiState>>,
) -> Json<serde_json::Value> {
    state.coordinator.clear_reporter_buffer().await;
    Json(json!({ "status": "cleared" }))
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<ApiState>>) -> String {
    state.metrics.render()
}
