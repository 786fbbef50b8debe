//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::errors::PlatformError;
use crate::health::HealthReport;
use crate::models::app::{AppStatus, Application};
use crate::server::state::ServerState;
use crate::supervisor::fsm::ProcessState;
use crate::telemetry::{host_metrics, ProcessMetrics};
use crate::utils::version_info;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Platform errors rendered as JSON with a matching status code
pub struct ApiError(PlatformError);

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::Forbidden(_) => StatusCode::FORBIDDEN,
            PlatformError::Conflict(_) => StatusCode::CONFLICT,
            PlatformError::ValidationError(_) | PlatformError::ArtifactError(_) => StatusCode::BAD_REQUEST,
            PlatformError::PortsExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.0.is_user_error() {
            error!("Admin request failed: {}", self.0);
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub running_apps: usize,
    pub proxy_in_sync: bool,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "apphost".to_string(),
        version: version_info().version,
        running_apps: state.platform.supervisor().processes().len(),
        proxy_in_sync: !state.platform.proxy().is_dirty(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Application summary
#[derive(Debug, Serialize)]
pub struct AppSummary {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub hostnames: Vec<String>,
    pub port: u16,
    pub status: AppStatus,
    pub process: ProcessState,
    pub pid: Option<u32>,
    pub active_deployment_id: Option<String>,
}

fn summarize(state: &ServerState, app: Application) -> AppSummary {
    let supervisor = state.platform.supervisor();
    AppSummary {
        hostnames: app.hostnames(state.platform.proxy().base_domain()),
        process: supervisor.state(&app.id),
        pid: supervisor.pid(&app.id),
        id: app.id,
        owner_id: app.owner_id,
        name: app.name,
        port: app.port,
        status: app.status,
        active_deployment_id: app.active_deployment_id,
    }
}

/// Applications response
#[derive(Debug, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<AppSummary>,
    pub total: usize,
}

/// Every application handler
pub async fn apps_handler(State(state): State<Arc<ServerState>>) -> Result<Json<AppsResponse>, ApiError> {
    let apps: Vec<_> = state
        .platform
        .all_apps()
        .await?
        .into_iter()
        .map(|app| summarize(&state, app))
        .collect();
    let total = apps.len();
    Ok(Json(AppsResponse { apps, total }))
}

/// Single application handler
pub async fn app_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<AppSummary>, ApiError> {
    let app = state.platform.app(&id).await?;
    Ok(Json(summarize(&state, app)))
}

/// Application health response
#[derive(Debug, Serialize)]
pub struct AppHealthResponse {
    pub app_id: String,
    pub running: bool,
    pub report: Option<HealthReport>,
}

/// Application health handler
pub async fn app_health_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<AppHealthResponse>, ApiError> {
    let report = state.platform.check_health(&id).await?;
    Ok(Json(AppHealthResponse {
        running: report.is_some(),
        app_id: id,
        report,
    }))
}

/// Application metrics response
#[derive(Debug, Serialize)]
pub struct AppMetricsResponse {
    pub app_id: String,
    pub metrics: Option<ProcessMetrics>,
}

/// Application metrics handler
pub async fn app_metrics_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<AppMetricsResponse>, ApiError> {
    let metrics = state.platform.metrics(&id).await?;
    Ok(Json(AppMetricsResponse { app_id: id, metrics }))
}

/// Host metrics handler
pub async fn host_metrics_handler() -> impl IntoResponse {
    let metrics = tokio::task::spawn_blocking(host_metrics).await;
    match metrics {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => ApiError(PlatformError::Internal(e.to_string())).into_response(),
    }
}
