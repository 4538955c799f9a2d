//! API Handlers Module
//!
//! HTTP handlers for the volume admin REST API endpoints.
//! Handlers stay thin: the negotiation middleware pins the request
//! version, the lifecycle controller owns the semantics, and this module
//! only maps between the wire and the controller.

use crate::config::VolumeAdminConfig;
use crate::lifecycle::{LifecycleController, ServiceAction};
use crate::models::{
    Binary, ClusterShowResponse, ClusterStatusResponse, ClusterTargetBody, ClustersListResponse,
    GetLogBody, HeartbeatRequest, LogLevelsResponse, ServiceStatusResponse, ServiceTargetBody,
    ServicesListResponse, SetLogBody,
};
use crate::negotiate::{negotiate_version, RequestVersion};
use crate::{AdminError, Result, VERSION};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VolumeAdminConfig>,
    pub controller: Arc<LifecycleController>,
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub title: String,
    pub message: String,
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::InvalidInput(_) | AdminError::Validation(_) | AdminError::Version(_) => {
                StatusCode::BAD_REQUEST
            }
            AdminError::VersionNotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            AdminError::UnsupportedVersion { .. } | AdminError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AdminError::RpcTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdminError::Rpc(_) => StatusCode::BAD_GATEWAY,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                code: status.as_u16(),
                title: status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Version discovery response
#[derive(Debug, Clone, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub id: String,
    pub status: String,
    pub min_version: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub host: Option<String>,
    pub binary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListClustersQuery {
    pub name: Option<String>,
    pub binary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShowClusterQuery {
    pub binary: Option<String>,
}

/// Create the main router with all API routes
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout();
    Router::new()
        // Version discovery
        .route("/", get(list_versions))
        .route("/v3", get(list_versions))
        // Service lifecycle routes
        .route("/v3/os-services", get(list_services))
        .route("/v3/os-services/:action", put(update_service))
        // Cluster routes; `detail` is a static segment and wins over the
        // name capture
        .route("/v3/clusters", get(list_clusters))
        .route("/v3/clusters/detail", get(list_clusters_detail))
        .route("/v3/clusters/:param", get(show_cluster).put(update_cluster))
        // Backend-facing routes
        .route("/internal/v1/heartbeat", post(heartbeat))
        // Operational routes
        .route("/health", get(health_check))
        .layer(middleware::from_fn(negotiate_version))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_versions() -> Json<VersionsResponse> {
    use storcore_shared::mv;
    Json(VersionsResponse {
        versions: vec![VersionEntry {
            id: format!("v{}", mv::BASE_VERSION),
            status: "CURRENT".to_string(),
            min_version: mv::BASE_VERSION.to_string(),
            version: mv::MAX_VERSION.to_string(),
        }],
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: VERSION.to_string(),
    })
}

async fn list_services(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<ServicesListResponse>> {
    let binary = parse_binary_query(query.binary.as_deref())?;
    let response = state
        .controller
        .list_services(rv.version, query.host.as_deref(), binary)
        .await?;
    Ok(Json(response))
}

/// Dispatch `PUT /v3/os-services/{action}`. An unknown action segment is
/// not a route.
async fn update_service(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response> {
    let action = ServiceAction::from_path(&action)
        .ok_or_else(|| AdminError::NotFound(format!("Action {action:?}")))?;

    match action {
        ServiceAction::Enable | ServiceAction::Disable | ServiceAction::DisableLogReason => {
            let body: ServiceTargetBody = decode_body(body)?;
            let response: ServiceStatusResponse = state
                .controller
                .set_service_status(action, rv.version, body)
                .await?;
            Ok(Json(response).into_response())
        }
        ServiceAction::Freeze | ServiceAction::Thaw => {
            let body: ServiceTargetBody = decode_body(body)?;
            state.controller.set_frozen(action, rv.version, body).await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        ServiceAction::FailoverHost | ServiceAction::Failover => {
            let body: ServiceTargetBody = decode_body(body)?;
            state.controller.failover(action, rv.version, body).await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        ServiceAction::SetLog => {
            let body: SetLogBody = decode_body(body)?;
            state.controller.set_log(rv.version, body).await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        ServiceAction::GetLog => {
            let body: GetLogBody = decode_body(body)?;
            let response: LogLevelsResponse = state.controller.get_log(rv.version, body).await?;
            Ok(Json(response).into_response())
        }
    }
}

async fn list_clusters(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Query(query): Query<ListClustersQuery>,
) -> Result<Json<ClustersListResponse>> {
    let binary = parse_binary_query(query.binary.as_deref())?;
    let response = state
        .controller
        .list_clusters(rv.version, false, query.name.as_deref(), binary)
        .await?;
    Ok(Json(response))
}

async fn list_clusters_detail(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Query(query): Query<ListClustersQuery>,
) -> Result<Json<ClustersListResponse>> {
    let binary = parse_binary_query(query.binary.as_deref())?;
    let response = state
        .controller
        .list_clusters(rv.version, true, query.name.as_deref(), binary)
        .await?;
    Ok(Json(response))
}

async fn show_cluster(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Path(name): Path<String>,
    Query(query): Query<ShowClusterQuery>,
) -> Result<Json<ClusterShowResponse>> {
    let binary = parse_binary_query(query.binary.as_deref())?;
    let response = state.controller.show_cluster(rv.version, &name, binary).await?;
    Ok(Json(response))
}

/// `PUT /v3/clusters/{enable|disable}`; the cluster itself is named in
/// the body.
async fn update_cluster(
    State(state): State<AppState>,
    Extension(rv): Extension<RequestVersion>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ClusterStatusResponse>> {
    let disable = match action.as_str() {
        "enable" => false,
        "disable" => true,
        other => return Err(AdminError::NotFound(format!("Action {other:?}"))),
    };
    let body: ClusterTargetBody = decode_body(body)?;
    let response = state
        .controller
        .set_cluster_status(rv.version, disable, body)
        .await?;
    Ok(Json(response))
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<StatusCode> {
    let request: HeartbeatRequest = decode_body(body)?;
    state.controller.heartbeat(request).await?;
    Ok(StatusCode::OK)
}

fn decode_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| AdminError::InvalidInput(e.to_string()))
}

fn parse_binary_query(raw: Option<&str>) -> Result<Option<Binary>> {
    raw.map(Binary::from_str).transpose()
}
