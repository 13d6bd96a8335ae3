//! REST API Handlers
//!
//! Implements the REST endpoints for backend, storage class, and
//! volume management.

use crate::config::{ORCHESTRATOR_NAME, ORCHESTRATOR_VERSION};
use crate::core::Orchestrator;
use crate::error::Error;
use crate::storage::volume::VolumeConfig;
use crate::storage_class::StorageClassConfig;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

/// Volume list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeListParams {
    /// Restrict to volumes hosted by backends of this driver.
    #[serde(default)]
    pub plugin: Option<String>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(err: Error) -> Response {
    let (status, code) = match &err {
        Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        Error::Exists { .. } => (StatusCode::CONFLICT, "exists"),
        Error::InvalidUpdate { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_update"),
        Error::NoBackend { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "no_backend"),
        Error::Configuration(_) | Error::Json(_) | Error::CapacityParse(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ApiErrorResponse {
            error: code.into(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    orchestrator: Arc<Orchestrator>,
}

impl RestRouter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator,
        };

        Router::new()
            // Backend endpoints
            .route("/v1/backends", post(add_backend))
            .route("/v1/backends", get(list_backends))
            .route("/v1/backends/:name", get(get_backend))
            .route("/v1/backends/:name", delete(offline_backend))
            // Storage class endpoints
            .route("/v1/storageclasses", post(add_storage_class))
            .route("/v1/storageclasses", get(list_storage_classes))
            .route("/v1/storageclasses/:name", get(get_storage_class))
            .route("/v1/storageclasses/:name", delete(delete_storage_class))
            // Volume endpoints
            .route("/v1/volumes", post(add_volume))
            .route("/v1/volumes", get(list_volumes))
            .route("/v1/volumes/:name", get(get_volume))
            .route("/v1/volumes/:name", delete(delete_volume))
            // Version endpoint
            .route("/v1/version", get(version))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

// =============================================================================
// Backend Handlers
// =============================================================================

/// Add or update a backend from its JSON configuration.
async fn add_backend(State(state): State<AppState>, body: String) -> impl IntoResponse {
    match state.orchestrator.add_storage_backend(&body).await {
        Ok(backend) => {
            info!("Added backend {} via REST", backend.name);
            (StatusCode::CREATED, Json(backend)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_backends(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.list_backends().await)
}

async fn get_backend(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.get_backend(&name).await {
        Ok(backend) => Json(backend).into_response(),
        Err(err) => error_response(err),
    }
}

async fn offline_backend(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.offline_backend(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// =============================================================================
// Storage Class Handlers
// =============================================================================

async fn add_storage_class(
    State(state): State<AppState>,
    Json(config): Json<StorageClassConfig>,
) -> impl IntoResponse {
    match state.orchestrator.add_storage_class(config).await {
        Ok(storage_class) => (StatusCode::CREATED, Json(storage_class)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_storage_classes(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.list_storage_classes().await)
}

async fn get_storage_class(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.get_storage_class(&name).await {
        Ok(storage_class) => Json(storage_class).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_storage_class(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.delete_storage_class(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// =============================================================================
// Volume Handlers
// =============================================================================

async fn add_volume(
    State(state): State<AppState>,
    Json(config): Json<VolumeConfig>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    debug!(
        "Provisioning volume {} (request {})",
        config.name, request_id
    );
    match state.orchestrator.add_volume(config).await {
        Ok(volume) => {
            info!(
                "Provisioned volume {} on backend {} (request {})",
                volume.config.name, volume.backend, request_id
            );
            (StatusCode::CREATED, Json(volume)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_volumes(
    State(state): State<AppState>,
    Query(params): Query<VolumeListParams>,
) -> impl IntoResponse {
    match params.plugin {
        Some(plugin) => Json(state.orchestrator.list_volumes_by_plugin(&plugin).await),
        None => Json(state.orchestrator.list_volumes().await),
    }
}

async fn get_volume(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.orchestrator.get_volume(&name).await {
        Ok(volume) => Json(volume).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_volume(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.delete_volume(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// =============================================================================
// Misc Handlers
// =============================================================================

async fn version() -> impl IntoResponse {
    Json(VersionResponse {
        name: ORCHESTRATOR_NAME.into(),
        version: ORCHESTRATOR_VERSION.into(),
    })
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness_check() -> impl IntoResponse {
    StatusCode::OK
}
