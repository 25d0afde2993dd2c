//! Administrative HTTP API for the sekisyo license registry.
//!
//! Routes (all require `Authorization: Bearer <admin_token>`):
//! - `GET /sekisyo/v1/plugins` lists every registered plugin with its license state
//! - `POST /sekisyo/v1/license/{id}` validates `{"license": "..."}` for a plugin
//! - `DELETE /sekisyo/v1/license/{id}` unlinks `{"license": "..."}` from a plugin

pub mod config;

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use sekisyo_license::{FailureMode, LicenseError, LicenseRegistry, PluginView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub use config::{build_registry, PluginEntry, ServerConfig};

/// Shared state for the admin routes.
pub struct AppState {
    pub registry: Arc<LicenseRegistry>,
    admin_token: String,
}

impl AppState {
    pub fn new(registry: Arc<LicenseRegistry>, admin_token: impl Into<String>) -> Self {
        Self {
            registry,
            admin_token: admin_token.into(),
        }
    }

    fn authorizes(&self, header: Option<&str>) -> bool {
        !self.admin_token.is_empty()
            && header
                .and_then(|h| h.strip_prefix("Bearer "))
                .is_some_and(|token| token == self.admin_token)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LicenseRequest {
    pub license: String,
}

#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    pub plugin: PluginView,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// A registry error rendered as an HTTP response.
pub struct ApiError(LicenseError);

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let (code, message) = match self.0 {
            LicenseError::Validation { message, .. } => ("validation_failed", message),
            LicenseError::Unlink { message, .. } => ("unlink_failed", message),
            LicenseError::NotFound(_) => ("not_found", "No plugin found.".to_string()),
            other => {
                if status.is_server_error() {
                    warn!(error = %other, "Admin request failed");
                }
                ("error", other.to_string())
            }
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

async fn require_capability(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.authorizes(header) {
        let body = ErrorResponse {
            code: "forbidden".to_string(),
            message: "You are not allowed to manage plugin licenses.".to_string(),
        };
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }
    next.run(request).await
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PluginView>>, ApiError> {
    Ok(Json(state.registry.views()?))
}

async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LicenseRequest>,
) -> Result<Json<LicenseResponse>, ApiError> {
    state
        .registry
        .validate_license(&id, &body.license, FailureMode::Invalidate)
        .await?;
    Ok(Json(LicenseResponse {
        plugin: state.registry.view(&id)?,
        message: "This license is valid.".to_string(),
    }))
}

async fn unlink_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LicenseRequest>,
) -> Result<Json<LicenseResponse>, ApiError> {
    state.registry.unlink_license(&id, &body.license).await?;
    Ok(Json(LicenseResponse {
        plugin: state.registry.view(&id)?,
        message: "License key is unlinked.".to_string(),
    }))
}

/// Build the admin API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sekisyo/v1/plugins", get(list_handler))
        .route(
            "/sekisyo/v1/license/{id}",
            post(validate_handler).delete(unlink_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_capability,
        ))
        .with_state(state)
}
