mod config_api;
mod monitoring;
mod pages;
mod slideshow;
mod spotify;
mod ws;

use crate::collectors::upstream::TelemetrySource;
use crate::hub::SnapshotHub;
use crate::metrics::Metrics;
use crate::spotify::{SpotifyClient, SpotifyError};
use crate::state::MonitorSettings;
use crate::uploads::{IndexLock, UploadError};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tower_http::cors::CorsLayer;
use tracing::error;

/// Files behind `/config`.
#[derive(Debug, Clone)]
pub struct ConfigFiles {
    pub env_file: PathBuf,
    pub frontend_config: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub hub: SnapshotHub,
    pub settings: Arc<RwLock<MonitorSettings>>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub spotify: Arc<SpotifyClient>,
    pub files: Arc<ConfigFiles>,
    /// Held while a slideshow upload updates the hash index.
    pub upload_lock: IndexLock,
    /// Flips to `true` on shutdown; long-lived WebSocket streams end on it.
    pub shutdown: watch::Receiver<bool>,
}

/// JSON error body `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(err: impl Display) -> Self {
        error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<io::Error> for ApiError {
    fn from(err: io::Error) -> Self {
        Self::internal(err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidName(_) => Self::bad_request(err.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<SpotifyError> for ApiError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::MissingCredentials | SpotifyError::Token(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "Failed to get access token")
            }
            SpotifyError::NoActiveDevice => Self::not_found(err.to_string()),
            SpotifyError::InvalidId(_) => Self::bad_request(err.to_string()),
            SpotifyError::Request(ref source) => {
                error!(error = %source, "Spotify request failed");
                Self::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
            SpotifyError::Upstream { status, body } => Self {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            },
        }
    }
}

/// Runs blocking file work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws::ws_handler))
        .route(
            "/config",
            get(config_api::get_config).post(config_api::save_config),
        )
        .nest("/monitoring", monitoring::routes())
        .nest("/slideshow", slideshow::routes())
        .nest("/spotify", spotify::routes());

    if let Some(dir) = static_dir {
        router = pages::routes(router, dir);
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}
