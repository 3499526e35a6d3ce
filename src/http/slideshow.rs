use super::{ApiError, AppState};
use crate::uploads::{StoreOutcome, UploadStore};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{info, warn};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/images", get(list_images))
        .route("/uploads/:filename", get(uploaded_file))
}

async fn store_for(state: &AppState) -> UploadStore {
    UploadStore::new(
        state.settings.read().await.upload_folder.clone(),
        state.upload_lock.clone(),
    )
}

fn content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let store = store_for(&state).await;
    let mut saw_file_field = false;
    let mut uploaded = Vec::new();
    let mut duplicates = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        saw_file_field = true;
        let Some(name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;

        match store.store(&name, &bytes).await {
            Ok(StoreOutcome::Stored(stored)) => uploaded.push(stored),
            Ok(StoreOutcome::Duplicate(existing)) => {
                info!(file = %name, existing = %existing, "duplicate upload skipped");
                duplicates.push(name);
            }
            Err(crate::uploads::UploadError::InvalidName(raw)) => {
                warn!(file = %raw, "upload with unusable file name skipped");
            }
            Err(err) => return Err(err.into()),
        }
    }

    if !saw_file_field {
        return Err(ApiError::bad_request("No file part"));
    }
    if uploaded.is_empty() && duplicates.is_empty() {
        return Err(ApiError::bad_request("No valid files uploaded"));
    }

    let message = if uploaded.is_empty() {
        "All files were already uploaded"
    } else {
        "Files uploaded successfully!"
    };
    info!(uploaded = uploaded.len(), duplicates = duplicates.len(), "slideshow upload finished");
    Ok(Json(json!({
        "message": message,
        "uploaded_files": uploaded,
        "duplicates": duplicates,
    })))
}

async fn list_images(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(store_for(&state).await.list_images().await?))
}

async fn uploaded_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let store = store_for(&state).await;
    let Some(path) = store.path_of(&filename).await else {
        return Err(ApiError::not_found(format!("{filename} not found")));
    };
    let bytes = tokio::fs::read(&path).await?;
    let mut response = (StatusCode::OK, Body::from(bytes)).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&filename)));
    Ok(response)
}
