use super::{ApiError, AppState};
use crate::spotify::{is_spotify_id, Credentials, PlayerCommand, PlayerState, SpotifyError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/play", post(play))
        .route("/pause", post(pause))
        .route("/next", post(next))
        .route("/previous", post(previous))
        .route("/current-song", get(current_song))
        .route("/player-state", get(player_state))
        .route("/playlist/:playlist_id", get(playlist))
        .route("/play-track", post(play_track))
        .route("/repeat", post(repeat))
        .route("/shuffle", post(shuffle))
        .route("/set-volume", put(set_volume))
        .route("/get-volume", get(get_volume))
        .route("/playlists", get(playlists))
}

async fn credentials(state: &AppState) -> Result<Credentials, SpotifyError> {
    let settings = state.settings.read().await;
    match (
        &settings.spotify_client_id,
        &settings.spotify_client_secret,
        &settings.spotify_refresh_token,
    ) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Credentials {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            refresh_token: refresh_token.clone(),
        }),
        _ => Err(SpotifyError::MissingCredentials),
    }
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn run_command(state: AppState, cmd: PlayerCommand) -> Result<Json<Value>, ApiError> {
    let creds = credentials(&state).await?;
    state.spotify.command(&creds, cmd).await?;
    Ok(success())
}

async fn play(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    run_command(state, PlayerCommand::Play).await
}

async fn pause(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    run_command(state, PlayerCommand::Pause).await
}

async fn next(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    run_command(state, PlayerCommand::Next).await
}

async fn previous(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    run_command(state, PlayerCommand::Previous).await
}

async fn current_song(State(state): State<AppState>) -> Result<Response, ApiError> {
    let creds = credentials(&state).await?;
    Ok(match state.spotify.current_song(&creds).await? {
        Some(song) => Json(song).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn player_state(State(state): State<AppState>) -> Result<Json<PlayerState>, ApiError> {
    let creds = credentials(&state).await?;
    Ok(Json(state.spotify.player_state(&creds).await?))
}

async fn playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !is_spotify_id(&playlist_id) {
        return Err(SpotifyError::InvalidId(playlist_id).into());
    }
    let creds = credentials(&state).await?;
    Ok(Json(state.spotify.playlist(&creds, &playlist_id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct PlayTrackRequest {
    uri: Option<String>,
    #[serde(rename = "playlistId")]
    playlist_id: Option<String>,
}

async fn play_track(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: PlayTrackRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(uri) = req.uri.filter(|u| !u.is_empty()) else {
        return Err(ApiError::bad_request("No URI provided"));
    };
    let creds = credentials(&state).await?;
    state
        .spotify
        .play_track(&creds, &uri, req.playlist_id.as_deref())
        .await?;
    Ok(success())
}

async fn repeat(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let creds = credentials(&state).await?;
    let mode = state.spotify.toggle_repeat(&creds).await?;
    Ok(Json(json!({ "success": true, "mode": mode })))
}

async fn shuffle(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let creds = credentials(&state).await?;
    let on = state.spotify.toggle_shuffle(&creds).await?;
    Ok(Json(json!({ "success": true, "shuffle_state": on })))
}

/// `volume` must be a plain non-negative integer; values above 100 are capped.
fn parse_volume(raw: Option<&String>) -> Option<u8> {
    let raw = raw?;
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: u64 = raw.parse().ok()?;
    Some(value.min(100) as u8)
}

async fn set_volume(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let Some(volume) = parse_volume(params.get("volume")) else {
        return Err(ApiError::bad_request("Invalid volume value"));
    };
    let creds = credentials(&state).await?;
    state.spotify.set_volume(&creds, volume).await?;
    Ok(success())
}

async fn get_volume(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let creds = credentials(&state).await?;
    match state.spotify.volume(&creds).await? {
        Some(volume) => Ok(Json(json!({ "volume_percent": volume }))),
        None => Err(ApiError::not_found("No active device found")),
    }
}

async fn playlists(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let creds = credentials(&state).await?;
    Ok(Json(state.spotify.playlists(&creds).await?))
}
