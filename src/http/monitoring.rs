use super::{ApiError, AppState};
use crate::collectors::sensor_tree::{find_value, MISSING_VALUE};
use crate::wol::{send_magic_packet, WakeError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(3);
const PING_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/wake", post(wake))
        .route("/ping", get(ping))
        .route("/stats", get(stats))
}

async fn monitored_host(state: &AppState) -> Result<String, ApiError> {
    state
        .settings
        .read()
        .await
        .monitored_host
        .clone()
        .ok_or_else(|| ApiError::bad_request("MONITORED_PC_IP not configured"))
}

async fn wake(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mac = state
        .settings
        .read()
        .await
        .monitored_mac
        .clone()
        .ok_or_else(|| ApiError::bad_request("MAC address not configured"))?;

    send_magic_packet(&mac).await.map_err(|err| match err {
        WakeError::InvalidMac(_) => ApiError::bad_request(err.to_string()),
        WakeError::Io(_) => ApiError::internal(err),
    })?;
    info!(mac = %mac, "magic packet sent");
    Ok(Json(json!({ "status": "Magic packet sent!" })))
}

/// Two echo requests; any reply line carrying a TTL counts as reachable.
async fn ping_once(host: &str) -> bool {
    let count_flag = if cfg!(windows) { "-n" } else { "-c" };
    let output = Command::new("ping")
        .args([count_flag, "2", host])
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PING_TIMEOUT, output).await {
        Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout)
            .to_lowercase()
            .contains("ttl="),
        Ok(Err(err)) => {
            warn!(error = %err, "failed to run ping");
            false
        }
        Err(_) => {
            debug!(host = %host, "ping timed out");
            false
        }
    }
}

async fn ping(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let host = monitored_host(&state).await?;
    if host.starts_with('-') {
        return Err(ApiError::bad_request("invalid MONITORED_PC_IP"));
    }

    let mut online = ping_once(&host).await;
    if !online {
        tokio::time::sleep(PING_RETRY_DELAY).await;
        online = ping_once(&host).await;
    }
    let status = if online { "online" } else { "offline" };
    debug!(host = %host, status, "ping finished");
    Ok(Json(json!({ "status": status })))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let host = monitored_host(&state).await?;
    let tree = state.telemetry.sensor_tree(&host).await.map_err(|err| {
        state.metrics.inc_fetch_error("sensors");
        warn!(host = %host, error = %err, "on-demand sensor fetch failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;

    let usable = |v: Option<&str>| v.filter(|v| *v != MISSING_VALUE).map(str::to_string);
    match (
        usable(find_value(&tree, "CPU Total", Some("Load"))),
        usable(find_value(&tree, "CPU Package", Some("Temperatures"))),
    ) {
        (Some(cpu_usage), Some(cpu_temp)) => Ok(Json(json!({
            "cpu_usage": cpu_usage,
            "cpu_temp": cpu_temp,
        }))),
        _ => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Hardware monitor returned incomplete data",
        )),
    }
}
