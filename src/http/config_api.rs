use super::{blocking, ApiError, AppState, ConfigFiles};
use crate::envfile::{
    read_env_file, read_frontend_config, update_env_file, update_frontend_config, ENV_KEYS,
    FRONTEND_KEYS,
};
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io;
use tracing::info;

#[derive(Debug, Serialize)]
pub(crate) struct ConfigSnapshot {
    env: BTreeMap<String, String>,
    frontend: BTreeMap<String, String>,
}

/// Every editable key, empty when unset.
fn pick(keys: &[&str], values: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    keys.iter()
        .map(|k| (k.to_string(), values.get(*k).cloned().unwrap_or_default()))
        .collect()
}

fn snapshot(files: &ConfigFiles) -> io::Result<ConfigSnapshot> {
    Ok(ConfigSnapshot {
        env: pick(ENV_KEYS, &read_env_file(&files.env_file)?),
        frontend: pick(FRONTEND_KEYS, &read_frontend_config(&files.frontend_config)?),
    })
}

fn ensure_frontend_config(files: &ConfigFiles) -> io::Result<()> {
    if files.frontend_config.exists() {
        return Ok(());
    }
    let seed = pick(FRONTEND_KEYS, &read_env_file(&files.env_file)?);
    update_frontend_config(&files.frontend_config, &seed)?;
    info!(path = %files.frontend_config.display(), "frontend config created");
    Ok(())
}

/// Keeps allowed keys only; `null` becomes an empty string.
fn allowed_updates(section: Option<&Value>, allowed: &[&str]) -> BTreeMap<String, String> {
    let Some(Value::Object(entries)) = section else {
        return BTreeMap::new();
    };
    entries
        .iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

pub(crate) async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigSnapshot>, ApiError> {
    let files = state.files.clone();
    let snap = blocking(move || {
        ensure_frontend_config(&files)?;
        snapshot(&files)
    })
    .await?;
    Ok(Json(snap))
}

pub(crate) async fn save_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let env_updates = allowed_updates(payload.get("env"), ENV_KEYS);
    let frontend_updates = allowed_updates(payload.get("frontend"), FRONTEND_KEYS);
    if env_updates.is_empty() && frontend_updates.is_empty() {
        return Err(ApiError::bad_request("No valid config keys provided"));
    }

    let files = state.files.clone();
    let env_for_file = env_updates.clone();
    let snap = blocking(move || {
        if !env_for_file.is_empty() {
            update_env_file(&files.env_file, &env_for_file)?;
        }
        if !frontend_updates.is_empty() {
            update_frontend_config(&files.frontend_config, &frontend_updates)?;
        }
        snapshot(&files)
    })
    .await?;

    if !env_updates.is_empty() {
        let mut settings = state.settings.write().await;
        for (key, value) in &env_updates {
            settings.apply(key, value);
        }
        info!(keys = ?env_updates.keys().collect::<Vec<_>>(), "runtime settings updated");
    }

    Ok(Json(json!({ "status": "ok", "config": snap })))
}

#[cfg(test)]
mod tests {
    use super::super::build_router;
    use super::super::test_support::*;
    use crate::state::MonitorSettings;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/config")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn get_creates_frontend_config_from_env() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".env"),
            "SERVER_PC_IP=192.168.1.10\nMONITORED_PC_IP='10.0.0.5'\n",
        )
        .unwrap();
        let app = build_router(state(dir.path(), MonitorSettings::default(), None), None);

        let (status, body) = send_json(app, get("/config")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["env"]["MONITORED_PC_IP"], "10.0.0.5");
        assert_eq!(body["env"]["UPLOAD_FOLDER"], "");
        assert_eq!(body["frontend"]["SERVER_PC_IP"], "192.168.1.10");
        assert_eq!(body["frontend"]["MACRO_PC_IP"], "");
        assert!(dir.path().join("frontend").join("config.js").exists());
    }

    #[tokio::test]
    async fn post_updates_files_and_runtime_settings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "# keep me\nMONITORED_PC_IP=1.1.1.1\n").unwrap();
        let app_state = state(dir.path(), MonitorSettings::default(), None);
        let settings = app_state.settings.clone();
        let app = build_router(app_state, None);

        let (status, body) = send_json(
            app,
            post_json(json!({
                "env": {"MONITORED_PC_IP": "10.0.0.9", "MONITORED_DISKS": "C:,D:", "BOGUS": "x"},
                "frontend": {"MACRO_PC_IP": "10.0.0.3:5001"},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["config"]["env"]["MONITORED_PC_IP"], "10.0.0.9");
        assert_eq!(body["config"]["frontend"]["MACRO_PC_IP"], "10.0.0.3:5001");

        let env = fs::read_to_string(dir.path().join(".env")).unwrap();
        assert!(env.starts_with("# keep me\nMONITORED_PC_IP=\"10.0.0.9\"\n"));
        assert!(!env.contains("BOGUS"));

        let settings = settings.read().await;
        assert_eq!(settings.monitored_host.as_deref(), Some("10.0.0.9"));
        assert_eq!(settings.monitored_disks, vec!["C:".to_string(), "D:".to_string()]);
    }

    #[tokio::test]
    async fn post_without_known_keys_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = build_router(state(dir.path(), MonitorSettings::default(), None), None);
        let (status, body) = send_json(app, post_json(json!({"env": {"NOPE": "1"}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid config keys provided");
        assert!(!dir.path().join(".env").exists());
    }
}
