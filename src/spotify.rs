//! Thin pass-through to the Spotify Web API using a refresh-token grant.

use crate::config::SpotifyConfig;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const PAGE_LIMIT: usize = 100;
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Spotify credentials are not configured")]
    MissingCredentials,
    #[error("Failed to get access token: {0}")]
    Token(String),
    #[error("No active Spotify device found")]
    NoActiveDevice,
    #[error("Invalid Spotify id '{0}'")]
    InvalidId(String),
    #[error("request to Spotify failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Spotify answered with status {status}")]
    Upstream { status: u16, body: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    Track,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlayerState {
    pub shuffle_state: Value,
    pub repeat_state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

struct CachedToken {
    refresh_token: String,
    access_token: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: Client,
    cfg: SpotifyConfig,
    token: Mutex<Option<CachedToken>>,
}

/// Spotify ids are base62; anything else would leak into the request path.
pub fn is_spotify_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn is_success(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 202 | 204)
}

async fn upstream_error(resp: Response) -> SpotifyError {
    let status = resp.status().as_u16();
    let body = match resp.json::<Value>().await {
        Ok(body) => body,
        Err(_) => json!({
            "error": "Empty response from Spotify",
            "status_code": status,
        }),
    };
    warn!(status, body = %body, "Spotify API error");
    SpotifyError::Upstream { status, body }
}

impl SpotifyClient {
    pub fn new(http: Client, cfg: SpotifyConfig) -> Self {
        Self {
            http,
            cfg,
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.api_base.trim_end_matches('/'), path)
    }

    async fn cached_token(&self, creds: &Credentials) -> Option<String> {
        self.token
            .lock()
            .await
            .as_ref()
            .filter(|t| t.refresh_token == creds.refresh_token && Instant::now() < t.expires_at)
            .map(|t| t.access_token.clone())
    }

    /// Cached until shortly before expiry, or until the refresh token changes.
    /// The cache lock is not held while the token endpoint is called.
    pub async fn access_token(&self, creds: &Credentials) -> Result<String, SpotifyError> {
        if let Some(token) = self.cached_token(creds).await {
            return Ok(token);
        }

        let resp = self
            .http
            .post(&self.cfg.token_url)
            .timeout(self.cfg.timeout)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", creds.refresh_token.as_str()),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|err| SpotifyError::Token(format!("status {status}: {err}")))?;
        let Some(access_token) = body.access_token else {
            return Err(SpotifyError::Token(format!("status {status}: no access_token")));
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = lifetime.as_secs(), "Spotify access token refreshed");
        *self.token.lock().await = Some(CachedToken {
            refresh_token: creds.refresh_token.clone(),
            access_token: access_token.clone(),
            expires_at,
        });
        Ok(access_token)
    }

    async fn request(
        &self,
        creds: &Credentials,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, SpotifyError> {
        let token = self.access_token(creds).await?;
        Ok(self
            .http
            .request(method, self.url(path))
            .timeout(self.cfg.timeout)
            .bearer_auth(token))
    }

    async fn get_json(&self, creds: &Credentials, path: &str) -> Result<Value, SpotifyError> {
        let resp = self.request(creds, Method::GET, path).await?.send().await?;
        if resp.status() != StatusCode::OK {
            return Err(upstream_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn expect_success(resp: Response) -> Result<(), SpotifyError> {
        if is_success(resp.status()) {
            Ok(())
        } else {
            Err(upstream_error(resp).await)
        }
    }

    pub async fn active_device(&self, creds: &Credentials) -> Result<String, SpotifyError> {
        let devices = self.get_json(creds, "/me/player/devices").await?;
        devices["devices"]
            .as_array()
            .and_then(|d| d.first())
            .and_then(|d| d["id"].as_str())
            .map(str::to_string)
            .ok_or(SpotifyError::NoActiveDevice)
    }

    pub async fn command(&self, creds: &Credentials, cmd: PlayerCommand) -> Result<(), SpotifyError> {
        let device = self.active_device(creds).await?;
        let (method, action) = match cmd {
            PlayerCommand::Play => (Method::PUT, "play"),
            PlayerCommand::Pause => (Method::PUT, "pause"),
            PlayerCommand::Next => (Method::POST, "next"),
            PlayerCommand::Previous => (Method::POST, "previous"),
        };
        let mut req = self
            .request(creds, method.clone(), &format!("/me/player/{action}"))
            .await?
            .query(&[("device_id", device.as_str())]);
        if method == Method::PUT {
            req = req.json(&json!({}));
        }
        Self::expect_success(req.send().await?).await
    }

    /// `None` when nothing is playing.
    pub async fn current_song(&self, creds: &Credentials) -> Result<Option<Value>, SpotifyError> {
        let resp = self
            .request(creds, Method::GET, "/me/player/currently-playing")
            .await?
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK => {
                let data: Value = resp.json().await.unwrap_or(Value::Null);
                Ok(data.get("item").is_some().then_some(data))
            }
            StatusCode::NO_CONTENT => Ok(None),
            _ => Err(upstream_error(resp).await),
        }
    }

    async fn player(&self, creds: &Credentials) -> Result<Value, SpotifyError> {
        self.get_json(creds, "/me/player").await
    }

    pub async fn player_state(&self, creds: &Credentials) -> Result<PlayerState, SpotifyError> {
        let data = self.player(creds).await?;
        Ok(PlayerState {
            shuffle_state: data.get("shuffle_state").cloned().unwrap_or(Value::Bool(false)),
            repeat_state: data["repeat_state"].as_str().unwrap_or("off").to_string(),
        })
    }

    pub async fn playlist(&self, creds: &Credentials, id: &str) -> Result<Value, SpotifyError> {
        if !is_spotify_id(id) {
            return Err(SpotifyError::InvalidId(id.to_string()));
        }
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .get_json(
                    creds,
                    &format!("/playlists/{id}/tracks?limit={PAGE_LIMIT}&offset={offset}"),
                )
                .await?;
            let batch = page["items"].as_array().cloned().unwrap_or_default();
            let fetched = batch.len();
            items.extend(batch);
            if fetched < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        let name = match self.get_json(creds, &format!("/playlists/{id}")).await {
            Ok(info) => info["name"].as_str().unwrap_or("Unknown Playlist").to_string(),
            Err(_) => "Unknown Playlist".to_string(),
        };
        Ok(json!({ "name": name, "tracks": { "items": items } }))
    }

    pub async fn play_track(
        &self,
        creds: &Credentials,
        uri: &str,
        playlist_id: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let device = self.active_device(creds).await?;
        let payload = json!({
            "context_uri": format!("spotify:playlist:{}", playlist_id.unwrap_or_default()),
            "offset": { "uri": uri },
            "position_ms": 0,
        });
        let resp = self
            .request(creds, Method::PUT, "/me/player/play")
            .await?
            .query(&[("device_id", device.as_str())])
            .json(&payload)
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    pub async fn toggle_repeat(&self, creds: &Credentials) -> Result<RepeatMode, SpotifyError> {
        let state = self.player_state(creds).await?;
        let mode = if state.repeat_state == "off" {
            RepeatMode::Track
        } else {
            RepeatMode::Off
        };
        let state_param = match mode {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
        };
        let resp = self
            .request(creds, Method::PUT, "/me/player/repeat")
            .await?
            .query(&[("state", state_param)])
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(mode)
    }

    async fn set_shuffle(&self, creds: &Credentials, on: bool) -> Result<(), SpotifyError> {
        let resp = self
            .request(creds, Method::PUT, "/me/player/shuffle")
            .await?
            .query(&[("state", if on { "true" } else { "false" })])
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    /// Smart shuffle counts as on and is switched off first.
    pub async fn toggle_shuffle(&self, creds: &Credentials) -> Result<bool, SpotifyError> {
        let state = self.player_state(creds).await?;
        let current = match &state.shuffle_state {
            Value::String(s) if s == "smart" => {
                debug!("smart shuffle active, disabling first");
                self.set_shuffle(creds, false).await?;
                false
            }
            other => other.as_bool().unwrap_or(false),
        };
        let next = !current;
        self.set_shuffle(creds, next).await?;
        Ok(next)
    }

    pub async fn set_volume(&self, creds: &Credentials, percent: u8) -> Result<(), SpotifyError> {
        let resp = self
            .request(creds, Method::PUT, "/me/player/volume")
            .await?
            .query(&[("volume_percent", percent.min(100).to_string())])
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    /// `None` when there is no active device.
    pub async fn volume(&self, creds: &Credentials) -> Result<Option<u64>, SpotifyError> {
        let data = self.player(creds).await?;
        Ok(data["device"]["volume_percent"].as_u64())
    }

    pub async fn playlists(&self, creds: &Credentials) -> Result<Value, SpotifyError> {
        let token = self.access_token(creds).await?;
        let mut items = Vec::new();
        let mut next = Some(self.url("/me/playlists?limit=50"));
        while let Some(url) = next {
            let resp = self
                .http
                .get(&url)
                .timeout(self.cfg.timeout)
                .bearer_auth(&token)
                .send()
                .await?;
            if resp.status() != StatusCode::OK {
                return Err(upstream_error(resp).await);
            }
            let page: Value = resp.json().await?;
            items.extend(page["items"].as_array().cloned().unwrap_or_default());
            next = page["next"].as_str().map(str::to_string);
        }
        Ok(json!({ "items": items }))
    }
}
