use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub poll_interval: Duration,
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub fetch_timeout: Duration,
    #[serde(default = "default_network_every_ticks")]
    pub network_every_ticks: u64,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_frontend_config")]
    pub frontend_config: PathBuf,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default)]
    pub spotify: SpotifyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_sensor_port")]
    pub sensor_port: u16,
    #[serde(default = "default_network_port")]
    pub network_port: u16,
    #[serde(default = "default_network_api_version")]
    pub network_api_version: u8,
    #[serde(default = "default_network_interface")]
    pub network_interface: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyConfig {
    #[serde(default = "default_spotify_token_url")]
    pub token_url: String,
    #[serde(default = "default_spotify_api_base")]
    pub api_base: String,
    #[serde(
        default = "default_spotify_timeout",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            sensor_port: default_sensor_port(),
            network_port: default_network_port(),
            network_api_version: default_network_api_version(),
            network_interface: default_network_interface(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            token_url: default_spotify_token_url(),
            api_base: default_spotify_api_base(),
            timeout: default_spotify_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            poll_interval: default_poll_interval(),
            fetch_timeout: default_fetch_timeout(),
            network_every_ticks: default_network_every_ticks(),
            subscriber_buffer: default_subscriber_buffer(),
            upstream: UpstreamConfig::default(),
            env_file: default_env_file(),
            frontend_config: default_frontend_config(),
            static_dir: None,
            spotify: SpotifyConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text, &path_display)
    }

    pub fn from_yaml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.poll_interval < Duration::from_millis(100) {
            return Err(ConfigError::Validation(
                "poll_interval должно быть >= 100ms".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "fetch_timeout должно быть > 0".to_string(),
            ));
        }
        if self.network_every_ticks < 1 {
            return Err(ConfigError::Validation(
                "network_every_ticks должно быть >= 1".to_string(),
            ));
        }
        if self.subscriber_buffer < 1 {
            return Err(ConfigError::Validation(
                "subscriber_buffer должно быть >= 1".to_string(),
            ));
        }

        validate_upstream(&self.upstream)?;
        validate_spotify(&self.spotify)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_upstream(cfg: &UpstreamConfig) -> Result<(), ConfigError> {
    if cfg.sensor_port == 0 || cfg.network_port == 0 {
        return Err(ConfigError::Validation(
            "upstream: порты должны быть в диапазоне 1..65535".to_string(),
        ));
    }
    if cfg.network_api_version == 0 {
        return Err(ConfigError::Validation(
            "upstream.network_api_version должно быть >= 1".to_string(),
        ));
    }
    if cfg.network_interface.trim().is_empty() {
        return Err(ConfigError::Validation(
            "upstream.network_interface не должен быть пустым".to_string(),
        ));
    }
    Ok(())
}

fn validate_spotify(cfg: &SpotifyConfig) -> Result<(), ConfigError> {
    for (field, value) in [("token_url", &cfg.token_url), ("api_base", &cfg.api_base)] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "spotify.{field} должен начинаться с http:// или https://"
            )));
        }
    }
    if cfg.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "spotify.timeout должно быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn ser_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_fetch_timeout() -> Duration {
    Duration::from_secs(1)
}

const fn default_network_every_ticks() -> u64 {
    3
}

const fn default_subscriber_buffer() -> usize {
    16
}

const fn default_sensor_port() -> u16 {
    8085
}

const fn default_network_port() -> u16 {
    61208
}

const fn default_network_api_version() -> u8 {
    4
}

fn default_network_interface() -> String {
    "Ethernet".to_string()
}

fn default_env_file() -> PathBuf {
    PathBuf::from("./.env")
}

fn default_frontend_config() -> PathBuf {
    PathBuf::from("./frontend/config.js")
}

fn default_spotify_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_spotify_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

const fn default_spotify_timeout() -> Duration {
    Duration::from_secs(10)
}
