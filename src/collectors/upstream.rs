use crate::collectors::sensor_tree::SensorNode;
use crate::config::UpstreamConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
    #[error("interface '{0}' not present in network report")]
    InterfaceMissing(String),
}

/// Throughput of one interface in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkReading {
    pub download: f64,
    pub upload: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct InterfaceReport {
    interface_name: String,
    #[serde(default)]
    bytes_recv_rate_per_sec: Option<f64>,
    #[serde(default)]
    bytes_sent_rate_per_sec: Option<f64>,
}

/// Where the poll loop gets its raw data from.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn sensor_tree(&self, host: &str) -> Result<SensorNode, FetchError>;
    async fn network(&self, host: &str) -> Result<NetworkReading, FetchError>;
}

/// Hardware monitor `data.json` plus Glances network API over plain HTTP.
#[derive(Clone)]
pub struct HttpTelemetrySource {
    client: Client,
    cfg: UpstreamConfig,
    timeout: Duration,
}

impl HttpTelemetrySource {
    pub fn new(client: Client, cfg: UpstreamConfig, timeout: Duration) -> Self {
        Self {
            client,
            cfg,
            timeout,
        }
    }

    pub fn sensor_url(&self, host: &str) -> String {
        format!("http://{}:{}/data.json", host, self.cfg.sensor_port)
    }

    pub fn network_url(&self, host: &str) -> String {
        format!(
            "http://{}:{}/api/{}/network",
            host, self.cfg.network_port, self.cfg.network_api_version
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn sensor_tree(&self, host: &str) -> Result<SensorNode, FetchError> {
        self.get_json(self.sensor_url(host)).await
    }

    async fn network(&self, host: &str) -> Result<NetworkReading, FetchError> {
        let reports: Vec<InterfaceReport> = self.get_json(self.network_url(host)).await?;
        select_interface(&reports, &self.cfg.network_interface)
    }
}

fn select_interface(
    reports: &[InterfaceReport],
    interface: &str,
) -> Result<NetworkReading, FetchError> {
    reports
        .iter()
        .find(|r| r.interface_name == interface)
        .map(|r| NetworkReading {
            download: r.bytes_recv_rate_per_sec.unwrap_or(0.0),
            upload: r.bytes_sent_rate_per_sec.unwrap_or(0.0),
        })
        .ok_or_else(|| FetchError::InterfaceMissing(interface.to_string()))
}
