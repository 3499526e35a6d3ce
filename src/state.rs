use crate::collectors::upstream::NetworkReading;
use crate::collectors::SensorReadings;
use std::collections::{BTreeMap, HashMap};

/// One flattened set of readings, published once per successful tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub cpu_temp: f64,
    pub cpu_power: f64,
    pub gpu_usage: f64,
    pub gpu_temp: f64,
    pub gpu_power: f64,
    pub ram_usage_gb: f64,
    pub disks: BTreeMap<String, f64>,
    pub network_download: f64,
    pub network_upload: f64,
    pub network_status: NetworkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    /// Fresh reading taken this tick.
    Online,
    /// Fetch attempted this tick and failed.
    Offline,
    /// No fetch this tick.
    Cached,
}

impl NetworkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkStatus::Online => "online",
            NetworkStatus::Offline => "offline",
            NetworkStatus::Cached => "cached",
        }
    }
}

impl Snapshot {
    pub fn assemble(
        tick: u64,
        timestamp: i64,
        readings: SensorReadings,
        network: &LastGoodNetwork,
        network_status: NetworkStatus,
    ) -> Self {
        Self {
            tick,
            timestamp,
            cpu_usage: readings.cpu_usage,
            cpu_temp: readings.cpu_temp,
            cpu_power: readings.cpu_power,
            gpu_usage: readings.gpu_usage,
            gpu_temp: readings.gpu_temp,
            gpu_power: readings.gpu_power,
            ram_usage_gb: readings.ram_usage_gb,
            disks: readings.disks,
            network_download: network.download_speed,
            network_upload: network.upload_speed,
            network_status,
        }
    }
}

/// Most recent successful network reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LastGoodNetwork {
    pub download_speed: f64,
    pub upload_speed: f64,
}

impl LastGoodNetwork {
    pub fn record(&mut self, reading: NetworkReading) {
        self.download_speed = reading.download;
        self.upload_speed = reading.upload;
    }
}

/// Settings editable at runtime through `/config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSettings {
    pub monitored_host: Option<String>,
    pub monitored_mac: Option<String>,
    pub monitored_disks: Vec<String>,
    pub upload_folder: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_refresh_token: Option<String>,
}

pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";

impl MonitorSettings {
    /// Values from `overrides` (the process environment) win over `file`.
    pub fn from_sources(
        file: &BTreeMap<String, String>,
        overrides: &HashMap<String, String>,
    ) -> Self {
        let mut merged: HashMap<String, String> = file
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in overrides {
            merged.insert(k.clone(), v.clone());
        }
        let mut settings = Self {
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            ..Self::default()
        };
        for (k, v) in &merged {
            settings.apply(k, v);
        }
        settings
    }

    /// Applies one env-style key. Unknown keys are ignored.
    pub fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        let non_empty = || (!value.is_empty()).then(|| value.to_string());
        match key {
            "MONITORED_PC_IP" => self.monitored_host = non_empty(),
            "MONITORED_PC_MAC" => self.monitored_mac = non_empty(),
            "MONITORED_DISKS" => self.monitored_disks = split_disks(value),
            "UPLOAD_FOLDER" => {
                self.upload_folder = non_empty().unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string())
            }
            "SPOTIFY_CLIENT_ID" => self.spotify_client_id = non_empty(),
            "SPOTIFY_CLIENT_SECRET" => self.spotify_client_secret = non_empty(),
            "SPOTIFY_REFRESH_TOKEN" => self.spotify_refresh_token = non_empty(),
            _ => {}
        }
    }
}

fn split_disks(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}
