use crate::state::{NetworkStatus, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub dashboard_cpu_usage_percent: Gauge,
    pub dashboard_cpu_temperature_celsius: Gauge,
    pub dashboard_cpu_power_watts: Gauge,
    pub dashboard_gpu_usage_percent: Gauge,
    pub dashboard_gpu_temperature_celsius: Gauge,
    pub dashboard_gpu_power_watts: Gauge,
    pub dashboard_ram_used_gigabytes: Gauge,
    pub dashboard_disk_used_percent: GaugeVec,
    pub dashboard_network_download_bytes_per_sec: Gauge,
    pub dashboard_network_upload_bytes_per_sec: Gauge,
    pub dashboard_network_online: Gauge,
    pub dashboard_subscribers: Gauge,
    pub dashboard_ticks_total: Counter,
    pub dashboard_snapshots_published_total: Counter,
    pub dashboard_fetch_errors_total: CounterVec,
    pub dashboard_scrape_count_total: Counter,
    pub dashboard_last_publish_timestamp_seconds: Gauge,
    pub dashboard_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let dashboard_cpu_usage_percent = Gauge::with_opts(opts!(
            "dashboard_cpu_usage_percent",
            "CPU Total load of the monitored PC in percent"
        ))?;
        let dashboard_cpu_temperature_celsius = Gauge::with_opts(opts!(
            "dashboard_cpu_temperature_celsius",
            "CPU Package temperature of the monitored PC"
        ))?;
        let dashboard_cpu_power_watts = Gauge::with_opts(opts!(
            "dashboard_cpu_power_watts",
            "CPU Package power draw of the monitored PC"
        ))?;
        let dashboard_gpu_usage_percent = Gauge::with_opts(opts!(
            "dashboard_gpu_usage_percent",
            "GPU Core load of the monitored PC in percent"
        ))?;
        let dashboard_gpu_temperature_celsius = Gauge::with_opts(opts!(
            "dashboard_gpu_temperature_celsius",
            "GPU Core temperature of the monitored PC"
        ))?;
        let dashboard_gpu_power_watts = Gauge::with_opts(opts!(
            "dashboard_gpu_power_watts",
            "GPU power draw of the monitored PC"
        ))?;
        let dashboard_ram_used_gigabytes = Gauge::with_opts(opts!(
            "dashboard_ram_used_gigabytes",
            "Used memory of the monitored PC in GB"
        ))?;
        let dashboard_disk_used_percent = GaugeVec::new(
            opts!(
                "dashboard_disk_used_percent",
                "Used space by configured disk in percent"
            ),
            &["disk"],
        )?;
        let dashboard_network_download_bytes_per_sec = Gauge::with_opts(opts!(
            "dashboard_network_download_bytes_per_sec",
            "Last known download rate of the monitored interface"
        ))?;
        let dashboard_network_upload_bytes_per_sec = Gauge::with_opts(opts!(
            "dashboard_network_upload_bytes_per_sec",
            "Last known upload rate of the monitored interface"
        ))?;
        let dashboard_network_online = Gauge::with_opts(opts!(
            "dashboard_network_online",
            "1 if the last network fetch succeeded, 0 if it failed"
        ))?;
        let dashboard_subscribers = Gauge::with_opts(opts!(
            "dashboard_subscribers",
            "Connected WebSocket subscribers"
        ))?;
        let dashboard_ticks_total = Counter::with_opts(opts!(
            "dashboard_ticks_total",
            "Poll loop ticks with an active subscriber"
        ))?;
        let dashboard_snapshots_published_total = Counter::with_opts(opts!(
            "dashboard_snapshots_published_total",
            "Snapshots broadcast to subscribers"
        ))?;
        let dashboard_fetch_errors_total = CounterVec::new(
            opts!(
                "dashboard_fetch_errors_total",
                "Failed upstream fetches by source"
            ),
            &["source"],
        )?;
        let dashboard_scrape_count_total = Counter::with_opts(opts!(
            "dashboard_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let dashboard_last_publish_timestamp_seconds = Gauge::with_opts(opts!(
            "dashboard_last_publish_timestamp_seconds",
            "Unix time of the last published snapshot"
        ))?;
        let dashboard_uptime_seconds = Gauge::with_opts(opts!(
            "dashboard_uptime_seconds",
            "Seconds since the service started"
        ))?;

        register(&registry, &dashboard_cpu_usage_percent)?;
        register(&registry, &dashboard_cpu_temperature_celsius)?;
        register(&registry, &dashboard_cpu_power_watts)?;
        register(&registry, &dashboard_gpu_usage_percent)?;
        register(&registry, &dashboard_gpu_temperature_celsius)?;
        register(&registry, &dashboard_gpu_power_watts)?;
        register(&registry, &dashboard_ram_used_gigabytes)?;
        register(&registry, &dashboard_disk_used_percent)?;
        register(&registry, &dashboard_network_download_bytes_per_sec)?;
        register(&registry, &dashboard_network_upload_bytes_per_sec)?;
        register(&registry, &dashboard_network_online)?;
        register(&registry, &dashboard_subscribers)?;
        register(&registry, &dashboard_ticks_total)?;
        register(&registry, &dashboard_snapshots_published_total)?;
        register(&registry, &dashboard_fetch_errors_total)?;
        register(&registry, &dashboard_scrape_count_total)?;
        register(&registry, &dashboard_last_publish_timestamp_seconds)?;
        register(&registry, &dashboard_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            dashboard_cpu_usage_percent,
            dashboard_cpu_temperature_celsius,
            dashboard_cpu_power_watts,
            dashboard_gpu_usage_percent,
            dashboard_gpu_temperature_celsius,
            dashboard_gpu_power_watts,
            dashboard_ram_used_gigabytes,
            dashboard_disk_used_percent,
            dashboard_network_download_bytes_per_sec,
            dashboard_network_upload_bytes_per_sec,
            dashboard_network_online,
            dashboard_subscribers,
            dashboard_ticks_total,
            dashboard_snapshots_published_total,
            dashboard_fetch_errors_total,
            dashboard_scrape_count_total,
            dashboard_last_publish_timestamp_seconds,
            dashboard_uptime_seconds,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot) {
        self.dashboard_cpu_usage_percent.set(snapshot.cpu_usage);
        self.dashboard_cpu_temperature_celsius.set(snapshot.cpu_temp);
        self.dashboard_cpu_power_watts.set(snapshot.cpu_power);
        self.dashboard_gpu_usage_percent.set(snapshot.gpu_usage);
        self.dashboard_gpu_temperature_celsius.set(snapshot.gpu_temp);
        self.dashboard_gpu_power_watts.set(snapshot.gpu_power);
        self.dashboard_ram_used_gigabytes.set(snapshot.ram_usage_gb);

        self.dashboard_disk_used_percent.reset();
        for (disk, used) in &snapshot.disks {
            self.dashboard_disk_used_percent
                .with_label_values(&[disk])
                .set(*used);
        }

        self.dashboard_network_download_bytes_per_sec
            .set(snapshot.network_download);
        self.dashboard_network_upload_bytes_per_sec
            .set(snapshot.network_upload);
        match snapshot.network_status {
            NetworkStatus::Online => self.dashboard_network_online.set(1.0),
            NetworkStatus::Offline => self.dashboard_network_online.set(0.0),
            NetworkStatus::Cached => {}
        }

        self.dashboard_snapshots_published_total.inc();
        self.dashboard_last_publish_timestamp_seconds
            .set(snapshot.timestamp as f64);
    }

    pub fn set_subscribers(&self, count: usize) {
        self.dashboard_subscribers.set(count as f64);
    }

    pub fn inc_tick(&self) {
        self.dashboard_ticks_total.inc();
    }

    pub fn inc_scrape_count(&self) {
        self.dashboard_scrape_count_total.inc();
    }

    pub fn inc_fetch_error(&self, source: &str) {
        self.dashboard_fetch_errors_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.dashboard_uptime_seconds
            .set(now_unix().saturating_sub(self.started_at_unix) as f64);
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
