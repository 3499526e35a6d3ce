use crate::collectors::extract_readings;
use crate::collectors::upstream::TelemetrySource;
use crate::hub::SnapshotHub;
use crate::metrics::{now_unix, Metrics};
use crate::state::{LastGoodNetwork, MonitorSettings, NetworkStatus, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No monitored host or nobody listening.
    Idle,
    /// Sensor tree fetch failed, nothing published.
    Skipped,
    Published(Snapshot),
}

/// Owns the tick counter and the last good network reading; nothing else
/// writes to either.
pub struct Poller<S> {
    source: S,
    hub: SnapshotHub,
    settings: Arc<RwLock<MonitorSettings>>,
    metrics: Arc<Metrics>,
    interval: Duration,
    network_every: u64,
    tick: u64,
    last_network: LastGoodNetwork,
}

impl<S: TelemetrySource> Poller<S> {
    pub fn new(
        source: S,
        hub: SnapshotHub,
        settings: Arc<RwLock<MonitorSettings>>,
        metrics: Arc<Metrics>,
        interval: Duration,
        network_every: u64,
    ) -> Self {
        Self {
            source,
            hub,
            settings,
            metrics,
            interval,
            network_every: network_every.max(1),
            tick: 0,
            last_network: LastGoodNetwork::default(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polling = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("poll loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;
                    let now_polling = outcome != TickOutcome::Idle;
                    if now_polling != polling {
                        if now_polling {
                            info!(tick = self.tick, "poll loop active");
                        } else {
                            info!(tick = self.tick, "poll loop idle");
                        }
                        polling = now_polling;
                    }
                }
            }
        }
    }

    pub async fn poll_once(&mut self) -> TickOutcome {
        let (host, disks) = {
            let guard = self.settings.read().await;
            (guard.monitored_host.clone(), guard.monitored_disks.clone())
        };

        let subscribers = self.hub.subscriber_count();
        self.metrics.set_subscribers(subscribers);
        let Some(host) = host else {
            return TickOutcome::Idle;
        };
        if subscribers == 0 {
            return TickOutcome::Idle;
        }

        self.tick += 1;
        self.metrics.inc_tick();

        let tree = match self.source.sensor_tree(&host).await {
            Ok(tree) => tree,
            Err(err) => {
                self.metrics.inc_fetch_error("sensors");
                warn!(tick = self.tick, host = %host, error = %err, "sensor tree fetch failed, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        let network_status = if self.tick % self.network_every == 0 {
            match self.source.network(&host).await {
                Ok(reading) => {
                    self.last_network.record(reading);
                    NetworkStatus::Online
                }
                Err(err) => {
                    self.metrics.inc_fetch_error("network");
                    warn!(tick = self.tick, host = %host, error = %err, "network fetch failed, reusing last reading");
                    NetworkStatus::Offline
                }
            }
        } else {
            NetworkStatus::Cached
        };

        let snapshot = Snapshot::assemble(
            self.tick,
            now_unix(),
            extract_readings(&tree, &disks),
            &self.last_network,
            network_status,
        );

        let delivered = self.hub.publish(snapshot.clone());
        self.metrics.update_from_snapshot(&snapshot);
        debug!(
            tick = self.tick,
            delivered,
            network = network_status.as_str(),
            "update_stats published"
        );

        TickOutcome::Published(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::sensor_tree::SensorNode;
    use crate::collectors::upstream::{FetchError, NetworkReading};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued results; an empty queue means success.
    #[derive(Default)]
    struct ScriptedSource {
        sensor_failures: Mutex<VecDeque<bool>>,
        network: Mutex<VecDeque<Result<NetworkReading, ()>>>,
        network_calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn fail_sensors(self, script: &[bool]) -> Self {
            *self.sensor_failures.lock().unwrap() = script.iter().copied().collect();
            self
        }

        fn network_results(self, script: Vec<Result<NetworkReading, ()>>) -> Self {
            *self.network.lock().unwrap() = script.into();
            self
        }
    }

    fn tree() -> SensorNode {
        SensorNode::new("Sensor").with_child(
            SensorNode::new("Load").with_child(SensorNode::new("CPU Total").with_value("25,0 %")),
        )
    }

    #[async_trait]
    impl TelemetrySource for ScriptedSource {
        async fn sensor_tree(&self, _host: &str) -> Result<SensorNode, FetchError> {
            let fail = self.sensor_failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                Err(FetchError::Status {
                    url: "http://test/data.json".to_string(),
                    status: 500,
                })
            } else {
                Ok(tree())
            }
        }

        async fn network(&self, _host: &str) -> Result<NetworkReading, FetchError> {
            *self.network_calls.lock().unwrap() += 1;
            match self.network.lock().unwrap().pop_front() {
                Some(Err(())) => Err(FetchError::InterfaceMissing("Ethernet".to_string())),
                Some(Ok(reading)) => Ok(reading),
                None => Ok(NetworkReading {
                    download: 1.0,
                    upload: 1.0,
                }),
            }
        }
    }

    fn settings(host: Option<&str>) -> Arc<RwLock<MonitorSettings>> {
        Arc::new(RwLock::new(MonitorSettings {
            monitored_host: host.map(str::to_string),
            ..MonitorSettings::default()
        }))
    }

    fn poller(source: ScriptedSource, hub: &SnapshotHub) -> Poller<ScriptedSource> {
        Poller::new(
            source,
            hub.clone(),
            settings(Some("10.0.0.5")),
            Metrics::new().expect("инициализация метрик"),
            Duration::from_millis(10),
            3,
        )
    }

    fn published(outcome: TickOutcome) -> Snapshot {
        match outcome {
            TickOutcome::Published(s) => s,
            other => panic!("expected a published snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_is_fetched_every_third_tick() {
        let hub = SnapshotHub::new(16);
        let _sub = hub.subscribe();
        let mut p = poller(ScriptedSource::default(), &hub);

        for tick in 1..=9u64 {
            let snap = published(p.poll_once().await);
            assert_eq!(snap.tick, tick);
            let expected = if tick % 3 == 0 {
                NetworkStatus::Online
            } else {
                NetworkStatus::Cached
            };
            assert_eq!(snap.network_status, expected, "tick {tick}");
            assert_eq!(snap.cpu_usage, 25.0);
        }
        assert_eq!(*p.source.network_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_network_fetch_reuses_last_good_reading() {
        let hub = SnapshotHub::new(16);
        let _sub = hub.subscribe();
        let source = ScriptedSource::default().network_results(vec![
            Ok(NetworkReading {
                download: 2048.0,
                upload: 256.0,
            }),
            Err(()),
        ]);
        let mut p = poller(source, &hub);

        let mut snaps = Vec::new();
        for _ in 0..6 {
            snaps.push(published(p.poll_once().await));
        }
        assert_eq!(snaps[1].network_download, 0.0);
        assert_eq!(snaps[2].network_status, NetworkStatus::Online);
        assert_eq!(snaps[3].network_download, 2048.0);
        assert_eq!(snaps[3].network_status, NetworkStatus::Cached);

        let failed = &snaps[5];
        assert_eq!(failed.network_status, NetworkStatus::Offline);
        assert_eq!(failed.network_download, 2048.0);
        assert_eq!(failed.network_upload, 256.0);
        assert_eq!(p.last_network.download_speed, 2048.0);
    }

    #[tokio::test]
    async fn failed_sensor_fetch_publishes_nothing() {
        let hub = SnapshotHub::new(16);
        let mut sub = hub.subscribe();
        let mut p = poller(ScriptedSource::default().fail_sensors(&[true]), &hub);

        assert_eq!(p.poll_once().await, TickOutcome::Skipped);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), sub.recv())
                .await
                .is_err(),
            "no update_stats for a failed tick"
        );

        published(p.poll_once().await);
        assert_eq!(sub.recv().await.unwrap().tick, 2);
    }

    #[tokio::test]
    async fn sensor_failure_on_network_tick_skips_network_fetch() {
        let hub = SnapshotHub::new(16);
        let _sub = hub.subscribe();
        let mut p = poller(
            ScriptedSource::default().fail_sensors(&[false, false, true]),
            &hub,
        );
        for _ in 0..3 {
            p.poll_once().await;
        }
        assert_eq!(*p.source.network_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn idles_without_subscribers_or_host() {
        let hub = SnapshotHub::new(16);
        let mut p = poller(ScriptedSource::default(), &hub);
        assert_eq!(p.poll_once().await, TickOutcome::Idle);
        assert_eq!(p.tick, 0);

        let _sub = hub.subscribe();
        p.settings.write().await.monitored_host = None;
        assert_eq!(p.poll_once().await, TickOutcome::Idle);
        assert_eq!(p.tick, 0);

        p.settings.write().await.monitored_host = Some("10.0.0.9".to_string());
        published(p.poll_once().await);
        assert_eq!(p.tick, 1);
    }

    #[tokio::test]
    async fn late_subscriber_starts_at_next_tick() {
        let hub = SnapshotHub::new(16);
        let _early = hub.subscribe();
        let mut p = poller(ScriptedSource::default(), &hub);
        for _ in 0..5 {
            published(p.poll_once().await);
        }

        let mut late = hub.subscribe();
        published(p.poll_once().await);
        assert_eq!(late.recv().await.unwrap().tick, 6);
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown() {
        let hub = SnapshotHub::new(16);
        let mut sub = hub.subscribe();
        let p = poller(ScriptedSource::default(), &hub);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(p.run(rx));

        let first = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("snapshot within timeout")
            .expect("hub alive");
        assert_eq!(first.tick, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop stops")
            .unwrap();
    }
}
