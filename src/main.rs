mod collectors;
mod config;
mod envfile;
mod http;
mod hub;
mod metrics;
mod poller;
mod spotify;
mod state;
mod uploads;
mod wol;

use axum::serve;
use clap::Parser;
use collectors::upstream::HttpTelemetrySource;
use config::Config;
use http::{AppState, ConfigFiles};
use hub::SnapshotHub;
use metrics::Metrics;
use poller::Poller;
use reqwest::Client;
use spotify::SpotifyClient;
use state::MonitorSettings;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uploads::IndexLock;

#[derive(Parser, Debug)]
#[command(name = "homedash")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `env_file` from the config.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if let Some(env_file) = cli.env_file {
        cfg.env_file = env_file;
    }

    let env_values = match envfile::read_env_file(&cfg.env_file) {
        Ok(values) => values,
        Err(err) => {
            warn!(error = %err, path = %cfg.env_file.display(), "не удалось прочитать .env, используются только переменные окружения");
            BTreeMap::new()
        }
    };
    let process_env: HashMap<String, String> = std::env::vars().collect();
    let settings = MonitorSettings::from_sources(&env_values, &process_env);

    if settings.monitored_host.is_none() {
        warn!("MONITORED_PC_IP не задан, цикл опроса будет простаивать");
    }
    if let Err(err) = tokio::fs::create_dir_all(&settings.upload_folder).await {
        warn!(error = %err, folder = %settings.upload_folder, "не удалось создать папку загрузок");
    }

    info!(
        listen = %cfg.listen,
        poll_interval = %humantime::format_duration(cfg.poll_interval),
        network_every_ticks = cfg.network_every_ticks,
        "запуск homedash"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let client = Client::builder()
        .user_agent("homedash/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let telemetry = HttpTelemetrySource::new(client.clone(), cfg.upstream.clone(), cfg.fetch_timeout);
    let hub = SnapshotHub::new(cfg.subscriber_buffer);
    let settings = Arc::new(RwLock::new(settings));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let app_state = AppState {
            metrics: metrics.clone(),
            hub: hub.clone(),
            settings: settings.clone(),
            telemetry: Arc::new(telemetry.clone()),
            spotify: Arc::new(SpotifyClient::new(client, cfg.spotify.clone())),
            files: Arc::new(ConfigFiles {
                env_file: cfg.env_file.clone(),
                frontend_config: cfg.frontend_config.clone(),
            }),
            upload_lock: IndexLock::default(),
            shutdown: shutdown_rx.clone(),
        };
        let app = http::build_router(app_state, cfg.static_dir.as_deref());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let poller_task = {
        let poller = Poller::new(
            telemetry,
            hub,
            settings,
            metrics,
            cfg.poll_interval,
            cfg.network_every_ticks,
        );
        tokio::spawn(poller.run(shutdown_rx))
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    let _ = poller_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
