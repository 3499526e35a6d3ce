use super::AppState;
use crate::state::Snapshot;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const UPDATE_EVENT: &str = "update_stats";

#[derive(Serialize)]
struct Event<'a> {
    event: &'static str,
    data: &'a Snapshot,
}

pub(crate) fn update_event(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Event {
        event: UPDATE_EVENT,
        data: snapshot,
    })
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

pub(crate) async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_updates(socket, state))
}

async fn stream_updates(mut socket: WebSocket, state: AppState) {
    let mut subscription = state.hub.subscribe();
    let shutdown = shutdown_requested(state.shutdown.clone());
    tokio::pin!(shutdown);
    state.metrics.set_subscribers(state.hub.subscriber_count());
    info!(subscribers = state.hub.subscriber_count(), "client connected");

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else { break };
                let text = match update_event(&snapshot) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to encode snapshot");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("send failed, dropping client");
                    break;
                }
            }
            _ = &mut shutdown => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket receive error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unsubscribe(subscription);
    state.metrics.set_subscribers(state.hub.subscriber_count());
    info!(subscribers = state.hub.subscriber_count(), "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::SensorReadings;
    use crate::http::build_router;
    use crate::http::test_support::state_with_shutdown;
    use crate::hub::SnapshotHub;
    use crate::metrics::Metrics;
    use crate::state::{LastGoodNetwork, MonitorSettings, NetworkStatus};
    use async_tungstenite::tokio::connect_async;
    use async_tungstenite::tungstenite::Message as WsMessage;
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn spawn_server(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state, None);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{addr}/ws")
    }

    async fn wait_for_subscribers(hub: &SnapshotHub, metrics: &Metrics, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() != count
                || metrics.dashboard_subscribers.get() != count as f64
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    #[test]
    fn update_event_wraps_snapshot() {
        let mut readings = SensorReadings {
            gpu_temp: 55.0,
            ..SensorReadings::default()
        };
        readings.disks.insert("D:".to_string(), 12.5);
        let snapshot = Snapshot::assemble(
            7,
            1_700_000_000,
            readings,
            &LastGoodNetwork::default(),
            NetworkStatus::Cached,
        );

        let json: Value = serde_json::from_str(&update_event(&snapshot).unwrap()).unwrap();
        assert_eq!(json["event"], "update_stats");
        assert_eq!(json["data"]["tick"], 7);
        assert_eq!(json["data"]["gpu_temp"], 55.0);
        assert_eq!(json["data"]["disks"]["D:"], 12.5);
        assert_eq!(json["data"]["network_status"], "cached");
    }

    #[tokio::test]
    async fn socket_streams_updates_until_client_closes() {
        let dir = TempDir::new().unwrap();
        let (app_state, _shutdown) = state_with_shutdown(dir.path(), MonitorSettings::default(), None);
        let hub = app_state.hub.clone();
        let metrics = app_state.metrics.clone();
        let url = spawn_server(app_state).await;

        let (mut client, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_subscribers(&hub, &metrics, 1).await;

        hub.publish(Snapshot::assemble(
            3,
            1_700_000_000,
            SensorReadings::default(),
            &LastGoodNetwork::default(),
            NetworkStatus::Online,
        ));
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no update received")
            .expect("stream ended")
            .unwrap();
        let text = match message {
            WsMessage::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        };
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["event"], "update_stats");
        assert_eq!(json["data"]["tick"], 3);

        client.send(WsMessage::Close(None)).await.unwrap();
        wait_for_subscribers(&hub, &metrics, 0).await;
    }

    #[tokio::test]
    async fn shutdown_closes_open_sockets() {
        let dir = TempDir::new().unwrap();
        let (app_state, shutdown) = state_with_shutdown(dir.path(), MonitorSettings::default(), None);
        let hub = app_state.hub.clone();
        let metrics = app_state.metrics.clone();
        let url = spawn_server(app_state).await;

        let (mut client, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_subscribers(&hub, &metrics, 1).await;

        shutdown.send(true).unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("socket left open after shutdown")
            .expect("stream ended without a close frame")
            .unwrap();
        assert!(matches!(message, WsMessage::Close(_)), "{message:?}");
        wait_for_subscribers(&hub, &metrics, 0).await;
    }
}
