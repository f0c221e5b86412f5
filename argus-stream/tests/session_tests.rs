//! End-to-end tests for the streaming session against in-process servers:
//! a real WebSocket backend for the push path (connect, routing, peer close,
//! reconnect, explicit disconnect, heartbeat acks) and an HTTP snapshot
//! backend for the polling fallback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_stream::{AcquisitionMode, ChannelState, StreamConfig, StreamSession};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const TS: &str = "2026-08-06T10:00:00Z";

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn metric_frame(threats: u64) -> String {
    serde_json::json!({
        "type": "metric_snapshot",
        "timestamp": TS,
        "data": {"threats_detected": threats, "active_investigations": 2}
    })
    .to_string()
}

fn alert_frame(id: &str, severity: &str) -> String {
    serde_json::json!({
        "type": "threat_alert",
        "timestamp": TS,
        "data": {"id": id, "severity": severity, "title": "c2 beacon observed"}
    })
    .to_string()
}

fn entity_frame(id: &str, level: u32) -> String {
    serde_json::json!({
        "type": "entity_activity",
        "timestamp": TS,
        "data": {"entity_id": id, "name": "ghost", "platform": "telegram", "activity_level": level}
    })
    .to_string()
}

fn pong_frame() -> String {
    serde_json::json!({
        "type": "control_ack",
        "timestamp": TS,
        "data": {"ack": "pong"}
    })
    .to_string()
}

fn subscribed_frame(target: &str) -> String {
    serde_json::json!({
        "type": "control_ack",
        "timestamp": TS,
        "data": {"ack": "subscribed", "target": target}
    })
    .to_string()
}

type ConnScript = dyn Fn(usize) -> (Vec<String>, bool) + Send + Sync;

/// WebSocket backend. `script(conn_index)` yields the frames to push and
/// whether to close afterwards; connections left open answer ping and
/// subscribe control frames like the real backend does.
async fn spawn_ws_server<F>(script: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize) -> (Vec<String>, bool) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let conns = connections.clone();
    let script: Arc<ConnScript> = Arc::new(script);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let idx = conns.fetch_add(1, Ordering::SeqCst);
            let script = script.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                let (frames, close_after) = script(idx);
                for frame in frames {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                if close_after {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let reply = if text.contains("\"ping\"") {
                            Some(pong_frame())
                        } else if text.contains("\"subscribe\"") {
                            serde_json::from_str::<serde_json::Value>(&text)
                                .ok()
                                .and_then(|v| v["target"].as_str().map(|t| subscribed_frame(t)))
                        } else {
                            None
                        };
                        if let Some(reply) = reply {
                            if ws.send(Message::Text(reply)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{}/ws/intel", addr), connections)
}

/// TCP listener that drops connections before the WebSocket handshake while
/// `accepting` is false, so connect attempts fail deterministically.
async fn spawn_flaky_ws_server(
    accepting: Arc<AtomicBool>,
    frames: Vec<String>,
) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));
    let counter = handshakes.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            if !accepting.load(Ordering::SeqCst) {
                drop(stream);
                continue;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let frames = frames.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                for frame in frames {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    (format!("ws://{}/ws/intel", addr), handshakes)
}

/// HTTP snapshot backend; `fail_after` hits return 500 from then on.
async fn spawn_snapshot_server(fail_after: Option<usize>) -> (String, Arc<AtomicUsize>) {
    use axum::{routing::get, Json, Router};

    let hits = Arc::new(AtomicUsize::new(0));
    let state = hits.clone();
    let app = Router::new().route(
        "/api/intel/snapshot",
        get(move || {
            let hits = state.clone();
            async move {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                if fail_after.is_some_and(|limit| n >= limit) {
                    return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                }
                Ok(Json(serde_json::json!({
                    "type": "metric_snapshot",
                    "timestamp": TS,
                    "data": {"threats_detected": n as u64}
                })))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api/intel/snapshot", addr), hits)
}

fn push_config(endpoint: &str) -> StreamConfig {
    StreamConfig {
        push_endpoint: endpoint.into(),
        snapshot_endpoint: String::new(),
        push_enabled: true,
        fallback_to_polling: false,
        poll_interval_ms: 100,
        max_metric_points: 50,
        max_alerts: 10,
        max_entities: 10,
        max_reconnect_attempts: 5,
        reconnect_base_ms: 100,
        reconnect_cap_ms: 400,
        heartbeat_interval_ms: 30_000,
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, pred: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for: {}", what);
}

// ── Push path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_push_frames_reach_registries() {
    let (url, _) = spawn_ws_server(|_| {
        (
            vec![
                metric_frame(5),
                alert_frame("a1", "high"),
                entity_frame("e1", 40),
            ],
            false,
        )
    })
    .await;

    let handle = StreamSession::new(push_config(&url)).start();
    wait_until("all three frames routed", || {
        let snap = handle.snapshot();
        snap.metrics.len() == 1 && snap.alerts.len() == 1 && snap.entities.len() == 1
    })
    .await;

    let snap = handle.snapshot();
    assert!(snap.connected);
    assert_eq!(snap.channel_state, ChannelState::Open);
    assert_eq!(snap.mode, AcquisitionMode::Push);
    assert_eq!(snap.current.unwrap().threats_detected, 5);
    assert_eq!(snap.alerts[0].id, "a1");
    assert_eq!(snap.entities[0].entity_id, "e1");
    assert!(snap.last_update.is_some());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frames_leave_state_unchanged() {
    let (url, _) = spawn_ws_server(|_| {
        (
            vec![
                metric_frame(1),
                "{not json".into(),
                r#"{"data":{"x":1}}"#.into(), // missing type and timestamp
            ],
            false,
        )
    })
    .await;

    let handle = StreamSession::new(push_config(&url)).start();
    wait_until("malformed frames counted", || {
        handle.report().malformed_dropped == 2
    })
    .await;

    let snap = handle.snapshot();
    assert_eq!(snap.metrics.len(), 1);
    assert!(snap.alerts.is_empty());
    assert!(snap.entities.is_empty());
    assert!(handle.is_connected());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_peer_close() {
    let (url, conns) = spawn_ws_server(|idx| {
        if idx == 0 {
            (vec![metric_frame(1)], true)
        } else {
            (vec![metric_frame(2)], false)
        }
    })
    .await;

    let handle = StreamSession::new(push_config(&url)).start();
    wait_until("second connection delivers", || {
        handle.snapshot().metrics.len() >= 2
    })
    .await;

    assert!(conns.load(Ordering::SeqCst) >= 2);
    assert!(handle.report().reconnects_scheduled >= 1);
    assert!(handle.is_connected());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_explicit_disconnect_suppresses_reconnect() {
    let (url, conns) = spawn_ws_server(|_| (vec![], false)).await;

    let handle = StreamSession::new(push_config(&url)).start();
    wait_until("connected", || handle.is_connected()).await;

    handle.disconnect();
    wait_until("disconnected", || !handle.is_connected()).await;

    // Well past the base retry delay: no new connection may appear.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(conns.load(Ordering::SeqCst), 1);
    assert_eq!(handle.snapshot().channel_state, ChannelState::Closed);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_pings_are_answered() {
    let (url, _) = spawn_ws_server(|_| (vec![], false)).await;

    let mut config = push_config(&url);
    config.heartbeat_interval_ms = 100;
    let handle = StreamSession::new(config).start();

    wait_until("several heartbeats exchanged", || {
        handle.report().heartbeats_sent >= 3
    })
    .await;

    let report = handle.report();
    assert_eq!(report.missed_pongs, 0);
    assert!(report.acks_received >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_subscription_ack_round_trip() {
    let (url, _) = spawn_ws_server(|_| (vec![], false)).await;

    let handle = StreamSession::new(push_config(&url)).start();
    wait_until("connected", || handle.is_connected()).await;

    handle.subscribe("investigation-7");
    wait_until("subscription confirmed", || {
        handle
            .snapshot()
            .confirmed_subscriptions
            .contains(&"investigation-7".to_string())
    })
    .await;

    handle.unsubscribe("investigation-7");
    wait_until("subscription released", || {
        handle.snapshot().confirmed_subscriptions.is_empty()
    })
    .await;

    handle.shutdown().await;
}

// ── Reconnect exhaustion and fallback ────────────────────────────────────────

#[tokio::test]
async fn test_exhaustion_promotes_to_polling() {
    let accepting = Arc::new(AtomicBool::new(false));
    let (ws_url, _) = spawn_flaky_ws_server(accepting, vec![]).await;
    let (snap_url, hits) = spawn_snapshot_server(None).await;

    let config = StreamConfig {
        push_endpoint: ws_url,
        snapshot_endpoint: snap_url,
        push_enabled: true,
        fallback_to_polling: true,
        poll_interval_ms: 100,
        max_reconnect_attempts: 2,
        reconnect_base_ms: 50,
        reconnect_cap_ms: 100,
        ..push_config("unused")
    };
    let handle = StreamSession::new(config).start();

    wait_until("promoted to polling", || {
        handle.snapshot().mode == AcquisitionMode::Polling
    })
    .await;
    let snap = handle.snapshot();
    assert!(snap.reconnect_exhausted);
    assert!(!snap.connected);

    wait_until("polling feeds the buffer", || {
        handle.snapshot().metrics.len() >= 3
    })
    .await;
    assert!(hits.load(Ordering::SeqCst) >= 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_manual_reconnect_exits_exhausted() {
    let accepting = Arc::new(AtomicBool::new(false));
    let (ws_url, handshakes) =
        spawn_flaky_ws_server(accepting.clone(), vec![metric_frame(7)]).await;

    let config = StreamConfig {
        push_endpoint: ws_url,
        fallback_to_polling: false,
        max_reconnect_attempts: 1,
        reconnect_base_ms: 50,
        reconnect_cap_ms: 100,
        ..push_config("unused")
    };
    let handle = StreamSession::new(config).start();

    wait_until("exhausted", || handle.snapshot().reconnect_exhausted).await;
    assert!(!handle.is_connected());

    // Backend comes back; only an explicit reconnect may leave Exhausted.
    accepting.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handshakes.load(Ordering::SeqCst), 0);

    handle.reconnect();
    wait_until("reconnected", || handle.is_connected()).await;

    let snap = handle.snapshot();
    assert!(!snap.reconnect_exhausted);
    assert_eq!(snap.mode, AcquisitionMode::Push);
    wait_until("fresh channel delivers", || {
        handle.snapshot().metrics.len() >= 1
    })
    .await;

    handle.shutdown().await;
}

// ── Polling mode ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_polling_mode_accumulates_snapshots() {
    let (snap_url, _) = spawn_snapshot_server(None).await;

    let config = StreamConfig {
        push_enabled: false,
        snapshot_endpoint: snap_url,
        poll_interval_ms: 100,
        ..push_config("unused")
    };
    let handle = StreamSession::new(config).start();

    wait_until("several polls routed", || handle.snapshot().metrics.len() >= 3).await;

    let snap = handle.snapshot();
    assert_eq!(snap.mode, AcquisitionMode::Polling);
    assert!(!snap.connected);
    // Snapshots arrive in poll order through the same routing path.
    let series: Vec<u64> = snap.metrics.iter().map(|p| p.threats_detected).collect();
    let mut sorted = series.clone();
    sorted.sort_unstable();
    assert_eq!(series, sorted);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_poll_failures_leave_buffer_unchanged() {
    let (snap_url, _) = spawn_snapshot_server(Some(1)).await;

    let config = StreamConfig {
        push_enabled: false,
        snapshot_endpoint: snap_url,
        poll_interval_ms: 100,
        ..push_config("unused")
    };
    let handle = StreamSession::new(config).start();

    wait_until("failures recorded", || handle.report().poll_failures >= 2).await;

    let snap = handle.snapshot();
    assert_eq!(snap.metrics.len(), 1);
    assert!(snap.last_error.is_some());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_poll_timer() {
    let (snap_url, hits) = spawn_snapshot_server(None).await;

    let config = StreamConfig {
        push_enabled: false,
        snapshot_endpoint: snap_url,
        poll_interval_ms: 100,
        ..push_config("unused")
    };
    let handle = StreamSession::new(config).start();
    wait_until("polling live", || hits.load(Ordering::SeqCst) >= 2).await;

    handle.shutdown().await;
    let after = hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(hits.load(Ordering::SeqCst), after);
}
