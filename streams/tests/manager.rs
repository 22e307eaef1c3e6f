mod common;

use std::time::Duration;

use common::*;
use data_types::ConnectionState;
use event_bus::{EventBus, events};
use serde_json::json;
use streams::Frame;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_cold_start_backs_off_then_connects() {
    let transport = MockTransport::new();
    transport.refuse(2);
    let _server = transport.accept();
    let bus = EventBus::new();
    let seen = record(&bus, &[events::STATE_CHANGED]);
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();
    let started = Instant::now();

    manager.connect("session_abc_1").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(350), "{elapsed:?}");

    let states: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|(_, v)| (v["state"].as_str().unwrap().to_string(), v["attempt"].as_u64().unwrap(), v["delay_ms"].as_u64()))
        .collect();
    assert_eq!(
        states,
        vec![
            ("connecting".to_string(), 0, None),
            ("reconnecting".to_string(), 1, Some(100)),
            ("reconnecting".to_string(), 2, Some(200)),
            ("connected".to_string(), 0, None),
        ]
    );
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(transport.opens(), 3);
    assert!(transport.urls()[0].ends_with("/desktop/api/progress_stream?session_id=session_abc_1"));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnects_fail_once() {
    let transport = MockTransport::new();
    let bus = EventBus::new();
    let seen = record(&bus, &[events::MAX_RECONNECT_ATTEMPTS_REACHED, events::RECONNECTING]);
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_abc_1").await.unwrap();
    let failed = wait_for_state(&mut rx, ConnectionState::Failed).await;

    assert_eq!(failed.attempt, 5);
    assert_eq!(transport.opens(), 6);
    assert_eq!(count(&seen, events::RECONNECTING), 5);
    assert_eq!(count(&seen, events::MAX_RECONNECT_ATTEMPTS_REACHED), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), 6);
    assert_eq!(count(&seen, events::MAX_RECONNECT_ATTEMPTS_REACHED), 1);
    assert_eq!(manager.state(), ConnectionState::Failed);
    // kept so an online signal can revive it
    assert_eq!(manager.session_id().as_deref(), Some("session_abc_1"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_same_session_is_idempotent() {
    let transport = MockTransport::new();
    let first = transport.accept();
    let bus = EventBus::new();
    let seen = record(&bus, &[events::CONNECTED]);
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;
    manager.connect("session_a").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.opens(), 1);
    assert_eq!(count(&seen, events::CONNECTED), 1);
    assert!(first.is_alive());

    let _second = transport.accept();
    manager.connect("session_b").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    assert_eq!(transport.opens(), 2);
    assert_eq!(manager.session_id().as_deref(), Some("session_b"));
    assert!(!first.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_detects_dead_stream() {
    let transport = MockTransport::new();
    let server = transport.accept();
    let _replacement = transport.accept();
    let bus = EventBus::new();
    let seen = record(&bus, &[events::CONNECTION_RESTORED, events::DISCONNECTED]);
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    let killed_at = Instant::now();
    server.kill();
    let snapshot = wait_for_state(&mut rx, ConnectionState::Reconnecting).await;

    assert!(killed_at.elapsed() <= Duration::from_secs(30));
    assert_eq!(snapshot.attempt, 1);
    assert_eq!(snapshot.delay, Some(Duration::from_millis(100)));

    wait_for_state(&mut rx, ConnectionState::Connected).await;
    assert_eq!(count(&seen, events::DISCONNECTED), 1);
    assert_eq!(count(&seen, events::CONNECTION_RESTORED), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let transport = MockTransport::new();
    let bus = EventBus::new();
    let seen = record(&bus, &[events::DISCONNECTED]);
    let manager = manager(&transport, &bus, settings(1_000, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Reconnecting).await;
    let opens = transport.opens();

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(manager.session_id(), None);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.opens(), opens);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.disconnect();
    assert_eq!(count(&seen, events::DISCONNECTED), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_open_channel() {
    let transport = MockTransport::new();
    let server = transport.accept();
    let bus = EventBus::new();
    let manager = manager(&transport, &bus, default_settings());
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;
    manager.disconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!server.is_alive());
    assert_eq!(transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_routed_in_order() {
    let transport = MockTransport::new();
    let server = transport.accept();
    let bus = EventBus::new();
    let seen = record(
        &bus,
        &[events::CONNECTED, events::ERROR, events::PROGRESS_UPDATE, "hardware_start"],
    );
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    server.send_json(json!({"event": "connected", "session_id": "session_a"}));
    server.send(Frame::message("{oops"));
    server.send_json(json!({"step": 1, "progress": 10}));
    server.send(Frame::new("hardware_start", r#"{"unit": 2}"#));
    server.send_error("chunk decode failed");
    server.send_json(json!({"step": 1, "progress": 55}));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let seen = seen.lock().unwrap();
    let names: Vec<_> = seen.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["connected", "error", "progress_update", "hardware_start", "error", "progress_update"]
    );
    assert_eq!(seen[1].1["type"], "sse_parse_error");
    assert_eq!(seen[4].1["type"], "sse_connection_error");
    assert_eq!(seen[5].1["progress"], 55);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_triggers_reconnect() {
    let transport = MockTransport::new();
    let server = transport.accept();
    let _replacement = transport.accept();
    let bus = EventBus::new();
    let manager = manager(&transport, &bus, settings(100, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;
    server.close();

    let snapshot = wait_for_state(&mut rx, ConnectionState::Reconnecting).await;
    assert_eq!(snapshot.attempt, 1);
    wait_for_state(&mut rx, ConnectionState::Connected).await;
    assert_eq!(transport.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_online_signal_skips_backoff_wait() {
    let transport = MockTransport::new();
    transport.refuse(1);
    let _server = transport.accept();
    let bus = EventBus::new();
    let manager = manager(&transport, &bus, settings(10_000, 5));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Reconnecting).await;

    let signalled_at = Instant::now();
    manager.network_online().await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    assert!(signalled_at.elapsed() < Duration::from_secs(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_online_signal_as_reconnecting_is_published() {
    for _ in 0..20 {
        let transport = MockTransport::new();
        transport.refuse(1);
        let _server = transport.accept();
        let manager = manager(&transport, &EventBus::new(), settings(60_000, 5));
        let mut rx = manager.subscribe();

        manager.connect("session_a").await.unwrap();
        wait_for_state(&mut rx, ConnectionState::Reconnecting).await;
        manager.network_online().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), wait_for_state(&mut rx, ConnectionState::Connected))
            .await
            .expect("online signal was lost");
        manager.disconnect();
    }
}

#[tokio::test(start_paused = true)]
async fn test_online_signal_revives_failed_stream() {
    let transport = MockTransport::new();
    let bus = EventBus::new();
    let manager = manager(&transport, &bus, settings(100, 1));
    let mut rx = manager.subscribe();

    manager.connect("session_a").await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Failed).await;
    assert_eq!(transport.opens(), 2);

    let _server = transport.accept();
    manager.network_online().await.unwrap();
    wait_for_state(&mut rx, ConnectionState::Connected).await;

    assert_eq!(transport.opens(), 3);
    assert_eq!(manager.session_id().as_deref(), Some("session_a"));
}

#[test]
fn test_stream_url_encodes_session() {
    let transport = MockTransport::new();
    let manager = manager(&transport, &EventBus::new(), default_settings());

    let url = manager.stream_url("session a&b").unwrap();
    assert_eq!(
        url,
        "http://localhost:5000/desktop/api/progress_stream?session_id=session+a%26b"
    );
}
