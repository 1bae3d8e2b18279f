//! Keepalive timer under a paused clock

mod common;

use chatsync_core::net::ConnectionStatus;
use chatsync_core::sync::LivenessMonitor;
use common::*;
use serde_json::json;
use std::time::Duration;
use tokio::time::advance;

const PERIOD: Duration = Duration::from_secs(30);

/// Let spawned tasks observe the latest state
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_pings_every_interval_while_open() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 3).await;

    let monitor = LivenessMonitor::with_interval(&manager, PERIOD);
    settle().await;

    advance(PERIOD - Duration::from_secs(1)).await;
    settle().await;
    assert!(socket.drain().is_empty());
    assert_eq!(monitor.stats().pings_sent(), 0);

    advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(
        socket.drain(),
        vec![json!({"type": "ping", "userId": 3})]
    );

    advance(PERIOD).await;
    settle().await;
    assert_eq!(socket.drain().len(), 1);
    assert_eq!(monitor.stats().pings_sent(), 2);

    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_pong_is_counted() {
    let (manager, mut server) = manager_with_server();
    let socket = connect_as(&manager, &mut server, 3).await;
    let monitor = LivenessMonitor::with_interval(&manager, PERIOD);
    settle().await;

    socket.push(json!({"type": "PONG"}));
    settle().await;

    assert_eq!(monitor.stats().acks_received(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_timer() {
    let (manager, mut server) = manager_with_server();
    let mut socket = connect_as(&manager, &mut server, 3).await;
    let monitor = LivenessMonitor::with_interval(&manager, PERIOD);
    settle().await;

    socket.disconnect();
    wait_for_status(&manager, ConnectionStatus::Closed).await;
    settle().await;

    advance(PERIOD * 3).await;
    settle().await;
    assert_eq!(monitor.stats().pings_sent(), 0);

    // Resumes on the next connection, one full interval after it opens
    let mut next = connect_as(&manager, &mut server, 4).await;
    settle().await;
    advance(PERIOD).await;
    settle().await;

    assert_eq!(next.drain(), vec![json!({"type": "ping", "userId": 4})]);
    assert_eq!(monitor.stats().pings_sent(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_started_before_connecting() {
    let (manager, mut server) = manager_with_server();
    let monitor = LivenessMonitor::with_interval(&manager, PERIOD);

    advance(PERIOD * 2).await;
    settle().await;
    assert_eq!(monitor.stats().pings_sent(), 0);

    let mut socket = connect_as(&manager, &mut server, 8).await;
    settle().await;
    advance(PERIOD).await;
    settle().await;

    assert_eq!(socket.drain().len(), 1);
    drop(monitor);

    advance(PERIOD * 2).await;
    settle().await;
    assert!(socket.drain().is_empty());
}
