/// Keepalive ping while the connection is open
use crate::net::connection::{ConnectionManager, ConnectionState};
use crate::net::protocol::{Inbound, InboundKind, Request};
use crate::sync::Mount;
use crate::utils::event_bus::Handler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Counters for diagnostics
#[derive(Debug, Default)]
pub struct LivenessStats {
    pings_sent: AtomicU64,
    acks_received: AtomicU64,
}

impl LivenessStats {
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    pub fn acks_received(&self) -> u64 {
        self.acks_received.load(Ordering::Relaxed)
    }
}

/// Sends `ping` every keepalive interval while connected and logs `PONG`s.
/// Observes only; never opens or closes the connection.
pub struct LivenessMonitor {
    stats: Arc<LivenessStats>,
    task: Option<JoinHandle<()>>,
    mount: Mount,
}

impl LivenessMonitor {
    /// Start with the configured keepalive interval
    pub fn start(manager: &ConnectionManager) -> Self {
        Self::with_interval(manager, manager.config().keepalive_interval)
    }

    pub fn with_interval(manager: &ConnectionManager, period: Duration) -> Self {
        let stats = Arc::new(LivenessStats::default());

        let handler: Handler = {
            let stats = stats.clone();
            Arc::new(move |inbound: &Inbound| {
                if let Inbound::Pong = inbound {
                    stats.acks_received.fetch_add(1, Ordering::Relaxed);
                    debug!("Keepalive acknowledged");
                }
            })
        };
        let mount = Mount::new(manager, &[InboundKind::Pong], handler, |_| {});

        let task = tokio::spawn(run_keepalive(manager.watch_state(), period, stats.clone()));

        Self {
            stats,
            task: Some(task),
            mount,
        }
    }

    pub fn stats(&self) -> &LivenessStats {
        &self.stats
    }

    /// Cancel the timer and detach
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.mount.unmount();
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.halt();
    }
}

async fn run_keepalive(
    mut state: watch::Receiver<ConnectionState>,
    period: Duration,
    stats: Arc<LivenessStats>,
) {
    loop {
        // Idle until a connection is open
        let conn = loop {
            let snapshot = state.borrow_and_update().clone();
            if let Some(conn) = snapshot.open_connection() {
                break conn.clone();
            }
            if state.changed().await.is_err() {
                return;
            }
        };

        debug!("Keepalive started, every {:?}", period);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if conn.send(&Request::Ping) {
                        stats.pings_sent.fetch_add(1, Ordering::Relaxed);
                        debug!("Keepalive sent");
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let same = state
                        .borrow()
                        .open_connection()
                        .map(|c| c.id() == conn.id())
                        .unwrap_or(false);
                    if !same {
                        debug!("Keepalive stopped");
                        break;
                    }
                }
            }
        }
    }
}
