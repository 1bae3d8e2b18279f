/// Per-feature subscriptions over the shared connection
///
/// Each subscription attaches a listener to the open connection's event
/// bus, issues its initial query, and follows the connection: when the
/// socket is replaced it detaches from the old bus, attaches to the new
/// one and queries again. Dropping (or unmounting) a subscription detaches
/// synchronously.
pub mod chat_list;
pub mod directory;
pub mod liveness;
pub mod new_contact;
pub mod single_chat;

pub use chat_list::ChatListSync;
pub use directory::DirectorySync;
pub use liveness::LivenessMonitor;
pub use new_contact::{NewContactSync, SubmissionState};
pub use single_chat::SingleChatSync;

use crate::net::connection::{ConnectionHandle, ConnectionManager, ConnectionState};
use crate::net::protocol::InboundKind;
use crate::utils::event_bus::{Handler, Subscription};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Listener attachment that follows the manager's current connection
pub(crate) struct Mount {
    slot: Arc<Mutex<Option<Subscription>>>,
    unmounted: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Mount {
    /// Attach now if a connection is open, then keep following replacements.
    /// `on_open` runs once per attached connection, after the listener is in place.
    pub(crate) fn new<Q>(
        manager: &ConnectionManager,
        kinds: &'static [InboundKind],
        handler: Handler,
        on_open: Q,
    ) -> Self
    where
        Q: Fn(&ConnectionHandle) + Send + Sync + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let unmounted = Arc::new(AtomicBool::new(false));

        let mut state = manager.watch_state();
        let initial = state.borrow_and_update().clone();
        let attached = attach(&slot, &unmounted, &initial, kinds, &handler, &on_open);

        let task = tokio::spawn(follow_connection(
            state,
            attached,
            slot.clone(),
            unmounted.clone(),
            kinds,
            handler,
            on_open,
        ));

        Self {
            slot,
            unmounted,
            task: Some(task),
        }
    }

    /// True while a listener is registered on an open connection
    pub(crate) fn is_attached(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    /// Detach the listener and stop following. Idempotent.
    pub(crate) fn unmount(&mut self) {
        self.unmounted.store(true, Ordering::Release);
        let subscription = self.slot.lock().take();
        drop(subscription);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Replace whatever is in `slot` with a listener on the open connection, if any
fn attach<Q>(
    slot: &Mutex<Option<Subscription>>,
    unmounted: &AtomicBool,
    state: &ConnectionState,
    kinds: &[InboundKind],
    handler: &Handler,
    on_open: &Q,
) -> Option<Uuid>
where
    Q: Fn(&ConnectionHandle),
{
    let conn = {
        let mut guard = slot.lock();
        let previous = guard.take();
        drop(previous);

        if unmounted.load(Ordering::Acquire) {
            return None;
        }
        let conn = state.open_connection()?;
        *guard = Some(conn.bus().subscribe(kinds, handler.clone()));
        conn.clone()
    };

    on_open(conn.as_ref());
    Some(conn.id())
}

async fn follow_connection<Q>(
    mut state: watch::Receiver<ConnectionState>,
    mut current: Option<Uuid>,
    slot: Arc<Mutex<Option<Subscription>>>,
    unmounted: Arc<AtomicBool>,
    kinds: &'static [InboundKind],
    handler: Handler,
    on_open: Q,
) where
    Q: Fn(&ConnectionHandle) + Send + Sync + 'static,
{
    while state.changed().await.is_ok() {
        if unmounted.load(Ordering::Acquire) {
            break;
        }
        let snapshot = state.borrow_and_update().clone();
        let open = snapshot.open_connection().map(|c| c.id());
        if open == current {
            continue;
        }
        current = attach(&slot, &unmounted, &snapshot, kinds, &handler, &on_open);
    }
}
