/// Conversation list subscription
use crate::models::Conversation;
use crate::net::connection::ConnectionManager;
use crate::net::protocol::{Inbound, InboundKind, Request};
use crate::sync::Mount;
use crate::utils::event_bus::Handler;
use crate::views;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Keeps the conversation list equal to the latest `friend_list` snapshot
pub struct ChatListSync {
    conversations: Arc<watch::Sender<Vec<Conversation>>>,
    manager: ConnectionManager,
    mount: Mount,
}

impl ChatListSync {
    /// Attach to `manager` and request the list (now if connected, otherwise on open)
    pub fn mount(manager: &ConnectionManager) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        let conversations = Arc::new(tx);

        let handler: Handler = {
            let conversations = conversations.clone();
            Arc::new(move |inbound: &Inbound| {
                if let Inbound::ChatList(list) = inbound {
                    debug!("Conversation list snapshot with {} entries", list.len());
                    // Whole-list replacement: last snapshot wins
                    conversations.send_replace(list.clone());
                }
            })
        };

        let mount = Mount::new(manager, &[InboundKind::ChatList], handler, |conn| {
            conn.send(&Request::GetChatList);
        });

        Self {
            conversations,
            manager: manager.clone(),
            mount,
        }
    }

    /// Current list in server order
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.borrow().clone()
    }

    /// Filtered by `query` and sorted most recent first
    pub fn view(&self, query: &str) -> Vec<Conversation> {
        views::conversation_view(&self.conversations.borrow(), query)
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations
            .borrow()
            .iter()
            .map(|c| c.unread_count)
            .sum()
    }

    /// Change notifications for the list
    pub fn watch(&self) -> watch::Receiver<Vec<Conversation>> {
        self.conversations.subscribe()
    }

    /// Ask the server for a fresh snapshot; false while disconnected
    pub fn refresh(&self) -> bool {
        self.manager.send(&Request::GetChatList)
    }

    pub fn is_attached(&self) -> bool {
        self.mount.is_attached()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}
