/// Single conversation subscription: transcript plus peer profile
use crate::models::{ChatMessage, User, UserId};
use crate::net::connection::ConnectionManager;
use crate::net::protocol::{Inbound, InboundKind, Request};
use crate::sync::Mount;
use crate::utils::event_bus::Handler;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

const KINDS: &[InboundKind] = &[
    InboundKind::SingleChat,
    InboundKind::NewMessage,
    InboundKind::FriendData,
];

/// Transcript with one peer.
///
/// The message list starts from the `single_chat` history and grows with
/// every `new_message` whose sender or recipient is the peer, in arrival
/// order. Envelopes about other peers are ignored.
pub struct SingleChatSync {
    peer: UserId,
    messages: Arc<watch::Sender<Vec<ChatMessage>>>,
    friend: Arc<watch::Sender<Option<User>>>,
    /// Bumped on every peer switch; handlers of an older peer stop writing
    generation: Arc<Mutex<u64>>,
    manager: ConnectionManager,
    mount: Mount,
}

impl SingleChatSync {
    pub fn mount(manager: &ConnectionManager, peer: UserId) -> Self {
        let (messages, _) = watch::channel(Vec::new());
        let (friend, _) = watch::channel(None);
        let messages = Arc::new(messages);
        let friend = Arc::new(friend);
        let generation = Arc::new(Mutex::new(0));

        let mount = Self::attach(manager, peer, &generation, &messages, &friend);

        Self {
            peer,
            messages,
            friend,
            generation,
            manager: manager.clone(),
            mount,
        }
    }

    fn attach(
        manager: &ConnectionManager,
        peer: UserId,
        generation: &Arc<Mutex<u64>>,
        messages: &Arc<watch::Sender<Vec<ChatMessage>>>,
        friend: &Arc<watch::Sender<Option<User>>>,
    ) -> Mount {
        let handler: Handler = {
            let mine = *generation.lock();
            let generation = generation.clone();
            let messages = messages.clone();
            let friend = friend.clone();
            Arc::new(move |inbound: &Inbound| {
                // Held for the whole update so a peer switch cannot interleave
                let current = generation.lock();
                if *current != mine {
                    return;
                }
                match inbound {
                    Inbound::SingleChat(history) => {
                        if history.iter().all(|m| m.involves(peer)) {
                            debug!("History with {}: {} messages", peer, history.len());
                            messages.send_replace(history.clone());
                        } else {
                            debug!("Ignoring history that belongs to another conversation");
                        }
                    }
                    Inbound::NewMessage(message) if message.involves(peer) => {
                        messages.send_modify(|list| list.push(message.clone()));
                    }
                    Inbound::FriendData {
                        peer: Some(user), ..
                    } if user.id == peer => {
                        friend.send_replace(Some(user.clone()));
                    }
                    Inbound::FriendData { peer: None, error } => {
                        warn!(
                            "Peer data unavailable: {}",
                            error.as_deref().unwrap_or("user not found")
                        );
                    }
                    _ => {}
                }
            })
        };

        Mount::new(manager, KINDS, handler, move |conn| {
            conn.send(&Request::GetSingleChat { friend_id: peer });
            conn.send(&Request::FriendData { friend_id: peer });
        })
    }

    pub fn peer_id(&self) -> UserId {
        self.peer
    }

    /// Switch to another peer: detach first, clear state, then query again
    pub fn set_peer(&mut self, peer: UserId) {
        if peer == self.peer {
            return;
        }
        self.mount.unmount();
        self.peer = peer;
        {
            let mut generation = self.generation.lock();
            *generation += 1;
            self.messages.send_replace(Vec::new());
            self.friend.send_replace(None);
        }
        self.mount = Self::attach(
            &self.manager,
            peer,
            &self.generation,
            &self.messages,
            &self.friend,
        );
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.borrow().clone()
    }

    /// Peer profile once `friend_data` has arrived
    pub fn peer(&self) -> Option<User> {
        self.friend.borrow().clone()
    }

    pub fn watch_messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.messages.subscribe()
    }

    pub fn watch_peer(&self) -> watch::Receiver<Option<User>> {
        self.friend.subscribe()
    }

    /// Send text to the peer. Blank text and sends while disconnected are ignored.
    pub fn send(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.manager.send(&Request::SendMessage {
            to_user_id: self.peer,
            message: text.to_string(),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.mount.is_attached()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}
