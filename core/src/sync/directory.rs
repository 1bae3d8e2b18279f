/// User directory subscription
use crate::models::User;
use crate::net::connection::ConnectionManager;
use crate::net::protocol::{Inbound, InboundKind, Request};
use crate::sync::Mount;
use crate::utils::event_bus::Handler;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// All known users, replaced wholesale by every `get_all_users` snapshot
pub struct DirectorySync {
    users: Arc<watch::Sender<Vec<User>>>,
    manager: ConnectionManager,
    mount: Mount,
}

impl DirectorySync {
    pub fn mount(manager: &ConnectionManager) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        let users = Arc::new(tx);

        let handler: Handler = {
            let users = users.clone();
            Arc::new(move |inbound: &Inbound| {
                if let Inbound::AllUsers(list) = inbound {
                    debug!("Directory snapshot with {} users", list.len());
                    users.send_replace(list.clone());
                }
            })
        };

        let mount = Mount::new(manager, &[InboundKind::AllUsers], handler, |conn| {
            conn.send(&Request::GetAllUsers);
        });

        Self {
            users,
            manager: manager.clone(),
            mount,
        }
    }

    pub fn users(&self) -> Vec<User> {
        self.users.borrow().clone()
    }

    /// Case-insensitive match on name or contact number
    pub fn search(&self, query: &str) -> Vec<User> {
        let query = query.trim().to_lowercase();
        self.users
            .borrow()
            .iter()
            .filter(|u| {
                query.is_empty()
                    || u.display_name().to_lowercase().contains(&query)
                    || u.contact_no.contains(&query)
            })
            .cloned()
            .collect()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<User>> {
        self.users.subscribe()
    }

    pub fn refresh(&self) -> bool {
        self.manager.send(&Request::GetAllUsers)
    }

    pub fn is_attached(&self) -> bool {
        self.mount.is_attached()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}
