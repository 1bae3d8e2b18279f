/// New contact submission
use crate::error::Result;
use crate::models::ContactDraft;
use crate::net::connection::ConnectionManager;
use crate::net::protocol::{Inbound, InboundKind, Request};
use crate::sync::Mount;
use crate::utils::event_bus::Handler;
use crate::validation;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Outcome of the most recent contact result the server pushed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    /// Nothing submitted yet
    #[default]
    None,
    /// Sent, waiting for `new_contact_response_text`
    Pending,
    Success(String),
    Failure(String),
}

impl SubmissionState {
    pub fn message(&self) -> Option<&str> {
        match self {
            SubmissionState::Success(m) | SubmissionState::Failure(m) => Some(m),
            _ => None,
        }
    }
}

/// Submits contacts and tracks the server's verdict.
///
/// Results carry no request id, so with two submissions in flight the
/// state shows whichever result arrives last.
pub struct NewContactSync {
    state: Arc<watch::Sender<SubmissionState>>,
    manager: ConnectionManager,
    mount: Mount,
}

impl NewContactSync {
    pub fn mount(manager: &ConnectionManager) -> Self {
        let (tx, _) = watch::channel(SubmissionState::None);
        let state = Arc::new(tx);

        let handler: Handler = {
            let state = state.clone();
            Arc::new(move |inbound: &Inbound| {
                if let Inbound::NewContactResult(result) = inbound {
                    info!(
                        "Contact result: {} ({})",
                        result.message, result.response_status
                    );
                    let next = if result.response_status {
                        SubmissionState::Success(result.message.clone())
                    } else {
                        SubmissionState::Failure(result.message.clone())
                    };
                    state.send_replace(next);
                }
            })
        };

        let mount = Mount::new(manager, &[InboundKind::NewContactResult], handler, |_| {});

        Self {
            state,
            manager: manager.clone(),
            mount,
        }
    }

    /// Validate and send one `save_new_contact`.
    ///
    /// Invalid drafts are rejected before anything is sent and leave the
    /// state untouched. `Ok(false)` means the connection was not open and
    /// nothing was sent.
    pub fn submit(&self, draft: ContactDraft) -> Result<bool> {
        validation::validate_contact(&draft)?;

        let sent = self.manager.send(&Request::SaveNewContact { user: draft });
        if sent {
            self.state.send_replace(SubmissionState::Pending);
        } else {
            debug!("Contact not submitted, connection is not open");
        }
        Ok(sent)
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    pub fn is_attached(&self) -> bool {
        self.mount.is_attached()
    }

    pub fn unmount(mut self) {
        self.mount.unmount();
    }
}
