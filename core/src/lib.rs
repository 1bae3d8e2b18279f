/// ChatSync - client-side synchronization for a one-to-one chat service
///
/// One WebSocket connection per signed-in user, shared by independent
/// subscriptions (conversation list, single chat, user directory, contact
/// submission, keepalive) that attach to it, follow it across identity
/// changes and detach on unmount.

pub mod app;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod net;
pub mod sync;
pub mod utils;
pub mod validation;
pub mod views;

pub use config::Config;
pub use error::{ChatError, Result};
pub use identity::{IdentityStore, Session};
pub use net::{ConnectionManager, ConnectionStatus};
