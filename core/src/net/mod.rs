/// Networking: wire protocol, socket transport and the shared connection
pub mod connection;
pub mod protocol;
pub mod transport;

pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStatus};
pub use protocol::{Inbound, InboundKind, Request};
pub use transport::{Connector, Transport, WsConnector};
