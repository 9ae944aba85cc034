//! Tool server connections.
//!
//! - [`endpoint`] — `tcp://` and `stdio:` addresses
//! - [`connector`] — opening transports
//! - [`session`] — JSON-RPC request/response correlation on one transport
//! - [`lifecycle`] — the long-lived per-server task (handshake, discovery,
//!   keep-alive, reconnect, shutdown)

pub mod connector;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod session;

#[cfg(test)]
pub(crate) mod fake_server;

pub use connector::{Connector, DefaultConnector, Transport};
pub use endpoint::Endpoint;
pub use error::ConnectionError;
pub use lifecycle::{ConnectionSettings, ToolServerConnection};
pub use session::RpcSession;
