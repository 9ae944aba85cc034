//! Tool-invocation protocol
//!
//! Tool servers speak JSON-RPC 2.0 framed with `Content-Length` headers, the
//! same framing used by language servers:
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":7,"method":"ping","params":{}}
//! ```
//!
//! - [`messages`] — request/response/notification types and method payloads
//! - [`framing`] — reading and writing framed bodies
//! - [`transport`] — classifying incoming frames

pub mod framing;
pub mod messages;
pub mod transport;
