//! Classification of incoming JSON-RPC frames.
//!
//! The session's background reader calls [`classify_message`] once per
//! frame to decide where it goes:
//!
//! - `Response` → the oneshot of the matching pending request
//! - `IncomingRequest` → answered by the session (server-initiated `ping`)
//! - `Notification` → forwarded to the connection task (e.g. tool list changes)

/// Classification of an incoming JSON-RPC message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response { id: u64 },
    /// A request from the server (has `id` + `method`).
    IncomingRequest { id: serde_json::Value },
    /// A notification (has `method`, no `id`).
    Notification,
    /// Neither a usable `id` nor a `method`.
    Invalid,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let id = json.get("id").filter(|v| !v.is_null());
    let has_method = json.get("method").and_then(|v| v.as_str()).is_some();

    match (id, has_method) {
        (Some(id), true) => MessageKind::IncomingRequest { id: id.clone() },
        (Some(id), false) => match id.as_u64() {
            Some(id) => MessageKind::Response { id },
            None => MessageKind::Invalid,
        },
        (None, true) => MessageKind::Notification,
        (None, false) => MessageKind::Invalid,
    }
}
