//! Tool server connection — one long-lived task per configured server.
//!
//! # Lifecycle
//!
//! ```text
//!            start()
//! Disconnected ──▶ Connecting ──handshake + discovery──▶ Ready ──publish──▶ serve
//!                     ▲   │                                │
//!                     │   └─ failure ─▶ Degraded ◀─────────┘ keep-alive lost /
//!                     │                    │                 session closed
//!                     └──── backoff ───────┘   (unpublish before Degraded)
//!
//!   N failed handshakes ─▶ Degraded until reenable()
//!   stop() ─▶ unpublish ─▶ drain in-flight (grace) ─▶ Closed
//! ```
//!
//! The task owns its session; request tasks only ever see it through
//! [`ToolServerConnection::invoke`], which fails fast unless the connection is
//! `Ready`. Readiness is published through a `watch` channel.

use super::connector::Connector;
use super::endpoint::Endpoint;
use super::error::{ConnectionError, Result};
use super::session::RpcSession;
use crate::protocol::messages::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, ToolListResult,
    methods, parse_call_result,
};
use crate::retry::RetryPolicy;
use concierge_application::CapabilityRegistry;
use concierge_domain::{Capability, ConnectionState, ServerDescriptor, ToolError, ToolErrorKind};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on `tools/list` pages followed during one discovery.
const MAX_DISCOVERY_PAGES: usize = 64;

/// Keep-alive and reconnection policy for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    /// Bound on connect + initialize + discovery.
    pub handshake_timeout: Duration,
    /// Consecutive failed handshakes before giving up until re-enabled.
    pub max_handshake_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// How long `stop` waits for in-flight invocations.
    pub shutdown_grace: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(15),
            keepalive_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            max_handshake_attempts: 5,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ConnectionSettings {
    fn backoff(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_handshake_attempts,
            self.backoff_initial,
            self.backoff_max,
        )
    }
}

/// Why `serve` returned.
enum ServeExit {
    Stopped,
    Lost(String),
}

pub struct ToolServerConnection {
    descriptor: ServerDescriptor,
    endpoint: Endpoint,
    settings: ConnectionSettings,
    registry: Arc<CapabilityRegistry>,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    session: std::sync::RwLock<Option<Arc<RpcSession>>>,
    in_flight: AtomicUsize,
    idle: Notify,
    reenable: Notify,
    /// Consecutive failed handshakes; reset once `Ready`.
    attempts: AtomicU32,
    exhausted: AtomicBool,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ToolServerConnection {
    /// `parent` cancels this connection together with its siblings.
    pub fn new(
        descriptor: ServerDescriptor,
        settings: ConnectionSettings,
        registry: Arc<CapabilityRegistry>,
        connector: Arc<dyn Connector>,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>> {
        let endpoint = Endpoint::parse(&descriptor.endpoint)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Arc::new(Self {
            descriptor,
            endpoint,
            settings,
            registry,
            connector,
            state,
            session: std::sync::RwLock::new(None),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            reenable: Notify::new(),
            attempts: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
            cancel: parent.child_token(),
            task: std::sync::Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn handshake_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Begin connecting in the background. Returns immediately.
    pub fn start(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(Arc::clone(self).run());
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Signal cooperative shutdown and wait until `Closed`.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if self.task_handle_present() {
            self.wait_closed().await;
        } else {
            self.set_state(ConnectionState::Closed);
        }
    }

    pub(crate) async fn wait_closed(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Wake a connection that gave up after exhausting its handshake attempts.
    ///
    /// Returns `false` if the connection was not waiting to be re-enabled.
    pub fn reenable(&self) -> bool {
        if self.exhausted.load(Ordering::SeqCst) {
            info!(server = %self.name(), "Re-enabling connection");
            self.reenable.notify_one();
            true
        } else {
            false
        }
    }

    /// Whether the lifecycle task ended without being asked to stop.
    pub(crate) fn task_died(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| h.is_finished())
    }

    /// Restart after the lifecycle task died.
    pub(crate) fn restart(self: &Arc<Self>) {
        self.registry.unpublish(self.name());
        self.drop_session();
        self.set_state(ConnectionState::Degraded);
        self.start();
    }

    /// Tear down without waiting for the task (used after a shutdown timeout).
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.registry.unpublish(self.name());
        self.drop_session();
        self.set_state(ConnectionState::Closed);
    }

    /// Forward one call over the live session.
    pub async fn invoke(
        &self,
        capability: &Capability,
        arguments: &Value,
    ) -> std::result::Result<Value, ToolError> {
        let state = self.state();
        if self.cancel.is_cancelled() || !state.is_ready() {
            return Err(ToolError::new(
                ToolErrorKind::NotAvailable,
                format!(
                    "tool not available: {} (server is {})",
                    capability.qualified_name, state
                ),
            ));
        }
        let Some(session) = self.current_session() else {
            return Err(ToolError::not_available(&capability.qualified_name));
        };

        let _in_flight = InFlight::enter(self);
        let params = serde_json::to_value(CallToolParams {
            capability_name: &capability.tool_name,
            arguments,
        })
        .map_err(|e| ToolError::validation(format!("unserializable arguments: {}", e)))?;

        match session.request(methods::TOOLS_CALL, Some(params)).await {
            Ok(result) => parse_call_result(result),
            Err(ConnectionError::Rpc { code, message }) => {
                Err(ToolError::remote(code.to_string(), message))
            }
            Err(e) => Err(ToolError::transient(format!(
                "session to {} failed: {}",
                self.name(),
                e
            ))),
        }
    }

    // ==================== Lifecycle task ====================

    async fn run(self: Arc<Self>) {
        let backoff = self.settings.backoff();

        while !self.cancel.is_cancelled() {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(server = %self.name(), endpoint = %self.endpoint, attempt, "Connecting");

            let handshake = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(self.settings.handshake_timeout, self.establish()) => {
                    result.unwrap_or(Err(ConnectionError::Timeout))
                }
            };

            match handshake {
                Ok((session, notifications, capabilities)) => {
                    self.attempts.store(0, Ordering::SeqCst);
                    *self.session.write().unwrap_or_else(|e| e.into_inner()) =
                        Some(Arc::clone(&session));
                    self.publish(capabilities);
                    self.set_state(ConnectionState::Ready);

                    let exit = self.serve(&session, notifications).await;
                    match exit {
                        ServeExit::Stopped => break,
                        ServeExit::Lost(reason) => {
                            warn!(server = %self.name(), reason = %reason, "Connection lost");
                            self.registry.unpublish(self.name());
                            self.set_state(ConnectionState::Degraded);
                            self.drop_session();
                        }
                    }
                }
                Err(e) => {
                    warn!(server = %self.name(), attempt, error = %e, "Handshake failed");
                    self.set_state(ConnectionState::Degraded);
                }
            }

            let failures = self.attempts.load(Ordering::SeqCst);
            if failures >= self.settings.max_handshake_attempts {
                error!(
                    server = %self.name(),
                    attempts = failures,
                    "Giving up on tool server until re-enabled"
                );
                self.exhausted.store(true, Ordering::SeqCst);
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.reenable.notified() => {}
                }
                self.exhausted.store(false, Ordering::SeqCst);
                self.attempts.store(0, Ordering::SeqCst);
            } else {
                let delay = backoff.delay_for_attempt(failures.saturating_sub(1));
                debug!(server = %self.name(), delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            self.set_state(ConnectionState::Connecting);
        }

        self.shutdown().await;
    }

    /// Connect, initialize and discover.
    async fn establish(
        &self,
    ) -> Result<(
        Arc<RpcSession>,
        mpsc::UnboundedReceiver<JsonRpcNotification>,
        Vec<Capability>,
    )> {
        let transport = self.connector.connect(&self.endpoint).await?;
        let (session, notifications) = RpcSession::start(transport);

        let params = serde_json::to_value(InitializeParams::default())?;
        let result = session.request(methods::INITIALIZE, Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result).unwrap_or_default();
        debug!(
            server = %self.name(),
            protocol = ?init.protocol_version,
            remote = ?init.server_info.as_ref().map(|i| i.name.as_str()),
            "Initialized"
        );
        session.notify(methods::INITIALIZED, None).await?;

        let capabilities = self.discover(&session).await?;
        Ok((session, notifications, capabilities))
    }

    /// Follow `tools/list` pages until exhausted.
    async fn discover(&self, session: &RpcSession) -> Result<Vec<Capability>> {
        let mut capabilities = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let result = session.request(methods::TOOLS_LIST, params).await?;
            let page: ToolListResult = serde_json::from_value(result)?;
            capabilities.extend(
                page.tools
                    .into_iter()
                    .map(|tool| tool.into_capability(self.name())),
            );
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(capabilities),
            }
        }
        Err(ConnectionError::Protocol(format!(
            "tools/list did not finish within {} pages",
            MAX_DISCOVERY_PAGES
        )))
    }

    fn publish(&self, capabilities: Vec<Capability>) {
        let discovered = capabilities.len();
        let report = self.registry.publish(self.name(), capabilities);
        info!(
            server = %self.name(),
            discovered,
            published = report.accepted,
            rejected = report.rejected.len(),
            "Published capabilities"
        );
    }

    /// Keep-alive and notifications while `Ready`.
    async fn serve(
        &self,
        session: &Arc<RpcSession>,
        mut notifications: mpsc::UnboundedReceiver<JsonRpcNotification>,
    ) -> ServeExit {
        let mut keepalive = tokio::time::interval(self.settings.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return ServeExit::Stopped,
                _ = session.closed() => return ServeExit::Lost("session closed".to_string()),
                _ = keepalive.tick() => {
                    let ping = session.request(methods::PING, None);
                    match tokio::time::timeout(self.settings.keepalive_timeout, ping).await {
                        Ok(Ok(_)) => trace!(server = %self.name(), "Keep-alive ok"),
                        // Any answer proves liveness
                        Ok(Err(ConnectionError::Rpc { .. })) => {}
                        Ok(Err(e)) => return ServeExit::Lost(format!("keep-alive failed: {}", e)),
                        Err(_) => return ServeExit::Lost("keep-alive timed out".to_string()),
                    }
                }
                notification = notifications.recv() => match notification {
                    Some(n) if n.method == methods::TOOLS_LIST_CHANGED => {
                        info!(server = %self.name(), "Tool list changed, rediscovering");
                        let discovery = tokio::time::timeout(
                            self.settings.handshake_timeout,
                            self.discover(session),
                        )
                        .await
                        .unwrap_or(Err(ConnectionError::Timeout));
                        match discovery {
                            Ok(capabilities) => self.publish(capabilities),
                            Err(e) if e.is_fatal() => {
                                return ServeExit::Lost(format!("rediscovery failed: {}", e));
                            }
                            Err(e) => warn!(
                                server = %self.name(),
                                error = %e,
                                "Rediscovery failed, keeping previous capabilities"
                            ),
                        }
                    }
                    Some(n) => trace!(server = %self.name(), method = %n.method, "Ignoring notification"),
                    None => return ServeExit::Lost("session closed".to_string()),
                },
            }
        }
    }

    /// Unpublish, drain in-flight calls within the grace period, close.
    async fn shutdown(&self) {
        self.registry.unpublish(self.name());

        let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
            loop {
                let idle = self.idle.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                idle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                server = %self.name(),
                abandoned = self.in_flight.load(Ordering::SeqCst),
                "Abandoning in-flight invocations"
            );
        }

        self.drop_session();
        self.set_state(ConnectionState::Closed);
        info!(server = %self.name(), "Connection closed");
    }

    // ==================== Helpers ====================

    fn set_state(&self, next: ConnectionState) {
        let name = self.name();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            match current.transition(next) {
                Ok(state) => {
                    debug!(server = %name, from = %current, to = %state, "State change");
                    *current = state;
                    true
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "Ignoring illegal state change");
                    false
                }
            }
        });
    }

    fn current_session(&self) -> Option<Arc<RpcSession>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn drop_session(&self) {
        let session = self
            .session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = session {
            session.close();
        }
    }

    fn task_handle_present(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Counts an invocation as in flight until dropped.
struct InFlight<'a> {
    connection: &'a ToolServerConnection,
}

impl<'a> InFlight<'a> {
    fn enter(connection: &'a ToolServerConnection) -> Self {
        connection.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { connection }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.connection.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.connection.idle.notify_waiters();
        }
    }
}
