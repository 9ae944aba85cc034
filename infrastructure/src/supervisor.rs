//! Connection supervisor — owns every [`ToolServerConnection`].
//!
//! Startup never waits for servers: [`ConnectionSupervisor::initialize`]
//! spawns one connection task per enabled descriptor and returns. Partial
//! availability is the normal operating mode, surfaced through
//! [`ToolAvailability`]. A watchdog restarts connection tasks that end
//! without being stopped.

use crate::connection::{ConnectionSettings, Connector, DefaultConnector, ToolServerConnection};
use async_trait::async_trait;
use concierge_application::{CapabilityRegistry, ToolAvailability, ToolInvoker};
use concierge_domain::{Capability, ConnectionState, ServerDescriptor, ToolError};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often the watchdog looks for dead connection tasks.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);

/// One row of [`ConnectionSupervisor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub endpoint: String,
    pub enabled: bool,
    pub state: ConnectionState,
    /// Capabilities currently in the registry for this server.
    pub capabilities: usize,
    /// Consecutive failed handshakes.
    pub handshake_attempts: u32,
}

pub struct ConnectionSupervisor {
    registry: Arc<CapabilityRegistry>,
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    connections: Arc<RwLock<Vec<Arc<ToolServerConnection>>>>,
    disabled: RwLock<Vec<ServerDescriptor>>,
    cancel: CancellationToken,
    watchdog: std::sync::Mutex<Option<JoinHandle<()>>>,
    watchdog_interval: Duration,
}

impl ConnectionSupervisor {
    pub fn new(registry: Arc<CapabilityRegistry>, settings: ConnectionSettings) -> Self {
        Self::with_connector(registry, settings, Arc::new(DefaultConnector))
    }

    pub fn with_connector(
        registry: Arc<CapabilityRegistry>,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            registry,
            connector,
            settings,
            connections: Arc::new(RwLock::new(Vec::new())),
            disabled: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
            watchdog: std::sync::Mutex::new(None),
            watchdog_interval: WATCHDOG_INTERVAL,
        }
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Start one connection per enabled descriptor. Does not wait for any of
    /// them to become `Ready`.
    ///
    /// Returns the number of connections started. Descriptors with an
    /// unusable endpoint or a duplicate name are logged and skipped.
    pub fn initialize(&self, descriptors: &[ServerDescriptor]) -> usize {
        let mut started = Vec::new();
        {
            let mut connections = self.write_connections();
            let mut disabled = self.disabled.write().unwrap_or_else(|e| e.into_inner());

            for descriptor in descriptors {
                let taken = connections.iter().any(|c| c.name() == descriptor.name)
                    || disabled.iter().any(|d| d.name == descriptor.name);
                if taken {
                    warn!(server = %descriptor.name, "Duplicate server name, skipping");
                    continue;
                }
                if !descriptor.enabled {
                    info!(server = %descriptor.name, "Server disabled, not connecting");
                    disabled.push(descriptor.clone());
                    continue;
                }

                match ToolServerConnection::new(
                    descriptor.clone(),
                    self.settings.clone(),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.connector),
                    &self.cancel,
                ) {
                    Ok(connection) => {
                        connections.push(Arc::clone(&connection));
                        started.push(connection);
                    }
                    Err(e) => {
                        error!(server = %descriptor.name, error = %e, "Cannot start connection");
                    }
                }
            }
        }

        for connection in &started {
            connection.start();
        }
        info!(count = started.len(), "Tool server connections started");
        self.spawn_watchdog();
        started.len()
    }

    pub fn connection(&self, name: &str) -> Option<Arc<ToolServerConnection>> {
        self.read_connections()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// One entry per configured server, in configuration order.
    pub fn status(&self) -> Vec<ServerStatus> {
        let counts = self.registry.stats();
        let mut rows: Vec<ServerStatus> = self
            .read_connections()
            .iter()
            .map(|c| ServerStatus {
                name: c.name().to_string(),
                endpoint: c.endpoint().to_string(),
                enabled: true,
                state: c.state(),
                capabilities: counts.get(c.name()).copied().unwrap_or(0),
                handshake_attempts: c.handshake_attempts(),
            })
            .collect();
        rows.extend(
            self.disabled
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|d| ServerStatus {
                    name: d.name.clone(),
                    endpoint: d.endpoint.clone(),
                    enabled: false,
                    state: ConnectionState::Disconnected,
                    capabilities: 0,
                    handshake_attempts: 0,
                }),
        );
        rows
    }

    /// Wake a server that gave up after exhausting its handshake attempts.
    pub fn reenable(&self, name: &str) -> bool {
        self.connection(name).is_some_and(|c| c.reenable())
    }

    /// Wait up to `timeout` for every started connection to reach `Ready`.
    ///
    /// Returns whether they all did. Callers never need this to make
    /// progress; it only lets one-shot callers give handshakes a head start.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let receivers: Vec<_> = self.read_connections().iter().map(|c| c.subscribe()).collect();
        let all = futures::future::join_all(receivers.into_iter().map(|mut rx| async move {
            rx.wait_for(|state| state.is_ready()).await.is_ok()
        }));
        match tokio::time::timeout(timeout, all).await {
            Ok(ready) => ready.into_iter().all(|r| r),
            Err(_) => false,
        }
    }

    /// Stop every connection and wait up to `timeout` for them to close.
    /// Stragglers are aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        info!("Shutting down tool server connections");
        self.cancel.cancel();
        if let Some(watchdog) = self
            .watchdog
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            watchdog.abort();
        }

        let connections: Vec<_> = self.read_connections().clone();
        let stops = futures::future::join_all(connections.iter().map(|c| c.stop()));
        if tokio::time::timeout(timeout, stops).await.is_err() {
            for connection in &connections {
                if connection.state() != ConnectionState::Closed {
                    warn!(server = %connection.name(), "Connection did not stop in time, aborting");
                    connection.abort();
                }
            }
        }
    }

    fn spawn_watchdog(&self) {
        let mut slot = self.watchdog.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let connections = Arc::clone(&self.connections);
        let cancel = self.cancel.clone();
        let interval = self.watchdog_interval;

        *slot = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {}
                }
                let dead: Vec<_> = connections
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .iter()
                    .filter(|c| c.task_died())
                    .cloned()
                    .collect();
                for connection in dead {
                    error!(server = %connection.name(), "Connection task died, restarting");
                    connection.restart();
                }
            }
        }));
    }

    fn read_connections(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<ToolServerConnection>>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_connections(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<ToolServerConnection>>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ToolAvailability for ConnectionSupervisor {
    fn server_state(&self, server: &str) -> Option<ConnectionState> {
        self.connection(server).map(|c| c.state())
    }

    fn any_ready(&self) -> bool {
        self.read_connections().iter().any(|c| c.state().is_ready())
    }

    fn all_ready(&self) -> bool {
        let connections = self.read_connections();
        !connections.is_empty() && connections.iter().all(|c| c.state().is_ready())
    }
}

#[async_trait]
impl ToolInvoker for ConnectionSupervisor {
    async fn invoke(&self, capability: &Capability, arguments: &Value) -> Result<Value, ToolError> {
        match self.connection(&capability.server) {
            Some(connection) => connection.invoke(capability, arguments).await,
            None => Err(ToolError::not_available(&capability.qualified_name)),
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
