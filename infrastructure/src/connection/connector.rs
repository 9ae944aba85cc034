//! Opening raw byte streams to tool servers.

use super::endpoint::Endpoint;
use super::error::{ConnectionError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::debug;

/// A connected byte stream, split into halves.
pub struct Transport {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Child process backing a `stdio:` endpoint; killed when dropped.
    pub child: Option<Child>,
}

impl Transport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }
}

/// Opens transports. Connections call this once per handshake attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Transport>;
}

/// TCP sockets and child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Transport> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                debug!(host = %host, port, "Opening TCP connection");
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok(Transport::new(reader, writer))
            }
            Endpoint::Stdio { program, args } => {
                debug!(program = %program, ?args, "Spawning tool server process");
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|source| ConnectionError::Spawn {
                        command: program.clone(),
                        source,
                    })?;

                let stdin = child.stdin.take().ok_or_else(|| {
                    ConnectionError::Protocol("child stdin unavailable".to_string())
                })?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    ConnectionError::Protocol("child stdout unavailable".to_string())
                })?;

                Ok(Transport {
                    child: Some(child),
                    ..Transport::new(stdout, stdin)
                })
            }
        }
    }
}
