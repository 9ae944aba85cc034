//! Tool server endpoint addresses.

use super::error::ConnectionError;
use std::fmt;

/// Where a tool server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port` or bare `host:port`
    Tcp { host: String, port: u16 },
    /// `stdio:<program> [args...]`, spawned as a child process
    Stdio { program: String, args: Vec<String> },
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ConnectionError> {
        let raw = raw.trim();
        let invalid = |reason: &str| ConnectionError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        if let Some(command) = raw.strip_prefix("stdio:") {
            let mut parts = command.split_whitespace().map(str::to_string);
            let program = parts.next().ok_or_else(|| invalid("missing command"))?;
            return Ok(Endpoint::Stdio {
                program,
                args: parts.collect(),
            });
        }

        let address = match raw.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme '{}'", scheme))),
            None => raw,
        };
        let address = address.trim_end_matches('/');

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid(&format!("invalid port '{}'", port)))?;

        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::Stdio { program, args } if args.is_empty() => write!(f, "stdio:{}", program),
            Endpoint::Stdio { program, args } => {
                write!(f, "stdio:{} {}", program, args.join(" "))
            }
        }
    }
}
