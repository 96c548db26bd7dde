// Upstream Connector
// TCP (development/bridging setups) or a local Unix-domain channel (production),
// chosen once from configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpStream, UnixStream};
use tokio::time::{timeout, Duration};

/// Well-known name of the upstream service's local channel
pub const DEFAULT_UNIX_NAME: &str = "knot";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// TARGET
// ============================================================================

/// Where upstream connections go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpstreamTarget {
    /// TCP stream to host:port
    Tcp { host: String, port: u16 },
    /// Unix-domain stream; names starting with `/` or `.` are filesystem
    /// paths, anything else (optionally prefixed with `@`) is an abstract name
    Unix { name: String },
}

impl Default for UpstreamTarget {
    fn default() -> Self {
        Self::Unix {
            name: DEFAULT_UNIX_NAME.to_string(),
        }
    }
}

impl UpstreamTarget {
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::Tcp {
            host: host.to_string(),
            port,
        }
    }

    pub fn unix(name: &str) -> Self {
        Self::Unix {
            name: name.to_string(),
        }
    }

    /// Check if a Unix name refers to the abstract namespace
    fn is_abstract(name: &str) -> bool {
        !(name.starts_with('/') || name.starts_with('.'))
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Self::Unix { name } if Self::is_abstract(name) => {
                write!(f, "unix:@{}", name.trim_start_matches('@'))
            }
            Self::Unix { name } => write!(f, "unix:{}", name),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors opening or using an upstream connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("Cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("connect({target}): {reason}")]
    Connect { target: String, reason: String },

    #[error("Connection to {0} timed out")]
    Timeout(String),

    #[error("Unsupported upstream target: {0}")]
    Unsupported(String),
}

// ============================================================================
// LINK
// ============================================================================

/// Non-blocking byte stream to the upstream service
///
/// Dropping the link closes it.
pub trait UpstreamLink {
    /// Read whatever is available; `Ok(0)` means the peer closed the stream
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much as the socket accepts right now
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Upstream stream opened by [`UpstreamConnector`]
#[derive(Debug)]
pub enum UpstreamStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl UpstreamLink for UpstreamStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.try_read(buf),
            Self::Unix(s) => s.try_read(buf),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.try_write(data),
            Self::Unix(s) => s.try_write(data),
        }
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Opens upstream links on demand
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Link: UpstreamLink + 'static;

    /// Open a new link to the upstream service
    async fn connect(&self) -> Result<Self::Link, UpstreamError>;

    /// Describe where links go, for logging
    fn describe(&self) -> String;
}

/// Connector for the statically configured target
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    target: UpstreamTarget,
    resolved: Option<SocketAddr>,
    connect_timeout: Duration,
}

impl UpstreamConnector {
    /// Build a connector, resolving a TCP host once up front
    pub async fn resolve(target: UpstreamTarget) -> Result<Self, UpstreamError> {
        let resolved = match &target {
            UpstreamTarget::Tcp { host, port } => {
                let mut addrs = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| UpstreamError::Resolve {
                        host: host.clone(),
                        reason: e.to_string(),
                    })?;
                let addr = addrs.next().ok_or_else(|| UpstreamError::Resolve {
                    host: host.clone(),
                    reason: "no addresses".to_string(),
                })?;
                Some(addr)
            }
            UpstreamTarget::Unix { .. } => None,
        };

        Ok(Self {
            target,
            resolved,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Get the configured target
    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    fn connect_error(&self, e: io::Error) -> UpstreamError {
        UpstreamError::Connect {
            target: self.target.to_string(),
            reason: e.to_string(),
        }
    }

    async fn connect_tcp(&self, addr: SocketAddr) -> Result<UpstreamStream, UpstreamError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| UpstreamError::Timeout(self.target.to_string()))?
            .map_err(|e| self.connect_error(e))?;

        stream.set_nodelay(true).map_err(|e| self.connect_error(e))?;
        Ok(UpstreamStream::Tcp(stream))
    }

    async fn connect_unix(&self, name: &str) -> Result<UpstreamStream, UpstreamError> {
        if !UpstreamTarget::is_abstract(name) {
            let stream = timeout(self.connect_timeout, UnixStream::connect(name))
                .await
                .map_err(|_| UpstreamError::Timeout(self.target.to_string()))?
                .map_err(|e| self.connect_error(e))?;
            return Ok(UpstreamStream::Unix(stream));
        }

        let std_stream = connect_abstract(name.trim_start_matches('@')).map_err(|e| {
            if e.kind() == io::ErrorKind::Unsupported {
                UpstreamError::Unsupported(self.target.to_string())
            } else {
                self.connect_error(e)
            }
        })?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| self.connect_error(e))?;
        let stream = UnixStream::from_std(std_stream).map_err(|e| self.connect_error(e))?;
        Ok(UpstreamStream::Unix(stream))
    }
}

impl Connector for UpstreamConnector {
    type Link = UpstreamStream;

    async fn connect(&self) -> Result<UpstreamStream, UpstreamError> {
        match (&self.target, self.resolved) {
            (UpstreamTarget::Tcp { .. }, Some(addr)) => self.connect_tcp(addr).await,
            (UpstreamTarget::Tcp { host, .. }, None) => Err(UpstreamError::Resolve {
                host: host.clone(),
                reason: "not resolved".to_string(),
            }),
            (UpstreamTarget::Unix { name }, _) => self.connect_unix(name).await,
        }
    }

    fn describe(&self) -> String {
        self.target.to_string()
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr as UnixAddr, UnixStream as StdUnixStream};

    let addr = UnixAddr::from_abstract_name(name.as_bytes())?;
    StdUnixStream::connect_addr(&addr)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract unix sockets require Linux",
    ))
}
