//! Server endpoint addressing
//!
//! A managed server exposes two endpoints: the administrative console and
//! the primary data port. Each is either a local TCP port or a filesystem
//! socket path, chosen once when the server handle is created.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Whether the primary endpoint listens on TCP or on a unix-domain socket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    #[default]
    Tcp,
    Unix,
}

/// Address of one server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(Utf8PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }

    /// TCP port, if this endpoint is addressed by port.
    pub fn port(&self) -> Option<u16> {
        match self {
            Endpoint::Tcp { port, .. } => Some(*port),
            Endpoint::Unix(_) => None,
        }
    }

    /// Filesystem socket path, if this endpoint is addressed by path.
    pub fn socket_path(&self) -> Option<&Utf8Path> {
        match self {
            Endpoint::Tcp { .. } => None,
            Endpoint::Unix(path) => Some(path),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "{}", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_endpoint_accessors() {
        let ep = Endpoint::tcp("127.0.0.1", 3301);
        assert_eq!(ep.port(), Some(3301));
        assert_eq!(ep.socket_path(), None);
        assert_eq!(ep.to_string(), "127.0.0.1:3301");
    }

    #[test]
    fn test_unix_endpoint_accessors() {
        let ep = Endpoint::unix("/tmp/listen_AB12CD.sock");
        assert_eq!(ep.port(), None);
        assert_eq!(
            ep.socket_path().map(|p| p.as_str()),
            Some("/tmp/listen_AB12CD.sock")
        );
        assert_eq!(ep.to_string(), "/tmp/listen_AB12CD.sock");
    }
}
