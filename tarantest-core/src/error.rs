use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no free port in range {start}..{end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("can't find server executable `{0}` on the search path")]
    ExecutableNotFound(String),

    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected server status: {0}")]
    UnexpectedStatus(String),

    #[error("server did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the one transient failure the readiness poller absorbs:
    /// the server is not listening yet.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Error::Connection(e) if e.kind() == io::ErrorKind::ConnectionRefused)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
