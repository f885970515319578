//! Admin console client
//!
//! One `AdminConnection` owns one socket to a server's administrative
//! endpoint. Commands are single logical lines; responses are framed YAML
//! documents (see [`crate::response`]). The connection can silently
//! re-establish itself when the peer has gone away between commands.

use std::io::{self, Read, Write};

use serde_yaml::Value;
use tracing::debug;

use tarantest_core::{Endpoint, Error, Result};

use crate::response;
use crate::transport::Transport;

/// Size of the banner the server sends on connect. It is discarded; it is
/// not part of any response.
const GREETING_SIZE: usize = 128;

/// Read chunk size for response accumulation.
const READ_CHUNK: usize = 4096;

/// Client for the line-oriented administrative console.
///
/// Created disconnected; [`connect`](Self::connect) establishes the
/// transport. Dropping the connection releases it.
#[derive(Debug)]
pub struct AdminConnection {
    endpoint: Endpoint,
    stream: Option<Transport>,
}

impl AdminConnection {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stream: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Establish the transport and discard the greeting banner.
    pub fn connect(&mut self) -> Result<()> {
        let mut stream = Transport::connect(&self.endpoint).map_err(Error::Connection)?;

        let mut buf = [0u8; GREETING_SIZE];
        let mut remaining = GREETING_SIZE;
        while remaining > 0 {
            let n = stream.read(&mut buf[..remaining]).map_err(Error::Connection)?;
            if n == 0 {
                return Err(Error::Connection(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection during the greeting",
                )));
            }
            remaining -= n;
        }

        debug!("connected to admin endpoint {}", self.endpoint);
        self.stream = Some(stream);
        Ok(())
    }

    /// Release the transport. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("disconnected from admin endpoint {}", self.endpoint);
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    /// Reconnect only if the peer has gone away.
    ///
    /// A probe read distinguishes a dead socket (zero-length read) from a
    /// live one with no pending data (`WouldBlock`). A live connection is
    /// left completely untouched; a dead or errored one is re-established.
    pub fn reconnect_if_dead(&mut self) -> Result<()> {
        let Some(stream) = &self.stream else {
            return self.connect();
        };

        match stream.probe() {
            Ok(0) => {
                debug!("admin connection to {} is dead, reconnecting", self.endpoint);
                self.reconnect()
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                debug!("probe of {} failed ({}), reconnecting", self.endpoint, e);
                self.reconnect()
            }
        }
    }

    /// Execute one command, re-establishing a dead connection first.
    ///
    /// An empty command returns `Ok(None)` without touching the socket.
    pub fn execute(&mut self, command: &str) -> Result<Option<Value>> {
        if command.is_empty() {
            return Ok(None);
        }
        self.reconnect_if_dead()?;
        self.execute_raw(command).map(Some)
    }

    /// Send one command and read its framed response, without any liveness
    /// handling.
    ///
    /// Embedded newlines are collapsed to spaces: admin commands are single
    /// logical lines. The response is accumulated until it carries the
    /// document terminator, then decoded. A partially sent command is never
    /// retried here.
    pub fn execute_raw(&mut self, command: &str) -> Result<Value> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::Connection(io::Error::new(io::ErrorKind::NotConnected, "not connected"))
        })?;

        let mut line = command.replace('\n', " ");
        line.push('\n');
        stream.write_all(line.as_bytes()).map_err(Error::Connection)?;

        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = stream.read(&mut chunk).map_err(Error::Connection)?;
            if n == 0 {
                return Err(Error::Protocol(
                    "response stream closed before the document terminator".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk[..n]);
            if response::has_terminator(&buffer) {
                break;
            }
        }

        response::decode(&buffer)
    }

    /// Run `f` on a freshly connected client, disconnecting on every exit
    /// path.
    pub fn session<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.connect()?;
        let result = f(self);
        self.disconnect();
        result
    }
}

impl Drop for AdminConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
