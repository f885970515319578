//! Blocking transport over either TCP or a unix-domain socket.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

use tarantest_core::Endpoint;

#[derive(Debug)]
pub(crate) enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Transport {
    pub(crate) fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                // Admin commands are tiny; don't let Nagle delay them.
                stream.set_nodelay(true)?;
                Ok(Transport::Tcp(stream))
            }
            Endpoint::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
        }
    }

    /// Non-blocking, non-consuming one-byte peek.
    ///
    /// Distinguishes the three liveness states without consuming any
    /// application bytes: `Ok(0)` means the peer has closed, `Ok(1)` means
    /// the socket is alive with data queued, and `ErrorKind::WouldBlock`
    /// means the socket is alive with nothing queued.
    pub(crate) fn probe(&self) -> io::Result<usize> {
        let mut buf = [0u8; 1];
        self.set_nonblocking(true)?;
        let result = self.peek(&mut buf);
        self.set_nonblocking(false)?;
        result
    }

    fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.peek(buf),
            Transport::Unix(stream) => stream.peek(buf),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.set_nonblocking(nonblocking),
            Transport::Unix(stream) => stream.set_nonblocking(nonblocking),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            Transport::Unix(stream) => stream.flush(),
        }
    }
}
