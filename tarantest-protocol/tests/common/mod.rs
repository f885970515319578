//! TCP-level test harness for admin protocol tests.
//!
//! Provides `FakeAdminServer`: binds to port 0, sends the fixed-size
//! greeting banner on accept, then answers line commands through a
//! caller-supplied responder.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tarantest_core::Endpoint;

/// What the fake server does after reading one command line.
pub enum Reply {
    /// Write the payload and keep serving.
    Send(String),
    /// Write the payload, then close the connection.
    SendAndClose(String),
    /// Close the connection without writing.
    Close,
}

/// A fake admin console bound to a random OS-assigned port.
pub struct FakeAdminServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
}

impl FakeAdminServer {
    /// Start a server that answers every command via `responder`.
    pub fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        Self::spawn(false, responder)
    }

    /// Start a server that reports the given status for any command.
    pub fn start_status(status: &str) -> Self {
        let reply = yaml_status(status);
        Self::start(move |_| Reply::Send(reply.clone()))
    }

    /// Start a server that hangs up right after the greeting banner.
    pub fn start_greeting_only() -> Self {
        Self::spawn(true, |_| Reply::Close)
    }

    fn spawn<F>(close_after_greeting: bool, responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let responder = Arc::new(responder);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let responder = Arc::clone(&responder);
                thread::spawn(move || {
                    let _ = serve_connection(stream, close_after_greeting, &*responder);
                });
            }
        });

        Self { port, accepted }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::tcp("127.0.0.1", self.port)
    }

    /// How many connections the server has accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve_connection(
    mut stream: TcpStream,
    close_after_greeting: bool,
    responder: &dyn Fn(&str) -> Reply,
) -> io::Result<()> {
    stream.write_all(&greeting())?;
    if close_after_greeting {
        return Ok(());
    }

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches('\n');
        match responder(command) {
            Reply::Send(payload) => stream.write_all(payload.as_bytes())?,
            Reply::SendAndClose(payload) => {
                stream.write_all(payload.as_bytes())?;
                return Ok(());
            }
            Reply::Close => return Ok(()),
        }
    }
}

/// The 128-byte banner a real server sends on connect.
pub fn greeting() -> [u8; 128] {
    let mut banner = [b' '; 128];
    let text = b"Tarantool 2.11.0 (Lua console)";
    banner[..text.len()].copy_from_slice(text);
    banner[127] = b'\n';
    banner
}

/// A status response as the server formats it.
pub fn yaml_status(status: &str) -> String {
    format!("---\n- {}\n...\n", status)
}
