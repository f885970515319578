//! Endpoint allocation
//!
//! TCP ports are found by active probing: a candidate is free when a client
//! connection to it is refused. Slow, but it needs no privileged view of
//! the OS port table, and allocation is never on a hot path. The window
//! between probe and the server's own bind is accepted for test-time use.

use std::net::TcpStream;

use camino::Utf8PathBuf;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::debug;

use tarantest_core::config::PortConfig;
use tarantest_core::{Error, Result};

/// Find a free TCP port, scanning upward from `preferred` (or from a random
/// point in the configured range). On reaching the top of the range the
/// scan wraps to the bottom once; a second exhausted pass fails. A port in
/// `exclude` is never returned even when it probes free, so a caller can
/// reserve a port it has allocated but not yet bound.
pub fn allocate(preferred: Option<u16>, exclude: Option<u16>, config: &PortConfig) -> Result<u16> {
    let start = preferred
        .unwrap_or_else(|| rand::rng().random_range(config.range_start..config.range_end));

    if let Some(port) = scan(start, config.range_end, exclude) {
        debug!("allocated port {}", port);
        return Ok(port);
    }
    if let Some(port) = scan(config.range_start, config.range_end, exclude) {
        debug!("allocated port {} after wrap-around", port);
        return Ok(port);
    }
    Err(Error::PortExhausted {
        start: config.range_start,
        end: config.range_end,
    })
}

fn scan(from: u16, to: u16, exclude: Option<u16>) -> Option<u16> {
    (from..to).find(|&port| Some(port) != exclude && !in_use(port))
}

fn in_use(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).is_ok()
}

/// Generate a unix-domain socket path under the configured directory.
/// Collisions across the random suffix are accepted as negligible and not
/// checked.
pub fn socket_path(config: &PortConfig) -> Utf8PathBuf {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    config.socket_dir.join(format!("listen_{}.sock", suffix))
}
