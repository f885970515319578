//! Server process lifecycle
//!
//! `TarantoolServer` owns exactly one spawned server: its working
//! directory, endpoint allocation, configuration environment, spawn,
//! readiness poll, stop, restart, and cleanup. `start()` does not return
//! until the server has acknowledged a ready status, so callers get a
//! synchronous ready barrier.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_yaml::Value;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use tarantest_core::config::ServerConfig;
use tarantest_core::{AddressingMode, Config, Endpoint, Error, Result};
use tarantest_protocol::AdminConnection;

use crate::port;

/// Environment variables the server's startup script reads.
const PRIMARY_PORT_ENV: &str = "PRIMARY_PORT";
const ADMIN_PORT_ENV: &str = "ADMIN_PORT";

const STATUS_COMMAND: &str = "box.info.status";

/// Status values that mean the server is up.
const READY_STATES: &[&str] = &["running", "primary", "hot_standby", "orphan", "loading"];
const REPLICA_PREFIX: &str = "replica";

/// One managed server instance.
///
/// Endpoints are chosen at construction and never change for the handle's
/// lifetime. Dropping the handle stops the process and removes the working
/// directory; `stop()` and `clean()` do the same explicitly.
#[derive(Debug)]
pub struct TarantoolServer {
    config: Config,
    work_dir: Option<TempDir>,
    admin_endpoint: Endpoint,
    primary_endpoint: Endpoint,
    binary: Option<Utf8PathBuf>,
    script: Option<Utf8PathBuf>,
    process: Option<Child>,
    log: Option<File>,
}

impl TarantoolServer {
    /// Create a handle: isolated working directory, admin port, primary
    /// endpoint (TCP probing starts past the admin port so the two never
    /// collide), and a resolved server executable.
    pub fn new(mode: AddressingMode, config: Config) -> Result<Self> {
        let work_dir = tempfile::Builder::new().prefix("tarantest-").tempdir()?;

        let admin_port = port::allocate(None, None, &config.ports)?;
        let admin_endpoint = Endpoint::tcp("127.0.0.1", admin_port);
        let primary_endpoint = match mode {
            // The admin port is allocated but not yet bound, so it would
            // probe free; excluding it keeps the two endpoints distinct
            // even when the scan wraps around.
            AddressingMode::Tcp => Endpoint::tcp(
                "127.0.0.1",
                port::allocate(Some(admin_port + 1), Some(admin_port), &config.ports)?,
            ),
            AddressingMode::Unix => Endpoint::unix(port::socket_path(&config.ports)),
        };

        let binary = find_executable(&config.server)?;
        info!(
            "new server handle: admin {}, primary {}, binary {}",
            admin_endpoint, primary_endpoint, binary
        );

        Ok(Self {
            config,
            work_dir: Some(work_dir),
            admin_endpoint,
            primary_endpoint,
            binary: Some(binary),
            script: None,
            process: None,
            log: None,
        })
    }

    /// Attach a startup script. It is copied into the working directory and
    /// made executable by `start()`, and spawned instead of the bare
    /// server binary.
    pub fn with_script(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.script = Some(path.into());
        self
    }

    pub fn admin_endpoint(&self) -> &Endpoint {
        &self.admin_endpoint
    }

    pub fn primary_endpoint(&self) -> &Endpoint {
        &self.primary_endpoint
    }

    /// Working directory, while it has not been cleaned yet.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(TempDir::path)
    }

    /// A fresh admin client for this server's administrative endpoint.
    pub fn admin(&self) -> AdminConnection {
        AdminConnection::new(self.admin_endpoint.clone())
    }

    /// Resolved server executable, re-resolving after `reset_binary()`.
    pub fn binary(&mut self) -> Result<&Utf8Path> {
        if self.binary.is_none() {
            self.binary = Some(find_executable(&self.config.server)?);
        }
        self.binary
            .as_deref()
            .ok_or_else(|| Error::ExecutableNotFound(self.config.server.binary_name.clone()))
    }

    /// Drop the memoized executable path so the next access re-resolves.
    pub fn reset_binary(&mut self) {
        self.binary = None;
    }

    /// The variable pairs exported to the spawned server. Its startup
    /// script reads the allocated ports from these.
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            (
                PRIMARY_PORT_ENV.to_string(),
                endpoint_env_value(&self.primary_endpoint),
            ),
            (
                ADMIN_PORT_ENV.to_string(),
                endpoint_env_value(&self.admin_endpoint),
            ),
        ]
    }

    fn work_path(&self) -> Result<&Path> {
        self.work_dir.as_ref().map(TempDir::path).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "working directory already cleaned",
            ))
        })
    }

    /// Destination of the copied startup script inside the working
    /// directory.
    fn script_dst(&self, script: &Utf8Path) -> Result<PathBuf> {
        let name = script.file_name().ok_or_else(|| {
            Error::Config(format!("startup script has no file name: {}", script))
        })?;
        Ok(self.work_path()?.join(name))
    }

    /// What gets spawned: the copied script when one was supplied, the bare
    /// server binary otherwise.
    fn program(&mut self) -> Result<PathBuf> {
        match self.script.clone() {
            Some(script) => self.script_dst(&script),
            None => Ok(self.binary()?.as_std_path().to_path_buf()),
        }
    }

    /// Combined stdout/stderr capture, opened lazily in append mode.
    fn log_file(&mut self) -> Result<&File> {
        if self.log.is_none() {
            let path = self.work_path()?.join(&self.config.server.log_file);
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.log = Some(file);
        }
        self.log
            .as_ref()
            .ok_or_else(|| Error::Io(io::Error::other("log file unavailable")))
    }

    /// Spawn the server and block until it reports a ready status.
    pub fn start(&mut self) -> Result<()> {
        let env = self.environment();

        if let Some(script) = self.script.clone() {
            let dst = self.script_dst(&script)?;
            fs::copy(&script, &dst)?;
            fs::set_permissions(&dst, fs::Permissions::from_mode(0o777))?;
        }

        let program = self.program()?;
        let cwd = self.work_path()?.to_path_buf();
        let log = self.log_file()?;
        let stdout = log.try_clone()?;
        let stderr = log.try_clone()?;

        info!("spawning {} in {}", program.display(), cwd.display());
        let child = Command::new(&program)
            .current_dir(&cwd)
            .envs(env)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;
        self.process = Some(child);

        self.wait_until_started()
    }

    /// Poll the admin endpoint until the server reports a recognized ready
    /// status.
    ///
    /// Connection-refused means "not listening yet" and is retried after
    /// the configured interval, up to the configured deadline. A reachable
    /// server that reports a status outside the ready set fails
    /// immediately. Other connection errors propagate.
    pub fn wait_until_started(&self) -> Result<()> {
        let started = Instant::now();
        let deadline = self.config.poll.startup_deadline();

        loop {
            let mut admin = AdminConnection::new(self.admin_endpoint.clone());
            match admin.session(|conn| conn.execute(STATUS_COMMAND)) {
                Ok(response) => return check_status(response),
                Err(ref e) if e.is_connection_refused() => {
                    debug!("admin endpoint {} not listening yet", self.admin_endpoint);
                    if let Some(limit) = deadline
                        && started.elapsed() >= limit
                    {
                        return Err(Error::StartupTimeout(limit));
                    }
                    thread::sleep(self.config.poll.interval());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Gracefully terminate the process, if one is still running. No-op
    /// when nothing is running or the process already exited.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(child) = self.process.as_mut() {
            if child.try_wait()?.is_none() {
                let pid = Pid::from_raw(child.id() as i32);
                debug!("terminating server process {}", pid);
                match signal::kill(pid, Signal::SIGTERM) {
                    // the process may exit between try_wait and kill
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => return Err(Error::Io(io::Error::from_raw_os_error(e as i32))),
                }
                child.wait()?;
            }
            self.process = None;
        }
        Ok(())
    }

    /// Stop and start again, reusing the endpoints and working directory.
    pub fn restart(&mut self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    /// Remove the unix socket (when the primary endpoint used one) and the
    /// working directory. Safe to call repeatedly.
    pub fn clean(&mut self) -> Result<()> {
        if let Some(path) = self.primary_endpoint.socket_path() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.log = None;
        if let Some(dir) = self.work_dir.take() {
            dir.close()?;
        }
        Ok(())
    }
}

impl Drop for TarantoolServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop server on drop: {}", e);
        }
        if let Err(e) = self.clean() {
            warn!("failed to clean up server on drop: {}", e);
        }
    }
}

fn endpoint_env_value(endpoint: &Endpoint) -> String {
    match endpoint {
        Endpoint::Tcp { port, .. } => port.to_string(),
        Endpoint::Unix(path) => path.to_string(),
    }
}

/// Scan the search path for an executable file matching the configured
/// binary name. The override variable's directories, when set, are tried
/// first.
fn find_executable(server: &ServerConfig) -> Result<Utf8PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(override_path) = std::env::var_os(&server.path_override_env) {
        dirs.extend(std::env::split_paths(&override_path));
    }
    match &server.search_path {
        Some(paths) => dirs.extend(paths.iter().map(|p| p.as_std_path().to_path_buf())),
        None => {
            if let Some(path) = std::env::var_os("PATH") {
                dirs.extend(std::env::split_paths(&path));
            }
        }
    }

    for dir in dirs {
        let candidate = dir.join(&server.binary_name);
        if is_executable(&candidate) {
            let absolute = candidate.canonicalize()?;
            return Utf8PathBuf::from_path_buf(absolute).map_err(|p| {
                Error::Config(format!("executable path is not UTF-8: {}", p.display()))
            });
        }
    }
    Err(Error::ExecutableNotFound(server.binary_name.clone()))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Map one status response to ready / fatal.
fn check_status(response: Option<Value>) -> Result<()> {
    let status = response
        .as_ref()
        .and_then(Value::as_sequence)
        .and_then(|seq| seq.first())
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::Protocol("status response is not a list with a string head".to_string())
        })?;

    if READY_STATES.contains(&status) || status.starts_with(REPLICA_PREFIX) {
        debug!("server reported status `{}`", status);
        Ok(())
    } else {
        Err(Error::UnexpectedStatus(status.to_string()))
    }
}
