//! Harness configuration
//!
//! Every knob has a default that matches a stock Tarantool installation, so
//! `Config::default()` works out of the box for most test suites. A TOML
//! file can override individual fields.

use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ports: PortConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Port scan range and socket-path directory for endpoint allocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortConfig {
    #[serde(default = "default_range_start")]
    pub range_start: u16,
    #[serde(default = "default_range_end")]
    pub range_end: u16,
    /// Directory where unix-domain socket paths are generated.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: Utf8PathBuf,
}

/// Readiness-poll pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Upper bound on the whole readiness poll, in seconds. 0 disables the
    /// deadline and the poll retries forever.
    #[serde(default = "default_startup_deadline")]
    pub startup_deadline_secs: u64,
}

/// Where and how to find the server executable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_binary_name")]
    pub binary_name: String,
    /// Environment variable whose value, when set, is prepended to the
    /// executable search path.
    #[serde(default = "default_path_override_env")]
    pub path_override_env: String,
    /// Directories searched for the server binary. Falls back to `PATH`
    /// when unset.
    #[serde(default)]
    pub search_path: Option<Vec<Utf8PathBuf>>,
    /// Name of the combined stdout/stderr capture file inside the working
    /// directory.
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn startup_deadline(&self) -> Option<Duration> {
        match self.startup_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            socket_dir: default_socket_dir(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            startup_deadline_secs: default_startup_deadline(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_name: default_binary_name(),
            path_override_env: default_path_override_env(),
            search_path: None,
            log_file: default_log_file(),
        }
    }
}

// Default value functions
const fn default_range_start() -> u16 {
    3300
}

const fn default_range_end() -> u16 {
    9999
}

fn default_socket_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("/tmp")
}

const fn default_poll_interval() -> u64 {
    100
}

const fn default_startup_deadline() -> u64 {
    90
}

fn default_binary_name() -> String {
    "tarantool".to_owned()
}

fn default_path_override_env() -> String {
    "TARANTOOL_BOX_PATH".to_owned()
}

fn default_log_file() -> String {
    "tarantool.log".to_owned()
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ports.range_start >= self.ports.range_end {
            return Err(Error::Config(format!(
                "Port range is empty: {}..{}",
                self.ports.range_start, self.ports.range_end
            )));
        }
        if self.poll.interval_ms == 0 {
            return Err(Error::Config(
                "Poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ports.range_start, 3300);
        assert_eq!(config.ports.range_end, 9999);
        assert_eq!(config.poll.interval(), Duration::from_millis(100));
        assert_eq!(
            config.poll.startup_deadline(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(config.server.binary_name, "tarantool");
    }

    #[test]
    fn test_zero_deadline_means_unbounded() {
        let mut config = Config::default();
        config.poll.startup_deadline_secs = 0;
        assert_eq!(config.poll.startup_deadline(), None);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ports]\nrange_start = 4000").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.ports.range_start, 4000);
        assert_eq!(config.ports.range_end, 9999);
        assert_eq!(config.server.binary_name, "tarantool");
    }

    #[test]
    fn test_empty_port_range_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ports]\nrange_start = 5000\nrange_end = 5000").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
