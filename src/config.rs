//! Relay configuration.
//!
//! `RelayConfig` carries every tunable: bind address, source password,
//! ring capacity and all timeouts. `Default` holds the built-in values;
//! an optional `icy-relay.toml` (working directory first, then the
//! platform config directory) overrides individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use crate::constants;
use crate::error::ConfigError;

/// Name of the optional config file, looked up in the working directory
/// and in the platform config directory.
const CONFIG_FILE: &str = "icy-relay.toml";

/// Relay server configuration.
///
/// Timeouts are stored in milliseconds so tests can shrink them without
/// a parallel set of knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the TCP listener binds to
    pub bind_host: String,
    /// Port the TCP listener binds to
    pub port: u16,
    /// Shared password expected from sources
    pub source_password: String,
    /// Hostname advertised to listeners in the `icy-url` header
    pub public_hostname: String,
    /// Capacity of each mount's ring buffer in bytes
    pub ring_capacity: usize,
    /// A source that sends nothing for this long is disconnected
    pub source_timeout_ms: u64,
    /// A listener write that blocks for this long gets the listener pruned
    pub listener_write_timeout_ms: u64,
    /// How long a broadcast loop sleeps when no chunk arrives
    pub broadcast_wait_ms: u64,
    /// Deadline for a client's initial request bytes
    pub handshake_timeout_ms: u64,
    /// Interval between listener liveness probes
    pub liveness_interval_ms: u64,
    /// How long shutdown waits for broadcast loops before abandoning them
    pub shutdown_join_ms: u64,
    /// Delay between backlog slices while seeding a new listener
    pub seed_pacing_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_PORT,
            source_password: constants::DEFAULT_PASSWORD.to_string(),
            public_hostname: "localhost".to_string(),
            ring_capacity: constants::RING_CAPACITY,
            source_timeout_ms: constants::SOURCE_SILENCE_TIMEOUT_SECS * 1000,
            listener_write_timeout_ms: constants::LISTENER_WRITE_TIMEOUT_SECS * 1000,
            broadcast_wait_ms: constants::BROADCAST_WAIT_SECS * 1000,
            handshake_timeout_ms: constants::HANDSHAKE_TIMEOUT_SECS * 1000,
            liveness_interval_ms: constants::LIVENESS_INTERVAL_SECS * 1000,
            shutdown_join_ms: constants::SHUTDOWN_JOIN_SECS * 1000,
            seed_pacing_ms: constants::SEED_PACING_MS,
        }
    }
}

impl RelayConfig {
    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// Search order: `./icy-relay.toml`, then the platform config
    /// directory. A file that exists but cannot be read or parsed is an
    /// error rather than a silent fallback.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "loading config file");
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from a TOML file. Missing fields keep their
    /// default values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Invalid {
            path: path.display().to_string(),
            source,
        })
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("", "", "icy-relay") {
            paths.push(dirs.config_dir().join(CONFIG_FILE));
        }
        paths
    }

    /// `host:port` string the TCP listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Stream URL advertised to listeners
    pub fn stream_url(&self) -> String {
        format!("http://{}:{}", self.public_hostname, self.port)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn listener_write_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_write_timeout_ms)
    }

    pub fn broadcast_wait(&self) -> Duration {
        Duration::from_millis(self.broadcast_wait_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn shutdown_join(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_ms)
    }

    pub fn seed_pacing(&self) -> Duration {
        Duration::from_millis(self.seed_pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.source_password, "hackme");
        assert_eq!(config.ring_capacity, 2 * 1024 * 1024);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.stream_url(), "http://localhost:8000");
        assert_eq!(config.source_timeout(), Duration::from_secs(10));
        assert_eq!(config.listener_write_timeout(), Duration::from_secs(5));
        assert_eq!(config.broadcast_wait(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            port = 9000
            source_password = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.source_password, "s3cret");
        // untouched fields keep their defaults
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.ring_capacity, 2 * 1024 * 1024);
        assert_eq!(config.seed_pacing(), Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("icy-relay-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = RelayConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = RelayConfig::from_file(Path::new("/nonexistent/icy-relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
