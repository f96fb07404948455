//! Error types for the relay

use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level failures that map onto an HTTP-style rejection.
///
/// These end exactly one connection; the accept loop and sibling sessions
/// never see them.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error("Unauthorized: invalid source password")]
    Unauthorized,

    #[error("Mount not found: {0}")]
    MountNotFound(String),

    #[error("No live source on mount: {0}")]
    NoLiveSource(String),
}

impl ProtocolError {
    /// HTTP status code sent back before the connection closes
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::BadRequest(_) => 400,
            ProtocolError::Unauthorized => 401,
            ProtocolError::MountNotFound(_) => 404,
            ProtocolError::NoLiveSource(_) => 503,
        }
    }

    /// Reason phrase for the status line and error body
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::BadRequest(detail) => detail,
            ProtocolError::Unauthorized => "Unauthorized - Invalid password",
            ProtocolError::MountNotFound(_) => "Not Found - Stream not available",
            ProtocolError::NoLiveSource(_) => "Service Unavailable - No source connected",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Invalid {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid port argument: {0}")]
    InvalidPort(String),
}

/// Result type alias for the relay
pub type Result<T> = std::result::Result<T, Error>;
