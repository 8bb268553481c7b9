//! Error types shared across the client.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering all session failure modes.
///
/// The type is `Clone` because a single transport failure or close is
/// delivered to every request that was pending at the time.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The server process could not be launched.
    Spawn(String),
    /// The server process exited or its streams failed after start.
    Transport(String),
    /// A request exceeded the session's configured deadline.
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The server answered a request with an error object.
    Remote {
        /// JSON-RPC error code, when the server supplied one.
        code: Option<i64>,
        /// Server message, or the serialized error object when none was given.
        message: String,
    },
    /// The session was closed by the client while the request was pending.
    Closed,
    /// The session was used out of order (e.g. before `initialize`).
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// One or more named sessions failed to start.
    Startup(Vec<(String, AppError)>),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Timeout { method, timeout } => {
                write!(f, "timeout ({}ms) for {method}", timeout.as_millis())
            }
            Self::Remote { code: Some(code), message } => {
                write!(f, "remote error [{code}]: {message}")
            }
            Self::Remote { code: None, message } => write!(f, "remote error: {message}"),
            Self::Closed => write!(f, "client closed"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Startup(failures) => {
                write!(f, "{} server(s) failed to start", failures.len())?;
                for (index, (name, err)) in failures.iter().enumerate() {
                    let sep = if index == 0 { ": " } else { "; " };
                    write!(f, "{sep}{name}: {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
