//! Server launch configuration parsing and validation.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Request timeout applied when neither the server nor the file sets one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Launch configuration for a single server process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables laid over the ambient environment of the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-session request timeout override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// Launch `command` with no arguments and the default timeout.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_ms: None,
        }
    }

    /// Replace the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add one environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the per-session request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Effective request timeout for sessions launched from this config.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(AppError::Config("server name must not be empty".into()));
        }
        if self.command.trim().is_empty() {
            return Err(AppError::Config(format!(
                "server '{name}': command must not be empty"
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(AppError::Config(format!(
                "server '{name}': timeout_ms must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Top-level client configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Timeout applied to servers without their own `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Named server launch configurations.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Server configurations with the default timeout filled in.
    #[must_use]
    pub fn resolved_servers(&self) -> BTreeMap<String, ServerConfig> {
        self.servers
            .iter()
            .map(|(name, server)| {
                let mut server = server.clone();
                server.timeout_ms.get_or_insert(self.default_timeout_ms);
                (name.clone(), server)
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(AppError::Config(
                "default_timeout_ms must be greater than zero".into(),
            ));
        }
        for (name, server) in &self.servers {
            server.validate(name)?;
        }
        Ok(())
    }
}
