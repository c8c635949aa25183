//! Configuration system for the `taskboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::task::{MemberId, ProjectId};

use crate::connection::{ConnectionConfig, ReconnectPolicy};
use crate::session::Session;
use crate::store::http::StoreConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    reconnect: ReconnectFileConfig,
    client: ClientFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<MemberId>,
    username: Option<String>,
    token: Option<String>,
    project: Option<ProjectId>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    max_attempts: Option<u32>,
    delay_secs: Option<u64>,
}

/// `[client]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileConfig {
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    // -- Server --
    /// REST API base URL, e.g. `http://localhost:8000/api`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://localhost:8000`.
    pub ws_url: String,

    // -- Session --
    /// Signed-in member id.
    pub user_id: Option<MemberId>,
    /// Signed-in member display name.
    pub username: Option<String>,
    /// Issued bearer token.
    pub token: Option<String>,
    /// Project whose board to open.
    pub project: Option<ProjectId>,

    // -- Connection --
    /// Retry policy for unexpected WebSocket closures.
    pub reconnect: ReconnectPolicy,
    /// Timeout for a single WebSocket connect attempt.
    pub connect_timeout: Duration,
    /// Timeout for a single REST request.
    pub request_timeout: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            ws_url: "ws://localhost:8000".to_string(),
            user_id: None,
            username: None,
            token: None,
            project: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("ws_url", &self.ws_url)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("reconnect", &self.reconnect)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/taskboard/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            ws_url: cli
                .ws_url
                .clone()
                .or_else(|| file.server.ws_url.clone())
                .unwrap_or(defaults.ws_url),
            user_id: cli.user_id.or(file.session.user_id),
            username: cli
                .username
                .clone()
                .or_else(|| file.session.username.clone()),
            token: cli.token.clone().or_else(|| file.session.token.clone()),
            project: cli.project.or(file.session.project),
            reconnect: ReconnectPolicy {
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
                delay: file
                    .reconnect
                    .delay_secs
                    .map_or(defaults.reconnect.delay, Duration::from_secs),
            },
            connect_timeout: file
                .client
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .client
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            channel_capacity: file
                .client
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
        }
    }

    /// Build a [`Session`] from the configured credentials.
    ///
    /// Returns `None` if the token or user id is missing or the token is
    /// empty. The username falls back to the user id.
    #[must_use]
    pub fn to_session(&self) -> Option<Session> {
        let user_id = self.user_id?;
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        let username = self
            .username
            .clone()
            .unwrap_or_else(|| user_id.to_string());
        Some(Session::new(user_id, username, token))
    }

    /// Settings for the [`crate::connection::ConnectionManager`].
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            ws_url: self.ws_url.clone(),
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
            channel_capacity: self.channel_capacity,
        }
    }

    /// Settings for the [`crate::store::http::HttpTaskStore`].
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            api_url: self.api_url.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time Kanban board client")]
pub struct CliArgs {
    /// REST API base URL.
    #[arg(long, env = "TASKBOARD_API_URL")]
    pub api_url: Option<String>,

    /// WebSocket base URL.
    #[arg(long, env = "TASKBOARD_WS_URL")]
    pub ws_url: Option<String>,

    /// Your member id.
    #[arg(long, env = "TASKBOARD_USER_ID")]
    pub user_id: Option<MemberId>,

    /// Your display name.
    #[arg(long, env = "TASKBOARD_USERNAME")]
    pub username: Option<String>,

    /// Bearer token issued at login.
    #[arg(long, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Project whose board to open.
    #[arg(short, long, env = "TASKBOARD_PROJECT")]
    pub project: Option<ProjectId>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
