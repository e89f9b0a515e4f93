//! # Gateway Configuration
//!
//! Configuration management for the sender daemon and the feedback tool.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PUSHGATE_ENV=production                                            │
//! │     PUSHGATE_CERT_PATH=/etc/pushgate/apn_production.pem                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $PUSHGATE_CONFIG, or                                               │
//! │     ~/.config/pushgate/config.toml (Linux)                             │
//! │     ~/Library/Application Support/dev.pushgate.pushgate/ (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Environment::Sandbox, 32-byte tokens, 256-byte payloads            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # config.toml
//! environment = "sandbox"   # production | anything else = sandbox
//!
//! [credentials]
//! cert_path = "/etc/pushgate/apn_sandbox.pem"
//! key_path = "/etc/pushgate/apn_sandbox.key"
//!
//! [connection]
//! connect_timeout_secs = 10
//! write_timeout_secs = 10
//! read_timeout_secs = 30
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//!
//! [limits]
//! token_len = 32
//! max_payload_len = 256
//!
//! [queue]
//! capacity = 100
//! failure_log_capacity = 1000
//!
//! [endpoints]
//! gateway = "127.0.0.1:2195"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use pushgate_core::PayloadLimits;

use crate::error::{GatewayError, GatewayResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PUSHGATE_CONFIG";

// =============================================================================
// Environment
// =============================================================================

/// Which pair of gateway/feedback hosts to talk to.
///
/// Only the exact name `production` selects the production hosts. Every
/// other value, including typos, lands on sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Environment {
    /// The live gateway. Real devices, real users.
    Production,

    /// The development gateway.
    #[default]
    Sandbox,
}

impl Environment {
    /// Returns the notification gateway for this environment.
    pub fn gateway_endpoint(&self) -> Endpoint {
        match self {
            Environment::Production => Endpoint::new("gateway.push.apple.com", 2195),
            Environment::Sandbox => Endpoint::new("gateway.sandbox.push.apple.com", 2195),
        }
    }

    /// Returns the feedback service for this environment.
    pub fn feedback_endpoint(&self) -> Endpoint {
        match self {
            Environment::Production => Endpoint::new("feedback.push.apple.com", 2196),
            Environment::Sandbox => Endpoint::new("feedback.sandbox.push.apple.com", 2196),
        }
    }

    /// Conventional certificate file name for this environment.
    pub fn default_cert_file(&self) -> &'static str {
        match self {
            Environment::Production => "apn_production.pem",
            Environment::Sandbox => "apn_sandbox.pem",
        }
    }
}

impl From<&str> for Environment {
    fn from(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Sandbox
        }
    }
}

impl From<String> for Environment {
    fn from(name: String) -> Self {
        Environment::from(name.as_str())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Sandbox => write!(f, "sandbox"),
        }
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            GatewayError::InvalidConfig(format!(
                "Endpoint must look like host:port, got: '{}'",
                s
            ))
        };

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Endpoint::new(host, port))
    }
}

// =============================================================================
// Credential Settings
// =============================================================================

/// Where the client certificate and key live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// PEM certificate. Defaults to `apn_<environment>.pem` in the config
    /// directory.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// PEM PKCS#8 private key. Defaults to `cert_path`, for bundles that
    /// carry both in one file.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

// =============================================================================
// Connection Settings
// =============================================================================

/// Socket timeouts and reconnect pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// TCP connect plus TLS handshake (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// One frame write (seconds).
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// One feedback read (seconds).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Initial reconnect backoff (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum reconnect backoff (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_write_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            connect_timeout_secs: default_connect_timeout(),
            write_timeout_secs: default_write_timeout(),
            read_timeout_secs: default_read_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Limit Settings
// =============================================================================

/// Frame size limits enforced before anything is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Exact device token length in bytes.
    #[serde(default = "default_token_len")]
    pub token_len: usize,

    /// Maximum JSON payload length in bytes.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,
}

fn default_token_len() -> usize {
    pushgate_core::DEFAULT_TOKEN_LEN
}
fn default_max_payload_len() -> usize {
    pushgate_core::DEFAULT_MAX_PAYLOAD_LEN
}

impl Default for LimitSettings {
    fn default() -> Self {
        LimitSettings {
            token_len: default_token_len(),
            max_payload_len: default_max_payload_len(),
        }
    }
}

impl From<&LimitSettings> for PayloadLimits {
    fn from(settings: &LimitSettings) -> Self {
        PayloadLimits {
            token_len: settings.token_len,
            max_payload_len: settings.max_payload_len,
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// In-process job queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Jobs buffered before producers wait.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Failed jobs kept for inspection; the oldest are evicted first.
    #[serde(default = "default_failure_log_capacity")]
    pub failure_log_capacity: usize,
}

fn default_capacity() -> usize {
    100
}

fn default_failure_log_capacity() -> usize {
    1000
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            capacity: default_capacity(),
            failure_log_capacity: default_failure_log_capacity(),
        }
    }
}

/// Optional host overrides, for proxies and local test servers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub gateway: Option<String>,

    #[serde(default)]
    pub feedback: Option<String>,
}

// =============================================================================
// Main Gateway Configuration
// =============================================================================

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Production or sandbox.
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub credentials: CredentialSettings,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub limits: LimitSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

impl GatewayConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, then `$PUSHGATE_CONFIG`, then the
    ///    platform config directory)
    /// 3. Environment variables
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load(config_path: Option<PathBuf>) -> GatewayResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading gateway config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses one TOML file without applying overrides.
    pub fn from_file(path: &Path) -> GatewayResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        let conn = &self.connection;
        for (name, value) in [
            ("connect_timeout_secs", conn.connect_timeout_secs),
            ("write_timeout_secs", conn.write_timeout_secs),
            ("read_timeout_secs", conn.read_timeout_secs),
            ("max_backoff_secs", conn.max_backoff_secs),
        ] {
            if value == 0 {
                return Err(GatewayError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.limits.token_len == 0 {
            return Err(GatewayError::InvalidConfig(
                "token_len must be greater than 0".into(),
            ));
        }

        if self.limits.max_payload_len == 0 || self.limits.max_payload_len > u16::MAX as usize {
            return Err(GatewayError::InvalidConfig(format!(
                "max_payload_len must be between 1 and {}, got: {}",
                u16::MAX,
                self.limits.max_payload_len
            )));
        }

        if self.queue.capacity == 0 {
            return Err(GatewayError::InvalidConfig(
                "queue capacity must be greater than 0".into(),
            ));
        }

        if self.queue.failure_log_capacity == 0 {
            return Err(GatewayError::InvalidConfig(
                "queue failure_log_capacity must be greater than 0".into(),
            ));
        }

        self.gateway_endpoint()?;
        self.feedback_endpoint()?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("PUSHGATE_ENV") {
            let parsed = Environment::from(env.as_str());
            debug!(environment = %parsed, "Overriding environment from environment");
            self.environment = parsed;
        }

        if let Some(path) = lookup("PUSHGATE_CERT_PATH") {
            self.credentials.cert_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("PUSHGATE_KEY_PATH") {
            self.credentials.key_path = Some(PathBuf::from(path));
        }

        if let Some(gateway) = lookup("PUSHGATE_GATEWAY") {
            debug!(gateway = %gateway, "Overriding gateway endpoint from environment");
            self.endpoints.gateway = Some(gateway);
        }

        if let Some(feedback) = lookup("PUSHGATE_FEEDBACK") {
            debug!(feedback = %feedback, "Overriding feedback endpoint from environment");
            self.endpoints.feedback = Some(feedback);
        }
    }

    /// Returns the default config directory.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "pushgate", "pushgate")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Gateway endpoint: the override if set, else the environment's host.
    pub fn gateway_endpoint(&self) -> GatewayResult<Endpoint> {
        match &self.endpoints.gateway {
            Some(s) => s.parse(),
            None => Ok(self.environment.gateway_endpoint()),
        }
    }

    /// Feedback endpoint: the override if set, else the environment's host.
    pub fn feedback_endpoint(&self) -> GatewayResult<Endpoint> {
        match &self.endpoints.feedback {
            Some(s) => s.parse(),
            None => Ok(self.environment.feedback_endpoint()),
        }
    }

    /// Certificate path, falling back to the conventional per-environment file.
    pub fn cert_path(&self) -> GatewayResult<PathBuf> {
        if let Some(path) = &self.credentials.cert_path {
            return Ok(path.clone());
        }
        Self::config_dir()
            .map(|dir| dir.join(self.environment.default_cert_file()))
            .ok_or_else(|| {
                GatewayError::InvalidConfig(
                    "No cert_path configured and no config directory available".into(),
                )
            })
    }

    /// Key path, falling back to the certificate path.
    pub fn key_path(&self) -> GatewayResult<PathBuf> {
        match &self.credentials.key_path {
            Some(path) => Ok(path.clone()),
            None => self.cert_path(),
        }
    }

    /// Frame limits as the codec wants them.
    pub fn payload_limits(&self) -> PayloadLimits {
        PayloadLimits::from(&self.limits)
    }
}
