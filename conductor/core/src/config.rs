//! TOML Configuration File Support
//!
//! Configuration for the chat client, loaded from
//! `~/.config/chat-conductor/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the binary)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! url = "https://chat.example.com/api/generate"
//! timeout_ms = 30000
//! connect_timeout_ms = 5000
//!
//! [identity]
//! default_client_id = "dabdf41d-5b06-4807-b262-f84119dec26e"
//! origin_lookup_url = "https://api.ipify.org?format=json"
//! state_dir = "/home/me/.local/state/chat-conductor"
//!
//! [session]
//! completion_linger_ms = 100
//! transcript_key = "chat-messages"
//! session_id_key = "chat-session-id"
//! client_id_key = "vibemind-client-id"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "https://vmpc01.vibemind.in/ass/api/generate";

/// Client id seeded into durable storage on first use
pub const DEFAULT_CLIENT_ID: &str = "dabdf41d-5b06-4807-b262-f84119dec26e";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Chat generation URL
    pub url: Option<String>,

    /// Time allowed for the response headers to arrive, in milliseconds
    pub timeout_ms: Option<u64>,

    /// TCP/TLS connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// `[identity]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityToml {
    /// Client id seeded into durable storage
    pub default_client_id: Option<String>,

    /// URL queried for the network-origin id
    pub origin_lookup_url: Option<String>,

    /// Directory for the durable store
    pub state_dir: Option<PathBuf>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// How long the `complete` status stays visible, in milliseconds
    pub completion_linger_ms: Option<u64>,

    /// Storage key for the transcript
    pub transcript_key: Option<String>,

    /// Storage key for the session id
    pub session_id_key: Option<String>,

    /// Storage key for the client id
    pub client_id_key: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Endpoint section
    pub endpoint: EndpointToml,

    /// Identity section
    pub identity: IdentityToml,

    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Keys under which state is persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKeys {
    /// Tab-scoped: JSON array of messages
    pub transcript: String,
    /// Tab-scoped: session id
    pub session_id: String,
    /// Durable: client id
    pub client_id: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            transcript: "chat-messages".to_string(),
            session_id: "chat-session-id".to_string(),
            client_id: "vibemind-client-id".to_string(),
        }
    }
}

/// Effective client configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Chat generation URL
    pub endpoint: String,

    /// Time allowed for the response headers to arrive
    pub request_timeout: Duration,

    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,

    /// URL queried for the network-origin id; `None` disables the lookup
    pub origin_lookup_url: Option<String>,

    /// Client id seeded into durable storage; empty means generate one
    pub default_client_id: String,

    /// How long the `complete` status stays visible before `idle`
    pub completion_linger: Duration,

    /// Directory for the durable store; `None` keeps it in memory
    pub state_dir: Option<PathBuf>,

    /// Storage keys
    pub keys: StorageKeys,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            origin_lookup_url: None,
            default_client_id: DEFAULT_CLIENT_ID.to_string(),
            completion_linger: Duration::from_millis(100),
            state_dir: default_state_dir(),
            keys: StorageKeys::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Builder: set the completion linger
    #[must_use]
    pub fn with_completion_linger(mut self, linger: Duration) -> Self {
        self.completion_linger = linger;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Path of the durable store file, if a state directory is configured
    #[must_use]
    pub fn durable_store_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("durable.json"))
    }

    /// Check that the values are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if let Some(url) = &self.origin_lookup_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "origin lookup must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        let keys = &self.keys;
        if keys.transcript.is_empty() || keys.session_id.is_empty() || keys.client_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "storage keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-conductor/config.toml` or
/// `~/.config/chat-conductor/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-conductor").join("config.toml"))
}

/// Default directory for the durable store
#[must_use]
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("chat-conductor"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    let mut config = ChatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) {
    if let Some(url) = &toml.endpoint.url {
        config.endpoint.clone_from(url);
    }
    if let Some(ms) = toml.endpoint.timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.endpoint.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }

    if let Some(id) = &toml.identity.default_client_id {
        config.default_client_id.clone_from(id);
    }
    if toml.identity.origin_lookup_url.is_some() {
        config.origin_lookup_url.clone_from(&toml.identity.origin_lookup_url);
    }
    if toml.identity.state_dir.is_some() {
        config.state_dir.clone_from(&toml.identity.state_dir);
    }

    if let Some(ms) = toml.session.completion_linger_ms {
        config.completion_linger = Duration::from_millis(ms);
    }
    if let Some(key) = &toml.session.transcript_key {
        config.keys.transcript.clone_from(key);
    }
    if let Some(key) = &toml.session.session_id_key {
        config.keys.session_id.clone_from(key);
    }
    if let Some(key) = &toml.session.client_id_key {
        config.keys.client_id.clone_from(key);
    }
}

/// Apply environment overrides, reading variables through `lookup`
fn apply_env_config(config: &mut ChatConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("CHAT_ENDPOINT") {
        config.endpoint = url;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("CHAT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.request_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("CHAT_CONNECT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.connect_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = lookup("CHAT_ORIGIN_LOOKUP_URL") {
        config.origin_lookup_url = if url.is_empty() { None } else { Some(url) };
        config.source = ConfigSource::Env;
    }
    if let Some(id) = lookup("CHAT_CLIENT_ID") {
        config.default_client_id = id;
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = lookup("CHAT_STATE_DIR") {
        config.state_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("CHAT_COMPLETION_LINGER_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.completion_linger = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChatConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.default_client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.completion_linger, Duration::from_millis(100));
        assert_eq!(config.keys.transcript, "chat-messages");
        assert_eq!(config.source(), ConfigSource::Default);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.config_file_path, None);
        assert_ne!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_toml_sections_apply() {
        let toml: ChatToml = toml::from_str(
            r#"
            [endpoint]
            url = "http://localhost:9000/generate"
            timeout_ms = 1500

            [identity]
            default_client_id = "device-1"
            origin_lookup_url = "http://localhost:9000/ip"

            [session]
            completion_linger_ms = 0
            transcript_key = "messages"
            "#,
        )
        .unwrap();

        let mut config = ChatConfig::default();
        apply_toml_config(&mut config, &toml);

        assert_eq!(config.endpoint, "http://localhost:9000/generate");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.default_client_id, "device-1");
        assert_eq!(
            config.origin_lookup_url.as_deref(),
            Some("http://localhost:9000/ip")
        );
        assert_eq!(config.completion_linger, Duration::ZERO);
        assert_eq!(config.keys.transcript, "messages");
        assert_eq!(config.keys.session_id, "chat-session-id");
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("CHAT_ENDPOINT", "https://env.example/generate"),
            ("CHAT_TIMEOUT_MS", "2500"),
            ("CHAT_COMPLETION_LINGER_MS", "not-a-number"),
            ("CHAT_ORIGIN_LOOKUP_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ChatConfig::default();
        config.origin_lookup_url = Some("http://file.example/ip".into());
        apply_env_config(&mut config, |key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.endpoint, "https://env.example/generate");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.completion_linger, Duration::from_millis(100));
        assert_eq!(config.origin_lookup_url, None);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[endpoint]\nurl = \"http://127.0.0.1:1/chat\"\n").unwrap();

        let config = load_config_from_path(Some(path.clone())).unwrap();
        assert_eq!(config.config_file_path, Some(path));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[endpoint\nurl = 3").unwrap();

        let err = load_config_from_path(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = ChatConfig::default().with_endpoint("ftp://nope");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = ChatConfig::default();
        config.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ChatConfig::default();
        config.keys.client_id.clear();
        assert!(config.validate().is_err());
    }
}
