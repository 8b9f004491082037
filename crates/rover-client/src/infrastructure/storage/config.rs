//! TOML-based configuration persistence for the rover client.
//!
//! Reads and writes `ClientConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\RoverLink\config.toml`
//! - Linux:    `~/.config/roverlink/config.toml`
//! - macOS:    `~/Library/Application Support/RoverLink/config.toml`
//!
//! An explicit path (the binary's `--config` flag) bypasses the lookup.
//!
//! ```toml
//! [server]
//! host = "rover.local"
//! control_port = 8888
//! stream_port = 8889
//!
//! [session]
//! preferred_rover = "rover-2"
//!
//! [motion]
//! repeat_interval_ms = 750
//! initial_speed = 0.5
//!
//! [motion.keys]
//! i = "forward"
//! k = "back"
//! ```
//!
//! Every field has a `#[serde(default = ..)]`, so a file only needs the
//! values it changes and whole sections may be left out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the rover server lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// WebSocket port of the control link.
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// WebSocket port of the stream link.
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
    /// URL path of the control endpoint, e.g. `"/control"`.
    #[serde(default)]
    pub control_path: String,
    #[serde(default)]
    pub stream_path: String,
    /// WebSocket sub-protocol offered on both links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprotocol: Option<String>,
}

/// Rover selection policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Bind a rover as soon as the list arrives.
    #[serde(default = "default_true")]
    pub auto_select: bool,
    /// Rover id to auto-select instead of the first one offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_rover: Option<String>,
}

/// Movement behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionConfig {
    /// How often held movement is re-sent, in milliseconds.
    #[serde(default = "default_repeat_interval_ms")]
    pub repeat_interval_ms: u64,
    /// Wheel speed sent once the session binds, in `[0, 1]`.
    #[serde(default = "default_initial_speed")]
    pub initial_speed: f64,
    /// Key overrides, key character to input name (`"i" = "forward"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    8888
}
fn default_stream_port() -> u16 {
    8889
}
fn default_true() -> bool {
    true
}
fn default_repeat_interval_ms() -> u64 {
    750
}
fn default_initial_speed() -> f64 {
    0.5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            control_port: default_control_port(),
            stream_port: default_stream_port(),
            control_path: String::new(),
            stream_path: String::new(),
            subprotocol: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_select: default_true(),
            preferred_rover: None,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: default_repeat_interval_ms(),
            initial_speed: default_initial_speed(),
            keys: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// `ws://host:control_port/control_path`
    pub fn control_url(&self) -> String {
        ws_url(&self.host, self.control_port, &self.control_path)
    }

    /// `ws://host:stream_port/stream_path`
    pub fn stream_url(&self) -> String {
        ws_url(&self.host, self.stream_port, &self.stream_path)
    }
}

impl MotionConfig {
    /// The refresh period, never shorter than 50 ms.
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms.max(50))
    }
}

fn ws_url(host: &str, port: u16, path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        format!("ws://{host}:{port}{path}")
    } else {
        format!("ws://{host}:{port}/{path}")
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `ClientConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ClientConfig` from `path`, returning `ClientConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &ClientConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `RoverLink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RoverLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("roverlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RoverLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("roverlink-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_client_config_defaults() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.control_port, 8888);
        assert_eq!(cfg.server.stream_port, 8889);
        assert!(cfg.session.auto_select);
        assert_eq!(cfg.motion.repeat_interval_ms, 750);
        assert_eq!(cfg.motion.initial_speed, 0.5);
        assert_eq!(cfg.logging.log_level, "info");
    }

    #[test]
    fn test_urls_join_host_port_and_path() {
        let mut server = ServerConfig::default();
        assert_eq!(server.control_url(), "ws://127.0.0.1:8888");
        server.stream_path = "video".to_string();
        server.control_path = "/ctl".to_string();
        assert_eq!(server.stream_url(), "ws://127.0.0.1:8889/video");
        assert_eq!(server.control_url(), "ws://127.0.0.1:8888/ctl");
    }

    #[test]
    fn test_repeat_interval_has_a_floor() {
        let motion = MotionConfig {
            repeat_interval_ms: 0,
            ..MotionConfig::default()
        };
        assert_eq!(motion.repeat_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let cfg: ClientConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[server]
host = "rover.local"

[session]
preferred_rover = "B"
"#;

        // Act
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.server.host, "rover.local");
        assert_eq!(cfg.server.control_port, 8888);
        assert_eq!(cfg.session.preferred_rover.as_deref(), Some("B"));
        assert!(cfg.session.auto_select);
    }

    #[test]
    fn test_unset_optionals_are_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&ClientConfig::default()).expect("serialize");
        assert!(!toml_str.contains("subprotocol"));
        assert!(!toml_str.contains("preferred_rover"));
    }

    #[test]
    fn test_save_then_load_from_explicit_path() {
        // Arrange
        let path = temp_path("config.toml");
        let mut cfg = ClientConfig::default();
        cfg.server.subprotocol = Some("rover-v1".to_string());
        cfg.motion.initial_speed = 0.8;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let restored = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_key_overrides_table() {
        let toml_str = r#"
[motion.keys]
i = "forward"
"#;
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize keys");
        assert_eq!(cfg.motion.keys.get("i").map(String::as_str), Some("forward"));
        assert_eq!(cfg.motion.repeat_interval_ms, 750);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config_from(&temp_path("absent.toml")).expect("defaults");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        // Arrange
        let path = temp_path("bad.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
