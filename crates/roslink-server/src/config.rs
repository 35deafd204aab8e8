//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (ROSLINK_HOST, ROSLINK_PORT, ROSLINK_UPSTREAM)
//! - TOML configuration file

use anyhow::{Context, Result};
use roslink_core::{Generation, SessionConfig};
use roslink_protocol::codec::MAX_MESSAGE_SIZE;
use roslink_transport::WebSocketConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the rosbridge WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// The Foxglove WebSocket server every session connects to.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Per-session behavior.
    #[serde(default)]
    pub session: SessionSettings,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Upstream connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Server URL.
    #[serde(default = "default_upstream")]
    pub url: String,

    /// Connect and handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum upstream message size in bytes.
    #[serde(default = "default_upstream_message_size")]
    pub max_message_size: usize,
}

/// Session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// `ros1` or `ros2`; inferred from the server when unset.
    #[serde(default)]
    pub generation: Option<String>,

    /// Service call timeout in milliseconds; calls wait forever when unset.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum size of a client verb in bytes.
    #[serde(default = "default_max_verb_size")]
    pub max_verb_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    std::env::var("ROSLINK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("ROSLINK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9090)
}

fn default_upstream() -> String {
    std::env::var("ROSLINK_UPSTREAM").unwrap_or_else(|_| "ws://127.0.0.1:8765".to_string())
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_upstream_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

fn default_max_sessions() -> usize {
    1_000
}

fn default_max_verb_size() -> usize {
    16 * 1024 * 1024
}

fn default_metrics_port() -> u16 {
    9191
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            websocket_path: default_ws_path(),
            upstream: UpstreamConfig::default(),
            session: SessionSettings::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream(),
            connect_timeout_ms: default_connect_timeout(),
            max_message_size: default_upstream_message_size(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_verb_size: default_max_verb_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "roslink.toml",
            "/etc/roslink/roslink.toml",
            "~/.config/roslink/roslink.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.session_config()?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Transport settings for upstream connections.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: self.upstream.max_message_size,
            connect_timeout: Duration::from_millis(self.upstream.connect_timeout_ms),
        }
    }

    /// Settings for each session.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown generation name.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let generation = match self.session.generation.as_deref() {
            None => None,
            Some("ros1") => Some(Generation::Ros1),
            Some("ros2") => Some(Generation::Ros2),
            Some(other) => anyhow::bail!("Unknown ROS generation {other:?}, expected ros1 or ros2"),
        };
        Ok(SessionConfig {
            generation,
            call_timeout: self.session.call_timeout_ms.map(Duration::from_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.websocket_path, "/ws");
        assert!(config.metrics.enabled);
        assert!(config.session.generation.is_none());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 9000);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [upstream]
            url = "ws://robot:8765"
            connect_timeout_ms = 2500

            [session]
            generation = "ros1"
            call_timeout_ms = 5000

            [limits]
            max_sessions = 8
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.upstream.url, "ws://robot:8765");
        assert_eq!(config.limits.max_sessions, 8);
        assert_eq!(config.metrics.port, 9191);

        let session = config.session_config().unwrap();
        assert_eq!(session.generation, Some(Generation::Ros1));
        assert_eq!(session.call_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            config.websocket_config().connect_timeout,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_unknown_generation() {
        let config: Config = toml::from_str("[session]\ngeneration = \"ros3\"").unwrap();
        assert!(config.session_config().is_err());
    }
}
