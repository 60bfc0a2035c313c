// ============================================
// File: crates/riffle-portal/src/config.rs
// ============================================
//! # Portal Configuration
//!
//! ## Creation Reason
//! Provides configuration management for a portal host, loaded from a
//! TOML file.
//!
//! ## Main Functionality
//! - `PortalConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Conversion into runtime `PortalSettings` and `TlsMaterial`
//!
//! ## Configuration Sections
//! - `network`: Listen address
//! - `tls`: CA bundle, certificate, key, expected server name
//! - `limits`: Handshake/initialize timeouts, frame size
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:8016"
//!
//! [tls]
//! ca_file = "/etc/riffle/ca.pem"
//! cert_file = "/etc/riffle/node.pem"
//! key_file = "/etc/riffle/node.key"
//! server_name = "riffle.local"
//!
//! [limits]
//! handshake_timeout_secs = 30
//! initialize_timeout_secs = 30
//! max_frame_size = 16777216
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `key_file` is optional; without it the key is read from `cert_file`
//! - All config changes require a restart
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use riffle_core::protocol::DEFAULT_MAX_FRAME_SIZE;
use riffle_core::TlsMaterial;

use crate::error::{PortalError, Result};
use crate::services::{PortalSettings, DEFAULT_SERVER_NAME};

/// Default Riffle port.
pub const DEFAULT_PORT: u16 = 8016;

// ============================================
// PortalConfig
// ============================================

/// Main portal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// TLS material locations.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Timeouts and size limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PortalConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PortalError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| PortalError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string.
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PortalError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.tls.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns listen address.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.network.listen_addr
    }

    /// Runtime settings for `Portal::new`.
    #[must_use]
    pub fn settings(&self) -> PortalSettings {
        PortalSettings {
            handshake_timeout: Duration::from_secs(self.limits.handshake_timeout_secs),
            initialize_timeout: Duration::from_secs(self.limits.initialize_timeout_secs),
            max_frame_size: self.limits.max_frame_size,
            server_name: self.tls.server_name.clone(),
        }
    }

    /// Reads the configured CA, certificate and key.
    ///
    /// # Errors
    /// Returns `Protocol(PemLoad)` naming the unreadable file.
    pub async fn material(&self) -> Result<TlsMaterial> {
        let material = TlsMaterial::load(
            &self.tls.ca_file,
            &self.tls.cert_file,
            self.tls.key_file.as_deref(),
        )
        .await?;
        Ok(material)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

// ============================================
// TlsConfig
// ============================================

/// TLS material section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of the shared CA.
    #[serde(default = "default_ca_file")]
    pub ca_file: PathBuf,

    /// PEM certificate chain of this node, leaf first.
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,

    /// PEM private key; read from `cert_file` when absent.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Name expected in the certificate of peers we dial.
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

fn default_ca_file() -> PathBuf {
    PathBuf::from("/etc/riffle/ca.pem")
}

fn default_cert_file() -> PathBuf {
    PathBuf::from("/etc/riffle/node.pem")
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

impl TlsConfig {
    fn validate(&self) -> Result<()> {
        if self.ca_file.as_os_str().is_empty() {
            return Err(PortalError::config_invalid("tls.ca_file", "cannot be empty"));
        }
        if self.cert_file.as_os_str().is_empty() {
            return Err(PortalError::config_invalid("tls.cert_file", "cannot be empty"));
        }
        if self.server_name.is_empty() {
            return Err(PortalError::config_invalid("tls.server_name", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_file: default_ca_file(),
            cert_file: default_cert_file(),
            key_file: None,
            server_name: default_server_name(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Timeouts and size limits section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Bound on TLS plus login, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Bound on an avatar's `initialize`, in seconds.
    #[serde(default = "default_initialize_timeout")]
    pub initialize_timeout_secs: u64,

    /// Largest accepted frame body in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_initialize_timeout() -> u64 {
    30
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.handshake_timeout_secs == 0 {
            return Err(PortalError::config_invalid(
                "limits.handshake_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.initialize_timeout_secs == 0 {
            return Err(PortalError::config_invalid(
                "limits.initialize_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.max_frame_size < 1024 {
            return Err(PortalError::config_invalid(
                "limits.max_frame_size",
                "must be at least 1024",
            ));
        }

        if u32::try_from(self.max_frame_size).is_err() {
            return Err(PortalError::config_invalid(
                "limits.max_frame_size",
                "cannot exceed u32::MAX",
            ));
        }

        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            initialize_timeout_secs: default_initialize_timeout(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().port(), 8016);
        assert_eq!(config.tls.server_name, "riffle.local");
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:9016"

            [tls]
            ca_file = "/srv/pki/ca.pem"
            cert_file = "/srv/pki/pdserver.pem"
            key_file = "/srv/pki/pdserver.key"
            server_name = "pd.example"

            [limits]
            handshake_timeout_secs = 10
            initialize_timeout_secs = 5
            max_frame_size = 65536

            [logging]
            level = "debug"
        "#;

        let config = PortalConfig::from_str(toml).unwrap();
        assert_eq!(config.listen_addr().port(), 9016);
        assert_eq!(config.tls.key_file.as_deref(), Some(Path::new("/srv/pki/pdserver.key")));
        assert_eq!(config.logging.level, "debug");

        let settings = config.settings();
        assert_eq!(settings.handshake_timeout, Duration::from_secs(10));
        assert_eq!(settings.initialize_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_frame_size, 65536);
        assert_eq!(settings.server_name, "pd.example");
    }

    #[test]
    fn test_sections_are_optional() {
        let config = PortalConfig::from_str("[tls]\ncert_file = \"/tmp/node.pem\"\n").unwrap();
        assert_eq!(config.tls.cert_file, PathBuf::from("/tmp/node.pem"));
        assert!(config.tls.key_file.is_none());
        assert_eq!(config.limits.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_invalid_limits() {
        let err = PortalConfig::from_str("[limits]\nhandshake_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(
            err,
            PortalError::ConfigInvalid { ref field, .. } if field == "limits.handshake_timeout_secs"
        ));

        let err = PortalConfig::from_str("[limits]\nmax_frame_size = 10\n").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unparseable_config() {
        let err = PortalConfig::from_str("[network]\nlisten_addr = \"not an address\"\n").unwrap_err();
        assert!(matches!(err, PortalError::ConfigLoad { .. }));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PortalConfig::default();
        let reparsed = PortalConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(reparsed.listen_addr(), config.listen_addr());
        assert_eq!(reparsed.tls.ca_file, config.tls.ca_file);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = PortalConfig::load("/nonexistent/riffle/portal.toml").await.unwrap_err();
        assert!(matches!(err, PortalError::ConfigLoad { .. }));
        assert!(err.is_fatal());
    }
}
