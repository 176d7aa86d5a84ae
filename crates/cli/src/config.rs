//! Configuration management for the `sqrl` tool.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/sqrl/config.toml`.
//!
//! Key material never lives here. Keys are passed per invocation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqrl_protocol::TransactionFlags;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("unknown transaction flag {0:?}, expected one of: {1}")]
    UnknownFlag(String, String),

    #[error("site must not be empty")]
    EmptySite,

    #[error("friendly_name must not be empty")]
    EmptyFriendlyName,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Defaults for the client side commands.
    pub client: ClientConfig,

    /// Defaults for the server side commands.
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Site identifier used when `--site` is not given.
    pub site: Option<String>,

    /// Authentication URI used by `login` when `--uri` is not given.
    pub signature_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Friendly name sent in every answer unless overridden.
    pub friendly_name: Option<String>,

    /// Flags always set by `answer`, by name (e.g. "ip-match").
    pub flags: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqrl")
        .join("config.toml")
}

/// Combine flag names into one flag set.
pub fn parse_flag_names<S: AsRef<str>>(names: &[S]) -> Result<TransactionFlags, ConfigError> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            TransactionFlags::from_flag_name(name).ok_or_else(|| {
                ConfigError::UnknownFlag(
                    name.to_string(),
                    TransactionFlags::flag_names().collect::<Vec<_>>().join(", "),
                )
            })
        })
        .collect()
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SQRL_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - SQRL_SITE: Override the default site identifier
    /// - SQRL_FRIENDLY_NAME: Override the server friendly name
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SQRL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(site) = std::env::var("SQRL_SITE") {
            if !site.is_empty() {
                tracing::info!("Overriding site from environment: {}", site);
                self.client.site = Some(site);
            }
        }

        if let Ok(name) = std::env::var("SQRL_FRIENDLY_NAME") {
            if !name.is_empty() {
                tracing::info!("Overriding friendly_name from environment: {}", name);
                self.server.friendly_name = Some(name);
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        if self.client.site.as_deref() == Some("") {
            return Err(ConfigError::EmptySite);
        }

        if self.server.friendly_name.as_deref() == Some("") {
            return Err(ConfigError::EmptyFriendlyName);
        }

        parse_flag_names(self.server.flags.as_slice())?;

        Ok(())
    }

    /// Flags configured for `answer`. Call [`Config::validate`] first.
    pub fn default_flags(&self) -> TransactionFlags {
        parse_flag_names(self.server.flags.as_slice()).unwrap_or_default()
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("SQRL_LOG_LEVEL");
        std::env::remove_var("SQRL_SITE");
        std::env::remove_var("SQRL_FRIENDLY_NAME");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.log_level, "info");
        assert!(config.client.site.is_none());
        assert!(config.client.signature_uri.is_none());
        assert!(config.server.friendly_name.is_none());
        assert!(config.server.flags.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[general]
log_level = "debug"

[client]
site = "sqrl-login.appspot.com"
signature_uri = "sqrl-login.appspot.com:443/sqrl/auth?nut=abc"

[server]
friendly_name = "Unit Test"
flags = ["ip-match", "sqrl-enabled"]
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.client.site.as_deref(), Some("sqrl-login.appspot.com"));
        assert_eq!(
            config.client.signature_uri.as_deref(),
            Some("sqrl-login.appspot.com:443/sqrl/auth?nut=abc")
        );
        assert_eq!(config.server.friendly_name.as_deref(), Some("Unit Test"));
        assert!(config.validate().is_ok());
        assert_eq!(
            config.default_flags(),
            TransactionFlags::IP_MATCH | TransactionFlags::SQRL_ENABLED
        );
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[general
log_level = "debug"
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
flags = "ip-match"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[general]
log_level = "warn"
color = true
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.general.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.general.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_flags() {
        let mut config = Config::default();
        config.server.flags = vec!["id-match".to_string(), "bogus".to_string()];

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFlag(ref name, _) if name == "bogus"));
        assert!(err.to_string().contains("account-creation-allowed"));
    }

    #[test]
    fn test_validate_empty_strings() {
        let mut config = Config::default();
        config.client.site = Some(String::new());
        assert_eq!(config.validate(), Err(ConfigError::EmptySite));

        let mut config = Config::default();
        config.server.friendly_name = Some(String::new());
        assert_eq!(config.validate(), Err(ConfigError::EmptyFriendlyName));
    }

    #[test]
    fn test_parse_flag_names() {
        assert_eq!(
            parse_flag_names::<&str>(&[]).unwrap(),
            TransactionFlags::empty()
        );
        assert_eq!(
            parse_flag_names(&["id-match", "user-logged-in"][..]).unwrap().bits(),
            0x11
        );
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.general.log_level = "warn".to_string();
        original.client.site = Some("example.com".to_string());
        original.server.flags = vec!["ip-match".to_string()];

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.server.friendly_name = Some("Unit Test".to_string());
        original.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("sqrl").join("config.toml");

        Config::default().save(&config_path).unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[general\n").unwrap();

        let err = format!("{:#}", Config::load(&config_path).unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("sqrl/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("SQRL_LOG_LEVEL", "debug");
        std::env::set_var("SQRL_SITE", "env.example");
        std::env::set_var("SQRL_FRIENDLY_NAME", "From Env");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.client.site.as_deref(), Some("env.example"));
        assert_eq!(config.server.friendly_name.as_deref(), Some("From Env"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("SQRL_SITE", "");

        let mut config = Config::default();
        config.client.site = Some("file.example".to_string());
        config.apply_env_overrides();

        // Empty string is ignored
        assert_eq!(config.client.site.as_deref(), Some("file.example"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());
    }
}
