//! Configuration file handling.
//!
//! This module provides loading and saving of sockscan configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/sockscan/config.toml`
//! - macOS: `~/Library/Application Support/sockscan/config.toml`
//! - Windows: `%APPDATA%\sockscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! default_format = "table"
//!
//! [ignore]
//! packages = ["left-pad", "@internal/*"]
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration.
///
/// Loaded from a TOML file, or created with default values when no file
/// exists. Endpoint overrides are mainly useful for pointing a scan at a
/// staging deployment or a local mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    pub default_format: String,

    /// Override for the authenticated advisory API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Override for the unauthenticated firewall endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_base_url: Option<String>,

    /// Ignore list for suppressing known-accepted packages.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Packages excluded from scanning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to skip. A trailing `*` matches any suffix
    /// (e.g. `@internal/*`).
    pub packages: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be excluded from the scan.
    pub fn should_ignore(&self, name: &str) -> bool {
        self.packages
            .iter()
            .any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => pattern == name,
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_format: "table".to_string(),
            api_base_url: None,
            firewall_base_url: None,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sockscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
