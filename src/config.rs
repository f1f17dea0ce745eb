//! Configuration management for Starchain

use crate::identity::DEFAULT_VALIDATION_WINDOW;
use crate::star::MAX_STORY_BYTES;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_validation_window")]
    pub validation_window_secs: u64,
    #[serde(default = "default_max_story_bytes")]
    pub max_story_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            validation_window_secs: default_validation_window(),
            max_story_bytes: default_max_story_bytes(),
        }
    }
}

/// Load `config.toml` from the working directory, falling back to defaults when absent.
pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    load_config_from("config.toml")
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config = parse_config(&config_str)?;
    Ok(config)
}

/// Parse and validate a TOML document. An empty document yields the defaults.
pub fn parse_config(config_str: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(config_str)?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err("database.path must be set in config.toml".into());
    }

    if config.registry.validation_window_secs == 0 {
        return Err("registry.validation_window_secs must be greater than zero".into());
    }

    if config.registry.max_story_bytes == 0 {
        return Err("registry.max_story_bytes must be greater than zero".into());
    }

    Ok(config)
}

fn default_db_path() -> String {
    "./data/starchain.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_validation_window() -> u64 {
    DEFAULT_VALIDATION_WINDOW
}

fn default_max_story_bytes() -> usize {
    MAX_STORY_BYTES
}
