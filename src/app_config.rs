use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

// Application configuration module
// This module handles the application configuration including loading,
// validating and saving configuration settings.

/// Built-in model used when neither the session field nor the preferences name one
pub const DEFAULT_MODEL: &str = "translategemma:4b";

/// Built-in target language used when nothing else is set
pub const DEFAULT_TARGET_LANGUAGE: &str = "Japanese";

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Model used when no preference has been saved yet
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Target language used when no preference has been saved yet
    #[serde(default = "default_target_language")]
    pub default_target_language: String,

    /// Streaming backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Preference file location, `<config dir>/ollama-translator/preferences.json` when unset
    #[serde(default)]
    pub preferences_path: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Ollama backend configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    // @field: Service URL
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    // @field: Connect timeout seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    // @field: How long Ollama keeps the model loaded
    #[serde(default)]
    pub keep_alive: Option<String>,

    // @field: Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
            keep_alive: None,
            temperature: None,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching filter for the log facade
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_target_language() -> String {
    DEFAULT_TARGET_LANGUAGE.to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.default_model.trim().is_empty() {
            return Err(anyhow!("Default model must not be blank"));
        }

        if self.default_target_language.trim().is_empty() {
            return Err(anyhow!("Default target language must not be blank"));
        }

        let endpoint = Url::parse(&self.backend.endpoint)
            .with_context(|| format!("Invalid backend endpoint: {}", self.backend.endpoint))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(anyhow!(
                "Backend endpoint must use http or https: {}",
                self.backend.endpoint
            ));
        }

        if self.backend.connect_timeout_secs == 0 {
            return Err(anyhow!("Connect timeout must be greater than zero"));
        }

        if let Some(temperature) = self.backend.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow!("Temperature must be between 0.0 and 2.0, got {}", temperature));
            }
        }

        Ok(())
    }

    /// Load the configuration at `path`, writing a default one first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve where preferences are persisted
    pub fn resolve_preferences_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.preferences_path {
            return Ok(path.clone());
        }

        let base = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine the user configuration directory"))?;
        Ok(base.join("ollama-translator").join("preferences.json"))
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            default_model: default_model(),
            default_target_language: default_target_language(),
            backend: BackendConfig::default(),
            preferences_path: None,
            log_level: LogLevel::default(),
        }
    }
}
