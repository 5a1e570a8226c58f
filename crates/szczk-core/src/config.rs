//! Configuration module for the Szczk Cloud adapter.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

/// Adapter construction parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// API key issued by the service.
    pub api_key: String,
    /// API secret paired with `api_key`. Never logged.
    pub api_secret: String,
    /// Identifier of the container mounted at `/`.
    #[serde(default = "default_root_folder_id")]
    pub root_folder_id: String,
    /// Base URL of the authentication service.
    pub auth_url: String,
    /// Base URL of the file service.
    pub base_url: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

fn default_root_folder_id() -> String {
    "root".to_string()
}

impl DriverConfig {
    /// `auth_url` without trailing slashes.
    pub fn auth_base(&self) -> &str {
        self.auth_url.trim_end_matches('/')
    }

    /// `base_url` without trailing slashes.
    pub fn file_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl std::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("root_folder_id", &self.root_folder_id)
            .field("auth_url", &self.auth_url)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/szczk/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("szczk")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            root_folder_id: default_root_folder_id(),
            auth_url: String::new(),
            base_url: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"driver.base_url"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- driver ---
        let required = [
            ("driver.api_key", &self.driver.api_key),
            ("driver.api_secret", &self.driver.api_secret),
            ("driver.root_folder_id", &self.driver.root_folder_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            }
        }

        for (field, value) in [
            ("driver.auth_url", &self.driver.auth_url),
            ("driver.base_url", &self.driver.base_url),
        ] {
            if let Err(message) = check_http_url(value) {
                errors.push(ValidationError {
                    field: field.into(),
                    message,
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

fn check_http_url(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    let parsed = url::Url::parse(value).map_err(|e| format!("invalid URL '{value}': {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!(
            "unsupported scheme '{}'; expected http or https",
            parsed.scheme()
        ));
    }
    if parsed.host_str().is_none() {
        return Err(format!("URL has no host: {value}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use szczk_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_key("key")
///     .api_secret("secret")
///     .auth_url("https://auth.example.com")
///     .base_url("https://files.example.com")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- driver ---

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.driver.api_key = key.into();
        self
    }

    pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.driver.api_secret = secret.into();
        self
    }

    pub fn root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.driver.root_folder_id = id.into();
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.config.driver.auth_url = url.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.driver.base_url = url.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
