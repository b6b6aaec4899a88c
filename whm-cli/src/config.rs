use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use whm_core::sync::{Endpoints, DEFAULT_MOVEMENT_ENDPOINT, DEFAULT_PRODUCT_ENDPOINT};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_product_endpoint() -> String {
    DEFAULT_PRODUCT_ENDPOINT.to_string()
}

fn default_movement_endpoint() -> String {
    DEFAULT_MOVEMENT_ENDPOINT.to_string()
}

/// Backend server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL (e.g., "https://openboxes.example.com/openboxes")
    pub base_url: Option<String>,
    /// Product lookup path; the product id is appended
    #[serde(default = "default_product_endpoint")]
    pub product_endpoint: String,
    /// Path stock movements are POSTed to
    #[serde(default = "default_movement_endpoint")]
    pub movement_endpoint: String,
    /// Deliver queued movements before read commands (default: false)
    #[serde(default)]
    pub auto_sync: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            product_endpoint: default_product_endpoint(),
            movement_endpoint: default_movement_endpoint(),
            auto_sync: false,
        }
    }
}

impl ServerConfig {
    /// Returns true if a server URL is set
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            products: self.product_endpoint.clone(),
            movements: self.movement_endpoint.clone(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database holding the product cache and outbox
    pub database_path: ConfigValue<PathBuf>,
    /// Path to the preference file holding the active credential
    pub preferences_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Server configuration
    pub server: ServerConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    preferences_path: Option<PathBuf>,
    server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("whm.db"),
            ConfigSource::Default,
        );
        let mut preferences_path = ConfigValue::new(
            Self::default_config_dir().join("preferences.yaml"),
            ConfigSource::Default,
        );
        let mut config_file = None;
        let mut server = ServerConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(prefs_path) = file_config.preferences_path {
                preferences_path =
                    ConfigValue::new(resolve(&path, prefs_path), ConfigSource::File);
            }
            if let Some(server_config) = file_config.server {
                server = server_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("WHM_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(prefs_path) = std::env::var("WHM_PREFERENCES_PATH") {
            preferences_path =
                ConfigValue::new(PathBuf::from(prefs_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("WHM_SERVER_URL") {
            server.base_url = Some(url);
        }

        Ok(Self {
            database_path,
            preferences_path,
            config_file,
            server,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/whm/
    /// - macOS: ~/Library/Application Support/whm/
    /// - Windows: %APPDATA%/whm/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("whm")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/whm/
    /// - macOS: ~/Library/Application Support/whm/
    /// - Windows: %APPDATA%/whm/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("whm")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve(config_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
