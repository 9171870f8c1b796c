use crate::model::session::TargetMode;
use crate::services::fetch::RemoteCache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where previews open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Embedded webview inside the editor
    #[default]
    Inapp,
    /// External system browser
    Browser,
}

impl PreviewMode {
    /// Target for a run: scripts run in the console harness when previewed in-app
    pub fn target_for(self, is_script: bool) -> TargetMode {
        match self {
            PreviewMode::Browser => TargetMode::Browser,
            PreviewMode::Inapp if is_script => TargetMode::InappConsole,
            PreviewMode::Inapp => TargetMode::FileRender,
        }
    }
}

impl std::str::FromStr for PreviewMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inapp" | "in-app" => Ok(PreviewMode::Inapp),
            "browser" => Ok(PreviewMode::Browser),
            other => Err(ConfigError::ValidationError(format!(
                "unknown preview mode '{other}' (expected inapp or browser)"
            ))),
        }
    }
}

/// Preview server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PreviewConfig {
    #[serde(default)]
    pub preview_mode: PreviewMode,

    /// Host name used in launch URLs
    #[serde(default = "default_host")]
    pub host: String,

    /// First port tried when starting a preview
    #[serde(default = "default_port")]
    pub port: u16,

    /// Consecutive ports tried before giving up
    #[serde(default = "default_max_port_attempts")]
    pub max_port_attempts: u16,

    /// Charset advertised for textual responses
    #[serde(default = "default_encoding")]
    pub default_encoding: String,

    /// Stylesheet served for rendered Markdown instead of the bundled one
    #[serde(default)]
    pub markdown_stylesheet: Option<PathBuf>,

    /// Serve the lightweight legacy console instead of the inspector
    #[serde(default = "default_false")]
    pub legacy_console: bool,

    /// Send `Cache-Control: no-store` with every response
    #[serde(default = "default_false")]
    pub disable_cache: bool,

    /// Directory holding copies of remote documents
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8158
}

fn default_max_port_attempts() -> u16 {
    32
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_false() -> bool {
    false
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            preview_mode: PreviewMode::default(),
            host: default_host(),
            port: default_port(),
            max_port_attempts: default_max_port_attempts(),
            default_encoding: default_encoding(),
            markdown_stylesheet: None,
            legacy_console: false,
            disable_cache: false,
            cache_dir: None,
        }
    }
}

impl PreviewConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: PreviewConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = self.to_json()?;
        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// JSON Schema of the configuration file
    pub fn schema_json() -> Result<String, ConfigError> {
        let schema = schemars::schema_for!(PreviewConfig);
        serde_json::to_string_pretty(&schema)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Effective cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(RemoteCache::default_dir)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "host cannot be empty".to_string(),
            ));
        }

        if self.max_port_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_port_attempts must be greater than 0".to_string(),
            ));
        }

        if self.default_encoding.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_encoding cannot be empty".to_string(),
            ));
        }

        if encoding_rs::Encoding::for_label(self.default_encoding.trim().as_bytes()).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "unknown default_encoding '{}'",
                self.default_encoding
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
