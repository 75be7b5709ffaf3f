//! Configuration loaded from `dlcall.toml`
//!
//! ```toml
//! [call]
//! default_abi = "default"
//! cache_descriptors = true
//!
//! [logging]
//! level = "debug"
//! json = false
//! file = "dlcall.log"
//! spans = false
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::interop::AbiName;
use crate::logging::{self, parse_level, LogConfig};

pub const CONFIG_FILE_NAME: &str = "dlcall.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub call: CallConfig,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    #[serde(default)]
    pub default_abi: AbiName,

    /// Share one prepared descriptor per distinct signature
    #[serde(default = "default_true")]
    pub cache_descriptors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub spans: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_abi: AbiName::Default,
            cache_descriptors: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_level() -> String { "info".to_string() }

impl LoggingSection {
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = parse_level(&self.level)
            .ok_or_else(|| ConfigError::InvalidLevel(self.level.clone()))?;
        Ok(LogConfig {
            level,
            file_output: self.file.is_some(),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
        })
    }
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Nearest `dlcall.toml` in `start` or one of its parents
    pub fn find(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load the nearest `dlcall.toml`, or defaults when there is none
    pub fn find_and_load(start: &Path) -> Result<Self, ConfigError> {
        match Self::find(start) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Install logging as described by the `[logging]` section
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        logging::init_with_config(self.logging.to_log_config()?);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse(String),
    InvalidLevel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "Failed to read config {}: {}", path.display(), message)
            }
            Self::Parse(message) => write!(f, "Failed to parse config: {}", message),
            Self::InvalidLevel(level) => write!(f, "Unknown log level '{}'", level),
        }
    }
}

impl std::error::Error for ConfigError {}
