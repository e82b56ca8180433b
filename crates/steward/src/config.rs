//! Gateway configuration.
//!
//! Everything is fixed at process start. A TOML file may override any
//! subset of the defaults:
//!
//! ```toml
//! allowed_roots = ["/home/me/sandbox", "/home/me/Documents/SafeZone"]
//! allowed_commands = ["ls", "echo", "date"]
//! sandbox_root = "/home/me/sandbox"
//! folder_opener = "xdg-open"
//!
//! [limits]
//! timeout_ms = 5000
//!
//! [applications]
//! notepad = "gedit"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::ExecutionLimits;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// The originating error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`GatewayConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Directories file operations may touch (the roots and everything below).
    pub allowed_roots: Vec<PathBuf>,
    /// Programs shell commands may start with.
    pub allowed_commands: Vec<String>,
    /// Where relative paths in built-in commands are rooted.
    pub sandbox_root: PathBuf,
    /// Shell execution limits.
    pub limits: ExecutionLimits,
    /// Executables behind the built-in application names.
    pub applications: Applications,
    /// Program used by `open folder <path>`. Must be in `allowed_commands`.
    pub folder_opener: String,
    /// SQLite file for interaction history.
    pub history_db: PathBuf,
    /// Explanation backend settings.
    pub explainer: ExplainerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_roots: vec![PathBuf::from("sandbox")],
            allowed_commands: [
                "dir", "ls", "echo", "whoami", "date", "time", "notepad", "calc", "explorer",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sandbox_root: PathBuf::from("sandbox"),
            limits: ExecutionLimits::default(),
            applications: Applications::default(),
            folder_opener: "explorer".to_string(),
            history_db: PathBuf::from("history.db"),
            explainer: ExplainerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Root the sandbox at `root` and make it the only allowed root.
    pub fn sandboxed(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.allowed_roots = vec![root.clone()];
        self.sandbox_root = root;
        self
    }
}

/// Executables behind the fixed application names understood by `open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Applications {
    /// Text editor.
    pub notepad: String,
    /// Calculator.
    pub calc: String,
    /// File browser.
    pub explorer: String,
}

impl Default for Applications {
    fn default() -> Self {
        Self {
            notepad: "notepad".to_string(),
            calc: "calc".to_string(),
            explorer: "explorer".to_string(),
        }
    }
}

impl Applications {
    /// Map a requested name to an executable by substring, checking
    /// notepad, calc, then explorer.
    pub fn resolve(&self, requested: &str) -> Option<&str> {
        [
            ("notepad", &self.notepad),
            ("calc", &self.calc),
            ("explorer", &self.explorer),
        ]
        .into_iter()
        .find(|(key, _)| requested.contains(key))
        .map(|(_, exe)| exe.as_str())
    }
}

/// Settings for the Gemini explanation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Model name.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the API base URL.
    pub base_url: Option<String>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: None,
        }
    }
}

impl ExplainerConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// Unset and empty are both treated as absent.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
