//! Configuration for Prospector.
//!
//! Settings are read from `.prospector/prospector.toml` and layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".prospector/prospector.db"
//!
//! [logging]
//! level = "info"
//! format = "pretty"   # or "json"
//! file = ".prospector/logs/prospector.log"
//!
//! [board]
//! default_sort = "created_desc"
//! ```
//!
//! Environment overrides: `PROSPECTOR_PORT`, `PROSPECTOR_DB_PATH`, and
//! `PROSPECTOR_LOG` (an `EnvFilter` directive).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crm::listing::SortKey;
use crate::crm::server::ServerConfig;

pub const CONFIG_DIR: &str = ".prospector";
pub const CONFIG_FILE: &str = "prospector.toml";

pub const ENV_PORT: &str = "PROSPECTOR_PORT";
pub const ENV_DB_PATH: &str = "PROSPECTOR_DB_PATH";
pub const ENV_LOG: &str = "PROSPECTOR_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enables permissive CORS for a separately served UI.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Relative paths resolve against the project directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    format!("{}/prospector.db", CONFIG_DIR)
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// When set, logs go to this file instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_sort")]
    pub default_sort: String,
}

fn default_sort() -> String {
    SortKey::default().as_str().to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            default_sort: default_sort(),
        }
    }
}

/// The complete prospector.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProspectorToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub board: BoardSection,
}

impl ProspectorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse prospector.toml")
    }

    /// Load from `<config_dir>/prospector.toml`, or defaults if absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize prospector.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Board sort, falling back to the default for unknown keys.
    pub fn default_sort(&self) -> SortKey {
        self.board.default_sort.parse().unwrap_or_default()
    }

    /// Validate the configuration and return a list of warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.board.default_sort.parse::<SortKey>().is_err() {
            let valid: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
            warnings.push(format!(
                "Unknown board.default_sort '{}': expected one of {}",
                self.board.default_sort,
                valid.join(", ")
            ));
        }

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }

        if self.database.path.trim().is_empty() {
            warnings.push("database.path is empty".to_string());
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!(
                "Invalid logging.level '{}': expected a level or filter directive",
                self.logging.level
            ));
        }

        warnings
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ProspectorConfig {
    pub project_dir: PathBuf,
    /// Path to the .prospector directory
    pub config_dir: PathBuf,
    pub toml: ProspectorToml,
    pub verbose: bool,
}

impl ProspectorConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = ProspectorToml::load_or_default(&config_dir)?;

        Ok(Self {
            project_dir,
            config_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Port (env → file).
    pub fn port(&self) -> u16 {
        std::env::var(ENV_PORT)
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(self.toml.server.port)
    }

    /// Database path (env → file), resolved against the project directory.
    pub fn db_path(&self) -> PathBuf {
        let raw = std::env::var(ENV_DB_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.toml.database.path.clone());
        self.resolve(&raw)
    }

    /// Log file, if configured, resolved against the project directory.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.toml.logging.file.as_deref().map(|f| self.resolve(f))
    }

    /// Base filter directive when `PROSPECTOR_LOG` is unset.
    pub fn log_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.toml.logging.level
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.toml.server.host.clone(),
            port: self.port(),
            db_path: self.db_path(),
            dev_mode: self.toml.server.dev_mode,
            default_sort: self.toml.default_sort(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }
}
