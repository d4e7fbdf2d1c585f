use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use common::schema::{ContainerDecl, MemorySchema, SchemaError, SchemaFile, ValueDecl};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7420";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Daemon configuration, usually read from `statetree.toml`
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// address the sync server listens on
    pub listen_addr: SocketAddr,
    /// default log level, `RUST_LOG` overrides it
    pub log_level: String,
    /// directory for daily rolling log files,
    ///  logs go to stdout only if not set
    pub log_dir: Option<PathBuf>,
    /// schema file with `[[value]]` and `[[container]]` tables
    pub schema: Option<PathBuf>,

    // inline declarations, these take precedence over the schema file
    #[serde(rename = "value")]
    pub values: Vec<ValueDecl>,
    #[serde(rename = "container")]
    pub containers: Vec<ContainerDecl>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7420)),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
            schema: None,
            values: Vec::new(),
            containers: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid log level: {0}")]
    LogLevel(String),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.log_level()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;

        // a relative schema path is relative to the config file
        if let (Some(schema), Some(dir)) = (config.schema.as_mut(), path.parent()) {
            if schema.is_relative() {
                *schema = dir.join(&*schema);
            }
        }
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    /// The inline declarations followed by the schema file, if any
    pub fn schema(&self) -> Result<MemorySchema, ConfigError> {
        let inline = MemorySchema::from_file(&SchemaFile {
            values: self.values.clone(),
            containers: self.containers.clone(),
        })?;
        match &self.schema {
            Some(path) => Ok(inline.extend(MemorySchema::load(path)?)),
            None => Ok(inline),
        }
    }
}
