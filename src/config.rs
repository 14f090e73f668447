use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::processing::RunnerSettings;

const DEFAULT_CHUNK_MAX_CHARACTERS: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 0;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Chunk defaults describe a window that never advances.
    #[error(
        "DOCFLOW_CHUNK_OVERLAP ({overlap}) must be smaller than DOCFLOW_CHUNK_MAX_CHARACTERS ({max_characters})"
    )]
    InvalidChunkDefaults {
        /// Configured default window size.
        max_characters: usize,
        /// Configured default overlap.
        overlap: usize,
    },
}

/// Runtime configuration for the docflow server and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Chunk size applied when a chunk node leaves it unset.
    pub chunk_max_characters: usize,
    /// Chunk overlap applied when a chunk node leaves it unset.
    pub chunk_overlap: usize,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Directory for materialized uploads; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            server_port: parse_optional(&optional, "SERVER_PORT")?,
            chunk_max_characters: parse_optional(&optional, "DOCFLOW_CHUNK_MAX_CHARACTERS")?
                .unwrap_or(DEFAULT_CHUNK_MAX_CHARACTERS),
            chunk_overlap: parse_optional(&optional, "DOCFLOW_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            max_upload_bytes: parse_optional(&optional, "DOCFLOW_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            temp_dir: optional("DOCFLOW_TEMP_DIR").map(PathBuf::from),
        };

        if config.chunk_overlap >= config.chunk_max_characters {
            return Err(ConfigError::InvalidChunkDefaults {
                max_characters: config.chunk_max_characters,
                overlap: config.chunk_overlap,
            });
        }
        Ok(config)
    }

    /// Engine settings derived from this configuration.
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            default_chunk_max_characters: self.chunk_max_characters,
            default_chunk_overlap: self.chunk_overlap,
            temp_dir: self.temp_dir.clone(),
        }
    }
}

fn parse_optional<T, F>(optional: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        server_port = ?config.server_port,
        chunk_max_characters = config.chunk_max_characters,
        chunk_overlap = config.chunk_overlap,
        max_upload_bytes = config.max_upload_bytes,
        temp_dir = ?config.temp_dir,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
