use clap::Parser;
use lib_ais::core::config::{DEFAULT_AIS_WS_URL, DEFAULT_BUFFER_CAPACITY, DEFAULT_STATUS_WINDOW};
use lib_ais::StreamConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "server_ais.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "AIS Stream proxy for the maritime dashboard", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AIS_PORT", help = "Port to listen on for HTTP clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "AIS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AIS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AIS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "AIS_WS_URL", help = "Upstream AIS Stream websocket URL.")]
    pub ais_ws_url: Option<String>,

    #[clap(long, env = "AIS_BUFFER_CAPACITY", help = "Messages kept per connection.")]
    pub buffer_capacity: Option<usize>,

    #[clap(long, env = "AIS_STATUS_WINDOW", help = "Messages returned by a single-connection status query.")]
    pub status_window: Option<usize>,

    #[clap(long, env = "AIS_CORS_ALLOW_ANY", help = "Allow cross-origin requests from any origin (true/false).")]
    pub cors_allow_any: Option<bool>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            ais_ws_url: other.ais_ws_url.or(self.ais_ws_url),
            buffer_capacity: other.buffer_capacity.or(self.buffer_capacity),
            status_window: other.status_window.or(self.status_window),
            cors_allow_any: other.cors_allow_any.or(self.cors_allow_any),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(9003),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ais_ws_url: Some(DEFAULT_AIS_WS_URL.to_string()),
            buffer_capacity: Some(DEFAULT_BUFFER_CAPACITY),
            status_window: Some(DEFAULT_STATUS_WINDOW),
            cors_allow_any: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bufferCapacity must be at least 1")]
    ZeroCapacity,

    #[error("statusWindow must be between 1 and bufferCapacity ({capacity}), got {window}")]
    StatusWindow { window: usize, capacity: usize },

    #[error("aisWsUrl is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("aisWsUrl must use ws or wss, got {0}")]
    UnsupportedScheme(String),
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub cors_allow_any: bool,
    pub stream: StreamConfig,
}

impl TryFrom<Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        let defaults = Config::defaults();
        let config = defaults.merge(config);

        let buffer_capacity = config.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY);
        if buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let status_window = config.status_window.unwrap_or(DEFAULT_STATUS_WINDOW);
        if status_window == 0 || status_window > buffer_capacity {
            return Err(ConfigError::StatusWindow {
                window: status_window,
                capacity: buffer_capacity,
            });
        }

        let ws_url = config
            .ais_ws_url
            .unwrap_or_else(|| DEFAULT_AIS_WS_URL.to_string());
        let parsed = Url::parse(&ws_url)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        Ok(Settings {
            port: config.port.unwrap_or(9003),
            log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            cors_allow_any: config.cors_allow_any.unwrap_or(true),
            stream: StreamConfig {
                ws_url,
                buffer_capacity,
                status_window,
            },
        })
    }
}

/// Parses CLI and environment, then resolves against the config file and defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    resolve_config(Config::parse())
}

/// Layers, lowest first: built-in defaults, the JSON config file, CLI/env.
pub fn resolve_config(cli_args: Config) -> Result<Settings, ConfigError> {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file (server_ais.conf) if present.
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file: {} ({}). Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file: {} ({}). Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments
    current_config = current_config.merge(cli_args);

    Settings::try_from(current_config)
}
