use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

pub const ENV_BIND_ADDR: &str = "ESCOLA_GOALS_BIND_ADDR";
pub const ENV_LOG_FILTER: &str = "ESCOLA_GOALS_LOG_FILTER";
pub const ENV_LOG_FORMAT: &str = "ESCOLA_GOALS_LOG_FORMAT";
pub const ENV_STORE_PATH: &str = "ESCOLA_GOALS_STORE_PATH";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "ESCOLA_GOALS_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub log_format: LogFormat,
    pub goal_store_path: Option<PathBuf>,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ESCOLA_GOALS_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid ESCOLA_GOALS_LOG_FORMAT value '{value}': expected 'pretty' or 'json'")]
    InvalidLogFormat { value: String },
    #[error("invalid ESCOLA_GOALS_REQUEST_TIMEOUT_MS value '{value}': {source}")]
    InvalidRequestTimeout {
        value: String,
        source: std::num::ParseIntError,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw =
            env_non_empty(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter =
            env_non_empty(ENV_LOG_FILTER).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_format = match env_non_empty(ENV_LOG_FORMAT) {
            Some(value) => {
                LogFormat::parse(&value).ok_or(ConfigError::InvalidLogFormat { value })?
            }
            None => LogFormat::Pretty,
        };

        let goal_store_path = env_non_empty(ENV_STORE_PATH).map(PathBuf::from);

        let request_timeout = match env_non_empty(ENV_REQUEST_TIMEOUT_MS) {
            Some(value) => {
                let millis = value.parse::<u64>().map_err(|source| {
                    ConfigError::InvalidRequestTimeout {
                        value: value.clone(),
                        source,
                    }
                })?;
                Duration::from_millis(millis.max(1))
            }
            None => Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        Ok(Self {
            bind_addr,
            log_filter,
            log_format,
            goal_store_path,
            request_timeout,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            log_format: LogFormat::Pretty,
            goal_store_path: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
