//! Application configuration loaded from environment variables.

use std::time::Duration;

use event_bus::{DEFAULT_MAX_LEN, RouterConfig};
use thiserror::Error;

/// A configuration variable holds a value that cannot be parsed.
#[derive(Debug, Error)]
#[error("Invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `0.0.0.0`) and `PORT` (default `3000`)
/// - `RUST_LOG` (default `info`) and `LOG_FORMAT` (`text` or `json`)
/// - `DATABASE_URL`: Postgres ledger; unset means the in-memory ledger
/// - `MACHINE_ID` (default `1`): id generator machine id
/// - `RESULT_STREAM_MAXLEN` (default `5000`)
/// - `HANDLER_TIMEOUT_SECS` (default `15`), `MAX_RETRIES` (default `3`),
///   `RETRY_INITIAL_MS` (default `100`), `CONCURRENCY_LIMIT` (default `64`)
/// - `AUTH_TOKENS`: `token:userId` pairs separated by commas
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub machine_id: u16,
    pub result_stream_max_len: usize,
    pub handler_timeout: Duration,
    pub max_retries: usize,
    pub retry_initial_delay: Duration,
    pub concurrency_limit: usize,
    pub auth_tokens: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json".into(),
                });
            }
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: get("DATABASE_URL"),
            machine_id: parse(&get, "MACHINE_ID")?.unwrap_or(defaults.machine_id),
            result_stream_max_len: parse(&get, "RESULT_STREAM_MAXLEN")?
                .unwrap_or(defaults.result_stream_max_len),
            handler_timeout: parse(&get, "HANDLER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.handler_timeout),
            max_retries: parse(&get, "MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_initial_delay: parse(&get, "RETRY_INITIAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_initial_delay),
            concurrency_limit: parse(&get, "CONCURRENCY_LIMIT")?
                .unwrap_or(defaults.concurrency_limit),
            auth_tokens: get("AUTH_TOKENS"),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Router delivery policy derived from this configuration.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            handler_timeout: self.handler_timeout,
            max_retries: self.max_retries,
            retry_initial_delay: self.retry_initial_delay,
            concurrency_limit: self.concurrency_limit,
            ..RouterConfig::default()
        }
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            machine_id: 1,
            result_stream_max_len: DEFAULT_MAX_LEN,
            handler_timeout: router.handler_timeout,
            max_retries: router.max_retries,
            retry_initial_delay: router.retry_initial_delay,
            concurrency_limit: router.concurrency_limit,
            auth_tokens: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.machine_id, 1);
        assert_eq!(config.result_stream_max_len, 5000);
        assert_eq!(config.handler_timeout, Duration::from_secs(15));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_initial_delay, Duration::from_millis(100));
        assert_eq!(config.concurrency_limit, 64);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("HANDLER_TIMEOUT_SECS", "2"),
            ("MAX_RETRIES", "5"),
            ("RESULT_STREAM_MAXLEN", "100"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.result_stream_max_len, 100);

        let router = config.router_config();
        assert_eq!(router.handler_timeout, Duration::from_secs(2));
        assert_eq!(router.max_retries, 5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = from_pairs(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.key, "PORT");
        assert!(from_pairs(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
