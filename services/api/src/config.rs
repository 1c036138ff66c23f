use readaloud_core::{DEFAULT_ENDPOINT, OutputFormat, SessionConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub endpoint: String,
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
    pub default_format: OutputFormat,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let endpoint =
            std::env::var("READALOUD_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("wss://") && !endpoint.starts_with("ws://") {
            return Err(ConfigError::InvalidValue(
                "READALOUD_ENDPOINT".to_string(),
                format!("'{}' is not a WebSocket URL", endpoint),
            ));
        }

        let idle_timeout = seconds_var("IDLE_TIMEOUT_SECS", 10)?;
        let request_timeout = seconds_var("REQUEST_TIMEOUT_SECS", 10)?;

        let default_format = match std::env::var("DEFAULT_FORMAT") {
            Ok(value) => value
                .parse::<OutputFormat>()
                .map_err(|e| ConfigError::InvalidValue("DEFAULT_FORMAT".to_string(), e.to_string()))?,
            Err(_) => OutputFormat::default(),
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            endpoint,
            idle_timeout,
            request_timeout,
            default_format,
            log_level,
        })
    }

    /// The session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout,
            request_timeout: self.request_timeout,
            ..SessionConfig::default()
        }
    }
}

/// Reads a positive number of seconds, falling back to `default` when unset.
fn seconds_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a positive number of seconds", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("READALOUD_ENDPOINT");
            env::remove_var("IDLE_TIMEOUT_SECS");
            env::remove_var("REQUEST_TIMEOUT_SECS");
            env::remove_var("DEFAULT_FORMAT");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.default_format, OutputFormat::Audio24Khz48KBitRateMonoMp3);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("READALOUD_ENDPOINT", "ws://localhost:9000/readaloud");
            env::set_var("IDLE_TIMEOUT_SECS", "30");
            env::set_var("REQUEST_TIMEOUT_SECS", "5");
            env::set_var("DEFAULT_FORMAT", "webm-24khz-16bit-mono-opus");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.endpoint, "ws://localhost:9000/readaloud");
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.default_format, OutputFormat::Webm24Khz16BitMonoOpus);
        assert_eq!(config.log_level, Level::DEBUG);

        let session = config.session_config();
        assert_eq!(session.idle_timeout, Duration::from_secs(30));
        assert_eq!(session.request_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "BIND_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("READALOUD_ENDPOINT", "https://speech.example.com/");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "READALOUD_ENDPOINT");
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeouts() {
        for value in ["0", "-3", "soon"] {
            clear_env_vars();
            unsafe {
                env::set_var("REQUEST_TIMEOUT_SECS", value);
            }

            let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
            assert_eq!(var, "REQUEST_TIMEOUT_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_config_unknown_default_format() {
        clear_env_vars();
        unsafe {
            env::set_var("DEFAULT_FORMAT", "audio-8khz-wav");
        }

        let ConfigError::InvalidValue(var, msg) = Config::from_env().unwrap_err();
        assert_eq!(var, "DEFAULT_FORMAT");
        assert!(msg.contains("audio-8khz-wav"));
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "RUST_LOG");
    }
}
