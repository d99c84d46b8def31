use crate::backend::BackendClient;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidVar(String, String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub backend_url: String,
    pub telegram_api_url: String,
    pub webhook_port: u16,
    pub session_ttl_secs: u64,
    pub error_channel_id: Option<i64>,
    pub log_level: String,
    pub skip_email_enabled: bool,
    pub update_mode_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bot_token: required_var("BOT_TOKEN")?,
            backend_url: required_var("BACKEND_URL")?,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            webhook_port: parsed_var("WEBHOOK_PORT", 8080)?,
            session_ttl_secs: parsed_var("SESSION_TTL_SECS", 1800)?,
            error_channel_id: optional_var("ERROR_CHANNEL_ID")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            skip_email_enabled: parsed_var("SKIP_EMAIL_ENABLED", true)?,
            update_mode_enabled: parsed_var("UPDATE_MODE_ENABLED", true)?,
        })
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn optional_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidVar(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub backend: Arc<BackendClient>,
}

impl Context {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::from_env()?;
        let backend = BackendClient::new(&config.backend_url)
            .map_err(|e| ConfigError::HttpClientError(e.to_string()))?;

        Ok(Self {
            config,
            backend: Arc::new(backend),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: [&str; 9] = [
        "BOT_TOKEN",
        "BACKEND_URL",
        "TELEGRAM_API_URL",
        "WEBHOOK_PORT",
        "SESSION_TTL_SECS",
        "ERROR_CHANNEL_ID",
        "LOG_LEVEL",
        "SKIP_EMAIL_ENABLED",
        "UPDATE_MODE_ENABLED",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn missing_bot_token_is_rejected() {
        clear_env();
        env::set_var("BACKEND_URL", "http://localhost:9000");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar(ref v)) if v == "BOT_TOKEN"));
    }

    #[test]
    #[serial]
    fn missing_backend_url_is_rejected() {
        clear_env();
        env::set_var("BOT_TOKEN", "123:abc");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar(ref v)) if v == "BACKEND_URL"));
    }

    #[test]
    #[serial]
    fn defaults_are_applied() {
        clear_env();
        env::set_var("BOT_TOKEN", "123:abc");
        env::set_var("BACKEND_URL", "http://localhost:9000");

        let config = Config::from_env().expect("config should load");
        assert_eq!(config.webhook_port, 8080);
        assert_eq!(config.session_ttl_secs, 1800);
        assert_eq!(config.telegram_api_url, "https://api.telegram.org");
        assert_eq!(config.error_channel_id, None);
        assert!(config.skip_email_enabled);
        assert!(config.update_mode_enabled);
    }

    #[test]
    #[serial]
    fn invalid_port_is_rejected() {
        clear_env();
        env::set_var("BOT_TOKEN", "123:abc");
        env::set_var("BACKEND_URL", "http://localhost:9000");
        env::set_var("WEBHOOK_PORT", "not-a-port");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidVar(ref v, _)) if v == "WEBHOOK_PORT"));
    }

    #[test]
    #[serial]
    fn error_channel_id_is_parsed() {
        clear_env();
        env::set_var("BOT_TOKEN", "123:abc");
        env::set_var("BACKEND_URL", "http://localhost:9000");
        env::set_var("ERROR_CHANNEL_ID", "-1001234567890");

        let config = Config::from_env().expect("config should load");
        assert_eq!(config.error_channel_id, Some(-1001234567890));
    }
}
