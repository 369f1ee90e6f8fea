use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

/// Distinguishes runtime behavior for different stages of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEnvironment {
    Development,
    Test,
    Production,
}

impl ClientEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the questionnaire client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: ClientEnvironment,
    pub backend: BackendConfig,
    pub monitor: MonitorConfig,
    pub telemetry: TelemetryConfig,
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = ClientEnvironment::from_str(
            &env::var("SURVEY_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let base_url = parse_base_url(
            &env::var("SURVEY_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )?;

        let request_timeout = parse_seconds(
            env::var("SURVEY_REQUEST_TIMEOUT_SECS").ok(),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )
        .ok_or(ConfigError::InvalidTimeout)?;

        let check_interval = parse_seconds(
            env::var("SURVEY_MONITOR_INTERVAL_SECS").ok(),
            DEFAULT_MONITOR_INTERVAL_SECS,
        )
        .ok_or(ConfigError::InvalidMonitorInterval)?;

        let log_level = env::var("SURVEY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            backend: BackendConfig {
                base_url,
                request_timeout,
            },
            monitor: MonitorConfig { check_interval },
            telemetry: TelemetryConfig {
                log_level,
                format: LogFormat::for_environment(environment),
            },
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: ClientEnvironment::Development,
            backend: BackendConfig::default(),
            monitor: MonitorConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

/// Settings for the REST backend the client talks to.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    /// Deadline applied to every request; exceeding it surfaces as a timeout error.
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url parses"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Cadence of the background credential expiry check.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// A bare level applies to this crate only; full directives pass through.
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Coloured output with event targets, for local development.
    Pretty,
    /// Plain single-line output.
    Compact,
}

impl LogFormat {
    pub fn for_environment(environment: ClientEnvironment) -> Self {
        match environment {
            ClientEnvironment::Development => Self::Pretty,
            ClientEnvironment::Test | ClientEnvironment::Production => Self::Compact,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut value = raw.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }

    let url = Url::parse(&value).map_err(|source| ConfigError::InvalidBaseUrl {
        value: raw.to_string(),
        source: Some(source),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::InvalidBaseUrl {
            value: raw.to_string(),
            source: None,
        }),
    }
}

fn parse_seconds(raw: Option<String>, default: u64) -> Option<Duration> {
    let secs = match raw {
        Some(value) => value.trim().parse::<u64>().ok()?,
        None => default,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidBaseUrl {
        value: String,
        source: Option<url::ParseError>,
    },
    InvalidTimeout,
    InvalidMonitorInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBaseUrl { value, .. } => {
                write!(
                    f,
                    "SURVEY_API_BASE_URL must be an absolute http(s) URL, got '{}'",
                    value
                )
            }
            ConfigError::InvalidTimeout => {
                write!(f, "SURVEY_REQUEST_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::InvalidMonitorInterval => {
                write!(f, "SURVEY_MONITOR_INTERVAL_SECS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidBaseUrl {
                source: Some(source),
                ..
            } => Some(source),
            ConfigError::InvalidBaseUrl { source: None, .. }
            | ConfigError::InvalidTimeout
            | ConfigError::InvalidMonitorInterval => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("SURVEY_ENV");
        env::remove_var("SURVEY_API_BASE_URL");
        env::remove_var("SURVEY_REQUEST_TIMEOUT_SECS");
        env::remove_var("SURVEY_MONITOR_INTERVAL_SECS");
        env::remove_var("SURVEY_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = ClientConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, ClientEnvironment::Development);
        assert_eq!(config.backend.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.backend.request_timeout, Duration::from_secs(30));
        assert_eq!(config.monitor.check_interval, Duration::from_secs(300));
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Pretty);
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SURVEY_API_BASE_URL", "https://diagnostico.example.org/api");
        let config = ClientConfig::load().expect("config loads");
        assert_eq!(
            config.backend.base_url.as_str(),
            "https://diagnostico.example.org/api/"
        );
        reset_env();
    }

    #[test]
    fn rejects_non_http_base_url_and_zero_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SURVEY_API_BASE_URL", "ftp://files.example.org/");
        assert!(matches!(
            ClientConfig::load(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        reset_env();
        env::set_var("SURVEY_REQUEST_TIMEOUT_SECS", "0");
        assert!(matches!(
            ClientConfig::load(),
            Err(ConfigError::InvalidTimeout)
        ));
        reset_env();
    }
}
