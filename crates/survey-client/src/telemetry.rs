use crate::config::{LogFormat, TelemetryConfig};
use std::fmt;
use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::EnvFilter;

/// Level for dependencies when only a bare level is configured.
const DEPENDENCY_LEVEL: &str = "warn";

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{}' for the survey client", value)
            }
            TelemetryError::Subscriber(err) => {
                write!(f, "could not install the survey client subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails with [`TelemetryError::Subscriber`] when a global subscriber is
/// already set, so embedders that bring their own can skip this call.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    let installed = match config.format {
        LogFormat::Pretty => builder.with_target(true).with_ansi(true).try_init(),
        LogFormat::Compact => builder
            .with_target(false)
            .compact()
            .with_ansi(false)
            .try_init(),
    };
    installed.map_err(TelemetryError::Subscriber)
}

fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    let directives = scoped_directives(level);
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
        value: level.to_string(),
        source,
    })
}

fn scoped_directives(level: &str) -> String {
    let level = level.trim();
    match level.parse::<LevelFilter>() {
        Ok(_) => format!("{DEPENDENCY_LEVEL},survey_client={level}"),
        Err(_) => level.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter() {
        let err = build_filter("survey_client=notalevel").expect_err("filter should not parse");
        assert!(err.to_string().contains("survey_client=notalevel"));
    }

    #[test]
    fn accepts_target_directives() {
        build_filter("survey_client=debug,reqwest=warn").expect("directives parse");
    }

    #[test]
    fn bare_level_is_scoped_to_this_crate() {
        assert_eq!(scoped_directives(" debug "), "warn,survey_client=debug");
        assert_eq!(scoped_directives("reqwest=info"), "reqwest=info");
    }
}
