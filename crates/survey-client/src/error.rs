use crate::api::ApiError;
use crate::auth::{AuthError, MonitorError};
use crate::config::ConfigError;
use crate::questionnaire::{LoadError, SyncError, ValidationError};
use crate::storage::StorageError;
use crate::telemetry::TelemetryError;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Api(ApiError),
    Storage(StorageError),
    Auth(AuthError),
    Monitor(MonitorError),
    Load(LoadError),
    Sync(SyncError),
    Validation(ValidationError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Config(err) => write!(f, "configuration error: {}", err),
            ClientError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            ClientError::Api(err) => write!(f, "backend error: {}", err),
            ClientError::Storage(err) => write!(f, "storage error: {}", err),
            ClientError::Auth(err) => write!(f, "authentication error: {}", err),
            ClientError::Monitor(err) => write!(f, "session monitor error: {}", err),
            ClientError::Load(err) => write!(f, "load error: {}", err),
            ClientError::Sync(err) => write!(f, "answer sync error: {}", err),
            ClientError::Validation(err) => write!(f, "validation error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Config(err) => Some(err),
            ClientError::Telemetry(err) => Some(err),
            ClientError::Api(err) => Some(err),
            ClientError::Storage(err) => Some(err),
            ClientError::Auth(err) => Some(err),
            ClientError::Monitor(err) => Some(err),
            ClientError::Load(err) => Some(err),
            ClientError::Sync(err) => Some(err),
            ClientError::Validation(err) => Some(err),
        }
    }
}

impl ClientError {
    /// True when the user has to sign in again.
    pub fn requires_login(&self) -> bool {
        match self {
            ClientError::Api(err) => err.is_auth(),
            ClientError::Auth(AuthError::Api(err))
            | ClientError::Sync(SyncError::Api(err))
            | ClientError::Load(LoadError::ReferenceData(err))
            | ClientError::Load(LoadError::StoredAnswers(err)) => err.is_auth(),
            _ => false,
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for ClientError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<ApiError> for ClientError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<StorageError> for ClientError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<AuthError> for ClientError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<MonitorError> for ClientError {
    fn from(value: MonitorError) -> Self {
        Self::Monitor(value)
    }
}

impl From<LoadError> for ClientError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

impl From<SyncError> for ClientError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<ValidationError> for ClientError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
