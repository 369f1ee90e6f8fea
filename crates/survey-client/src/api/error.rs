use std::time::Duration;

use crate::auth::Audience;

/// Failure talking to the survey backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request exceeded the {0:?} deadline")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend responded with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("{0} credential has expired")]
    AuthExpired(Audience),
    #[error("backend rejected the credential (status {status})")]
    AuthInvalid { status: u16 },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ApiError {
    /// Timeout or transport failure.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Transport(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthExpired(_) | ApiError::AuthInvalid { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } | ApiError::AuthInvalid { status } => Some(*status),
            _ => None,
        }
    }
}
