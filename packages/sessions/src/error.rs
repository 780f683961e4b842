// ABOUTME: Error taxonomy surfaced by the session orchestrator and fragment deployer
// ABOUTME: Configuration, invalid request and wrapped unexpected failures with stable codes

use std::fmt;
use thiserror::Error;

/// Component an unexpected failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Orchestrator,
    Deployer,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Orchestrator => write!(f, "orchestrator"),
            Subsystem::Deployer => write!(f, "deployer"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{subsystem} failed [{code}]: {message}")]
    Unexpected {
        subsystem: Subsystem,
        code: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SessionError {
    pub fn unexpected<E>(subsystem: Subsystem, code: &'static str, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SessionError::Unexpected {
            subsystem,
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "CONFIGURATION_ERROR",
            SessionError::InvalidRequest(_) => "INVALID_REQUEST",
            SessionError::Unexpected { code, .. } => code,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, SessionError::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
