use thiserror::Error;

use crate::domain::run::{RunId, RunStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend rejected credentials: {0}")]
    Authentication(String),
    #[error("backend rate limited the request: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },
    #[error("backend service error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("backend transport failure: {0}")]
    Transport(String),
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
    #[error("backend does not support `{0}`")]
    Unsupported(&'static str),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::Authentication(_) | Self::Decode(_) | Self::Unsupported(_) => false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("invalid turn input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("assistant run failed ({status}): {message}")]
    RunFailed { status: RunStatus, message: String },
    #[error("assistant run timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
    #[error("assistant run `{run_id}` completed but produced no readable content")]
    EmptyAnswer { run_id: RunId },
    #[error("thread store failure: {0}")]
    ThreadStore(String),
}

impl TurnError {
    /// Whether the same turn could succeed if submitted again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(error) => error.is_retryable(),
            Self::Timeout { .. } => true,
            Self::InvalidInput(_)
            | Self::RunFailed { .. }
            | Self::EmptyAnswer { .. }
            | Self::ThreadStore(_) => false,
        }
    }

    /// Failures scoped to a single run, as opposed to the backend being unreachable or
    /// refusing the caller.
    pub fn is_run_level(&self) -> bool {
        matches!(self, Self::RunFailed { .. } | Self::Timeout { .. } | Self::EmptyAnswer { .. })
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::RateLimited { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::GatewayTimeout { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("rate limited: {message}")]
    RateLimited { message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("gateway timeout: {message}")]
    GatewayTimeout { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "The assistant backend rejected the configured credentials.",
            Self::RateLimited { .. } => "The assistant is busy right now. Please retry shortly.",
            Self::BadGateway { .. } => "The assistant could not produce an answer for this turn.",
            Self::GatewayTimeout { .. } => "The assistant took too long to answer. Please retry.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::RateLimited { .. } => 429,
            Self::BadGateway { .. } => 502,
            Self::GatewayTimeout { .. } => 504,
            Self::Internal { .. } => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::RateLimited { message, .. }
            | Self::BadGateway { message, .. }
            | Self::GatewayTimeout { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::RateLimited { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::GatewayTimeout { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<TurnError> for InterfaceError {
    fn from(value: TurnError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            TurnError::InvalidInput(_) => Self::BadRequest { message, correlation_id },
            TurnError::Backend(BackendError::Authentication(_)) => {
                Self::Unauthorized { message, correlation_id }
            }
            TurnError::Backend(BackendError::RateLimited { .. }) => {
                Self::RateLimited { message, correlation_id }
            }
            TurnError::Backend(BackendError::Service { .. })
            | TurnError::Backend(BackendError::Transport(_))
            | TurnError::RunFailed { .. }
            | TurnError::EmptyAnswer { .. } => Self::BadGateway { message, correlation_id },
            TurnError::Timeout { .. } => Self::GatewayTimeout { message, correlation_id },
            TurnError::Backend(BackendError::Decode(_))
            | TurnError::Backend(BackendError::Unsupported(_))
            | TurnError::ThreadStore(_) => Self::Internal { message, correlation_id },
        }
    }
}
