use shared::error::{ApiError, ErrorKind, ValidationErrors};
use thiserror::Error;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error - no response from server";

#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received (connect failure, timeout, reset).
    #[error("Network error - no response from server")]
    Network { detail: String },
    /// Non-2xx response. `message` is the server's `message` field when
    /// present, otherwise `HTTP Error <status>`.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// 2xx response whose envelope carried `success: false`.
    #[error("{message}")]
    Rejected { message: String },
    #[error("{message}")]
    Client { message: String },
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

impl ClientError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::Server { .. } | ClientError::Rejected { .. } => ErrorKind::Server,
            ClientError::Client { .. } => ErrorKind::Client,
            ClientError::Validation(_) => ErrorKind::Validation,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ClientError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<&ClientError> for ApiError {
    fn from(value: &ClientError) -> Self {
        match value {
            ClientError::Validation(errors) => ApiError::from(errors.clone()),
            other => ApiError {
                kind: other.kind(),
                status: other.status(),
                message: other.to_string(),
                fields: Vec::new(),
            },
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
