use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    MissingConfig,
    MissingWorkroom,
    InvalidInput,
    RemoteFailure,
    DecodeFailure,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("no bearer token available")]
    Unauthenticated,
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("workroom id is required")]
    MissingWorkroom,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("remote request failed with HTTP {status}: {body}")]
    RemoteFailure { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    DecodeFailure(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Unauthenticated => ErrorKind::Unauthenticated,
            ControllerError::MissingConfig(_) => ErrorKind::MissingConfig,
            ControllerError::MissingWorkroom => ErrorKind::MissingWorkroom,
            ControllerError::InvalidInput(_) => ErrorKind::InvalidInput,
            ControllerError::RemoteFailure { .. } => ErrorKind::RemoteFailure,
            ControllerError::DecodeFailure(_) => ErrorKind::DecodeFailure,
            ControllerError::Transport(_) => ErrorKind::Unknown,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ControllerError::RemoteFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// User-facing rendition of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl NormalizedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
