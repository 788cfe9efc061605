/// Unified error types for the whitelist bridge
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type shared by the store, the VRChat client and the service
#[derive(Error, Debug)]
pub enum WhitelistError {
    /// Caller input malformed (empty required field)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// VRChat search returned no user with exactly this display name
    #[error("No exact match user found")]
    NoExactMatch,

    /// VRChat search returned several users with exactly this display name
    #[error("Multiple exact match users found")]
    MultipleExactMatch,

    /// The VRChat account is owned by another Discord user
    #[error("VRChat account already linked to another Discord user")]
    AlreadyLinkedElsewhere,

    /// VRChat rejected credentials or the second factor
    #[error("VRChat authentication failed: {0}")]
    Auth(String),

    /// Network failure or unexpected response talking to VRChat
    #[error("VRChat transport error: {0}")]
    Transport(String),

    /// An operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Persistence failure
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Value-comparable tag for [`WhitelistError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NoExactMatch,
    MultipleExactMatch,
    AlreadyLinkedElsewhere,
    Auth,
    Transport,
    Timeout,
    Store,
    Config,
    Internal,
}

impl WhitelistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WhitelistError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            WhitelistError::NoExactMatch => ErrorKind::NoExactMatch,
            WhitelistError::MultipleExactMatch => ErrorKind::MultipleExactMatch,
            WhitelistError::AlreadyLinkedElsewhere => ErrorKind::AlreadyLinkedElsewhere,
            WhitelistError::Auth(_) => ErrorKind::Auth,
            WhitelistError::Transport(_) => ErrorKind::Transport,
            WhitelistError::Timeout(_) => ErrorKind::Timeout,
            WhitelistError::Store(_) => ErrorKind::Store,
            WhitelistError::Config(_) => ErrorKind::Config,
            WhitelistError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the store rejected a write because of a unique index
    pub fn is_unique_violation(&self) -> bool {
        match self {
            WhitelistError::Store(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// Failures caused by infrastructure rather than by the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Auth
                | ErrorKind::Transport
                | ErrorKind::Timeout
                | ErrorKind::Store
                | ErrorKind::Config
                | ErrorKind::Internal
        )
    }
}

impl From<reqwest::Error> for WhitelistError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WhitelistError::Timeout(format!("VRChat request: {}", err))
        } else {
            WhitelistError::Transport(err.to_string())
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Message shown for anything that should not leak infrastructure detail
pub const GENERIC_FAILURE_MESSAGE: &str = "Internal error, please try again later";

impl IntoResponse for WhitelistError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, kind = ?self.kind(), "request failed");
        }

        let (status, error_code, message) = match self {
            WhitelistError::InvalidArgument(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidArgument",
                self.to_string(),
            ),
            WhitelistError::NoExactMatch => (
                StatusCode::BAD_REQUEST,
                "NoExactMatch",
                "No VRChat user found with exactly this display name".to_string(),
            ),
            WhitelistError::MultipleExactMatch => (
                StatusCode::BAD_REQUEST,
                "MultipleExactMatch",
                "Several VRChat users share this display name; contact an administrator".to_string(),
            ),
            WhitelistError::AlreadyLinkedElsewhere => (
                StatusCode::CONFLICT,
                "AlreadyLinkedElsewhere",
                self.to_string(),
            ),
            WhitelistError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "Timeout",
                GENERIC_FAILURE_MESSAGE.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                GENERIC_FAILURE_MESSAGE.to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for whitelist operations
pub type WhitelistResult<T> = Result<T, WhitelistError>;
