//! Error types for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use bore_auth_oauth::OAuthError;

/// Server error type.
///
/// Responses are plain text. The bodies are stable strings the proxy
/// may show to the browser.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Callback without `code` or `state`.
    #[error("Missing code or state")]
    MissingParams,

    /// State never issued or already consumed.
    #[error("Invalid state")]
    InvalidState,

    /// State older than its TTL.
    #[error("State expired")]
    StateExpired,

    /// Token exchange with the authorization server failed.
    #[error("Authentication failed")]
    AuthenticationFailed(String),

    /// Session could not be encoded into a cookie.
    #[error("Failed to create session")]
    SessionEncoding(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<OAuthError> for ServerError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::InvalidState => ServerError::InvalidState,
            OAuthError::ExpiredState => ServerError::StateExpired,
            OAuthError::ExchangeFailed(msg) => ServerError::AuthenticationFailed(msg),
            OAuthError::Config(msg) => ServerError::Config(msg),
        }
    }
}

impl From<bore_auth_session::SessionError> for ServerError {
    fn from(e: bore_auth_session::SessionError) -> Self {
        ServerError::SessionEncoding(e.to_string())
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::MissingParams | ServerError::InvalidState | ServerError::StateExpired => {
                StatusCode::BAD_REQUEST
            }
            ServerError::AuthenticationFailed(_)
            | ServerError::SessionEncoding(_)
            | ServerError::Internal(_)
            | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();

        match &self {
            ServerError::AuthenticationFailed(detail) => {
                tracing::error!(status = %status, error = %detail, "Token exchange failed");
            }
            ServerError::SessionEncoding(detail) => {
                tracing::error!(status = %status, error = %detail, "Failed to set session");
            }
            ServerError::Internal(_) | ServerError::Config(_) => {
                tracing::error!(status = %status, error = %message, "Server error");
            }
            _ => {
                tracing::warn!(status = %status, error = %message, "Client error");
            }
        }

        (status, message).into_response()
    }
}
