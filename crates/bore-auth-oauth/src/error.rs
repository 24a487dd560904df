//! Error types for the OAuth flow.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while running the authorization code flow.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The state was never issued, was already consumed, or was swept.
    #[error("Invalid state")]
    InvalidState,

    /// The attempt outlived its validity window.
    #[error("State expired")]
    ExpiredState,

    /// The authorization server rejected the code, or the exchange itself failed.
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::ExchangeFailed(e.to_string())
    }
}
