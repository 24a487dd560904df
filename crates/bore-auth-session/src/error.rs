//! Error types for session encoding and decoding.

/// Error type for session codec operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session could not be serialized or sealed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The cookie value is malformed, tampered with, too old, or was
    /// produced under different keys.
    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

/// Result type for session codec operations.
pub type Result<T> = std::result::Result<T, SessionError>;
