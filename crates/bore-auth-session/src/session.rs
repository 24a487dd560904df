//! The session record carried inside the cookie.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated browser session.
///
/// Sessions are immutable once issued; a fresh login replaces the whole
/// cookie. Validity is checked against `expires_at` on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject identifier returned by the authorization server (`me`).
    pub user_id: String,
    /// Display name from the profile.
    pub name: String,
    /// Email from the profile.
    pub email: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session that expires `lifetime` from now.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            email: email.into(),
            expires_at: Utc::now() + lifetime,
        }
    }

    /// Whether the session is still valid at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether the session is still valid right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
