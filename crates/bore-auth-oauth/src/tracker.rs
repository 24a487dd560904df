//! In-flight authorization attempts.
//!
//! Each login creates one [`PkceAttempt`] keyed by a random state token.
//! The callback consumes it exactly once: lookup and removal happen under a
//! single lock, so concurrent callbacks with the same state cannot both
//! proceed to the token exchange.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bore_auth_session::Session;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{OAuthError, Result};
use crate::oauth::{
    OAuthConfig, PkceChallenge, SharedTokenExchanger, build_authorization_url, generate_state,
};

/// How long an attempt may be completed after it was created (10 minutes).
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Age after which attempts are swept from the registry (15 minutes).
pub const DEFAULT_SWEEP_AFTER: Duration = Duration::from_secs(15 * 60);

/// Lifetime of sessions minted on successful completion (7 days).
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tracker timing configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub state_ttl: Duration,
    pub sweep_after: Duration,
    pub session_lifetime: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            state_ttl: DEFAULT_STATE_TTL,
            sweep_after: DEFAULT_SWEEP_AFTER,
            session_lifetime: DEFAULT_SESSION_LIFETIME,
        }
    }
}

impl TrackerConfig {
    /// Set the session lifetime.
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }
}

/// A pending authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceAttempt {
    pub verifier: String,
    /// Where to send the browser once the attempt completes.
    pub redirect_to: String,
    pub created_at: Instant,
}

/// What the caller needs to send the browser to the authorization server.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub state: String,
    pub code_challenge: String,
    pub url: String,
}

/// Result of a successful callback.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session: Session,
    pub redirect_to: String,
}

/// Registry of in-flight attempts plus the code exchange.
#[derive(Debug)]
pub struct PkceTracker {
    config: OAuthConfig,
    settings: TrackerConfig,
    exchanger: SharedTokenExchanger,
    attempts: Mutex<HashMap<String, PkceAttempt>>,
}

impl PkceTracker {
    /// Create a tracker with default timings.
    pub fn new(config: OAuthConfig, exchanger: SharedTokenExchanger) -> Self {
        Self::with_settings(config, TrackerConfig::default(), exchanger)
    }

    /// Create a tracker with explicit timings.
    pub fn with_settings(
        config: OAuthConfig,
        settings: TrackerConfig,
        exchanger: SharedTokenExchanger,
    ) -> Self {
        Self {
            config,
            settings,
            exchanger,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// OAuth client configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Number of attempts currently registered.
    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Whether no attempts are registered.
    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }

    /// Start a new attempt that returns to `redirect_to`.
    ///
    /// Every call is independent; earlier attempts from the same browser are
    /// left alone. Stale attempts are swept opportunistically.
    pub fn begin(&self, redirect_to: &str) -> AuthorizationRequest {
        self.begin_at(redirect_to, Instant::now())
    }

    pub(crate) fn begin_at(&self, redirect_to: &str, now: Instant) -> AuthorizationRequest {
        let pkce = PkceChallenge::generate();
        let state = generate_state();

        self.attempts.lock().insert(
            state.clone(),
            PkceAttempt {
                verifier: pkce.verifier,
                redirect_to: redirect_to.to_string(),
                created_at: now,
            },
        );
        self.sweep_at(now);

        debug!(redirect_to, "Started authorization attempt");

        let url = build_authorization_url(&self.config, &pkce.challenge, &state);
        AuthorizationRequest {
            state,
            code_challenge: pkce.challenge,
            url,
        }
    }

    /// Complete the attempt identified by `state` by redeeming `code`.
    pub async fn complete(&self, code: &str, state: &str) -> Result<CompletedLogin> {
        let attempt = self.take_at(state, Instant::now())?;

        let tokens = self
            .exchanger
            .exchange(code, &attempt.verifier)
            .await
            .inspect_err(|e| warn!(error = %e, "Token exchange failed"))?;

        let lifetime = chrono::Duration::from_std(self.settings.session_lifetime)
            .map_err(|e| OAuthError::Config(format!("Invalid session lifetime: {}", e)))?;
        let session = Session::new(
            tokens.me,
            tokens.profile.name,
            tokens.profile.email,
            lifetime,
        );

        info!(user = %session.user_id, "Authorization completed");

        Ok(CompletedLogin {
            session,
            redirect_to: attempt.redirect_to,
        })
    }

    /// Remove and return the attempt for `state`.
    ///
    /// The attempt is consumed even when it turns out to be expired.
    pub(crate) fn take_at(&self, state: &str, now: Instant) -> Result<PkceAttempt> {
        let attempt = self.attempts.lock().remove(state);

        let Some(attempt) = attempt else {
            warn!("Callback with unknown state");
            return Err(OAuthError::InvalidState);
        };

        if now.saturating_duration_since(attempt.created_at) > self.settings.state_ttl {
            warn!("Callback with expired state");
            return Err(OAuthError::ExpiredState);
        }

        Ok(attempt)
    }

    /// Drop attempts older than the sweep ceiling. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut attempts = self.attempts.lock();
        let before = attempts.len();
        attempts.retain(|_, attempt| {
            now.saturating_duration_since(attempt.created_at) <= self.settings.sweep_after
        });
        let removed = before - attempts.len();
        if removed > 0 {
            debug!(removed, "Swept stale authorization attempts");
        }
        removed
    }
}
