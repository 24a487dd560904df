//! OAuth 2.0 authorization code flow with PKCE.
//!
//! # Components
//!
//! - [`oauth`]: PKCE challenge generation, authorization URL, token exchange
//! - [`tracker`]: single-use registry of in-flight authorization attempts

pub mod error;
pub mod oauth;
pub mod tracker;

pub use error::{OAuthError, Result};
pub use oauth::{
    HttpTokenExchanger, OAuthConfig, PkceChallenge, Profile, SharedTokenExchanger,
    TokenExchanger, TokenResponse, build_authorization_url, generate_state,
};
pub use tracker::{AuthorizationRequest, CompletedLogin, PkceAttempt, PkceTracker, TrackerConfig};
