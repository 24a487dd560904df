//! OAuth 2.0 PKCE primitives and the authorization code exchange.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, Result};

/// Default request timeout for the token endpoint.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth client configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::indiko(
            "https://indiko.dunkirk.sh",
            "https://bore.dunkirk.sh",
            "https://bore.dunkirk.sh/.auth/callback",
        )
    }
}

impl OAuthConfig {
    /// Config for an Indiko server at `base_url`.
    ///
    /// Indiko serves `/auth/authorize` and `/auth/token`.
    pub fn indiko(
        base_url: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: format!("{}/auth/authorize", base_url),
            token_url: format!("{}/auth/token", base_url),
            redirect_uri: redirect_uri.into(),
            scope: "profile email".to_string(),
        }
    }

    /// Set the client secret. Empty secrets are treated as absent.
    pub fn with_client_secret(mut self, secret: Option<String>) -> Self {
        self.client_secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// Set the requested scopes.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair from 32 random bytes.
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = Self::challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// The S256 challenge for a verifier: `base64url(SHA-256(verifier))`.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// Generate a random state token from 16 random bytes.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Build the authorization URL for the OAuth flow.
pub fn build_authorization_url(config: &OAuthConfig, challenge: &str, state: &str) -> String {
    let params = [
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("state", state),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("scope", config.scope.as_str()),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", config.authorize_url, query)
}

/// Profile block of the token response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub url: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Subject identifier (the user's profile URL).
    #[serde(default)]
    pub me: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    client_id: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// Redeems authorization codes at the token endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync + std::fmt::Debug {
    /// Exchange `code` (bound to `verifier`) for tokens.
    async fn exchange(&self, code: &str, verifier: &str) -> Result<TokenResponse>;
}

/// Thread-safe token exchanger.
pub type SharedTokenExchanger = Arc<dyn TokenExchanger>;

/// Token exchanger that talks to a real token endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl HttpTokenExchanger {
    /// Create an exchanger with the default request timeout.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| OAuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        exchange_code_for_tokens(&self.http, &self.config, code, verifier).await
    }
}

/// Exchange an authorization code for tokens.
///
/// The response body is decoded in full before any field is used.
pub async fn exchange_code_for_tokens(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let request_body = TokenExchangeRequest {
        grant_type: "authorization_code",
        code,
        client_id: &config.client_id,
        redirect_uri: &config.redirect_uri,
        code_verifier: verifier,
        client_secret: config.client_secret.as_deref(),
    };

    let response = http
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&request_body)
        .send()
        .await
        .map_err(|e| OAuthError::ExchangeFailed(format!("Token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(OAuthError::ExchangeFailed(format!(
            "Token endpoint returned {}: {}",
            status.as_u16(),
            error_text
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| OAuthError::ExchangeFailed(format!("Failed to read token response: {}", e)))?;

    let tokens: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
        OAuthError::ExchangeFailed(format!("Failed to parse token response: {}", e))
    })?;

    if tokens.me.trim().is_empty() {
        return Err(OAuthError::ExchangeFailed(
            "Token response is missing the subject identifier".to_string(),
        ));
    }

    Ok(tokens)
}
