//! Fakes shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use bore_auth_oauth::{
    OAuthConfig, OAuthError, PkceTracker, Profile, TokenExchanger, TokenResponse,
};
use bore_auth_session::{SessionCodec, SessionKeys};
use serde_json::json;

use crate::config::ServerConfig;
use crate::decision::DecisionEngine;
use crate::routes_cache::{ProxyEntry, RoutePolicyCache, RouteSource, RouteSourceError};
use crate::state::AppState;

/// Route source serving a fixed list of `(subdomain, auth)` pairs.
#[derive(Debug)]
pub struct StaticRoutes(pub Vec<(&'static str, Option<&'static str>)>);

#[async_trait]
impl RouteSource for StaticRoutes {
    async fn fetch(&self) -> Result<Vec<ProxyEntry>, RouteSourceError> {
        Ok(self
            .0
            .iter()
            .map(|(subdomain, auth)| {
                let metadatas = match auth {
                    Some(auth) => json!({ "auth": auth }),
                    None => json!({}),
                };
                ProxyEntry {
                    name: subdomain.to_string(),
                    status: "online".to_string(),
                    conf: json!({ "subdomain": subdomain, "metadatas": metadatas }),
                }
            })
            .collect())
    }
}

/// Token exchanger that answers for Alice, or always fails.
#[derive(Debug)]
pub struct FakeExchanger {
    pub fail: bool,
}

#[async_trait]
impl TokenExchanger for FakeExchanger {
    async fn exchange(
        &self,
        _code: &str,
        _verifier: &str,
    ) -> bore_auth_oauth::Result<TokenResponse> {
        if self.fail {
            return Err(OAuthError::ExchangeFailed("boom".to_string()));
        }
        Ok(TokenResponse {
            access_token: "at".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: None,
            me: "https://alice.example/".to_string(),
            scope: "profile email".to_string(),
            profile: Profile {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                ..Default::default()
            },
        })
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::new(".bore.example")
}

/// Engine over `app` (protected), `open` (no auth) and `other` (another provider).
pub fn test_engine(fail_exchange: bool) -> DecisionEngine {
    let config = test_config();
    let routes = Arc::new(RoutePolicyCache::new(Arc::new(StaticRoutes(vec![
        ("app", Some("indiko")),
        ("open", None),
        ("other", Some("github")),
    ]))));
    let tracker = Arc::new(PkceTracker::new(
        OAuthConfig::default(),
        Arc::new(FakeExchanger {
            fail: fail_exchange,
        }),
    ));
    let codec = SessionCodec::new(config.cookie.name.clone(), &SessionKeys::generate());
    DecisionEngine::new(&config, routes, tracker, codec)
}

pub fn test_state(fail_exchange: bool) -> AppState {
    AppState::new(test_config(), test_engine(fail_exchange))
}

/// The `state` query parameter of an authorization URL.
pub fn state_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_default()
}
