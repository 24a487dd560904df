//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bore_auth_oauth::{HttpTokenExchanger, OAuthConfig, PkceTracker};
use bore_auth_server::{
    CacheConfig, DecisionEngine, FrpsRouteSource, RoutePolicyCache, Server, ServerConfig,
};
use bore_auth_session::{SessionCodec, SessionKeys};

/// Base domain every test server is configured for.
pub const BASE_DOMAIN: &str = "bore.example";

/// A running server plus its mocked upstreams.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// Mocked frps dashboard API.
    pub frps: MockServer,
    /// Mocked authorization server.
    pub indiko: MockServer,
    /// Codec sharing the server's keys, for minting cookies in tests.
    pub codec: SessionCodec,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server whose route table marks `app` as protected and
    /// `open` as public.
    pub async fn start() -> Result<Self> {
        let frps = MockServer::start().await;
        mount_proxies(
            &frps,
            json!({
                "proxies": [
                    proxy("app", "online", Some("indiko")),
                    proxy("open", "online", None),
                    proxy("down", "offline", Some("indiko")),
                ]
            }),
        )
        .await;

        Self::start_with(frps).await
    }

    /// Start a server against an already configured frps mock.
    pub async fn start_with(frps: MockServer) -> Result<Self> {
        let indiko = MockServer::start().await;
        let addr = find_available_port().await?;

        let config = ServerConfig::new(format!(".{}", BASE_DOMAIN))
            .with_bind_address(addr)
            .with_cookie_secure(false);

        let oauth = OAuthConfig::indiko(
            &indiko.uri(),
            format!("https://{}", BASE_DOMAIN),
            format!("https://{}/.auth/callback", BASE_DOMAIN),
        );
        let exchanger = Arc::new(HttpTokenExchanger::new(oauth.clone())?);
        let tracker = Arc::new(PkceTracker::new(oauth, exchanger));

        let source = Arc::new(FrpsRouteSource::new(frps.uri())?);
        let routes = Arc::new(RoutePolicyCache::with_config(
            source,
            CacheConfig::default().with_debounce(Duration::ZERO),
        ));

        let keys = SessionKeys::generate();
        let codec = SessionCodec::new(config.cookie.name.clone(), &keys);
        let engine = DecisionEngine::new(&config, routes, tracker, codec.clone());

        let server = Server::new(config, engine);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            frps,
            indiko,
            codec,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET a server path.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    /// A forward-auth check for `host` and `uri`, as the proxy sends it.
    pub fn check(&self, host: &str, uri: &str) -> reqwest::RequestBuilder {
        self.get("/.auth/check")
            .header("X-Forwarded-Host", host)
            .header("X-Forwarded-Uri", uri)
            .header("X-Forwarded-Proto", "https")
    }
}

/// One entry of the frps proxy list.
pub fn proxy(subdomain: &str, status: &str, auth: Option<&str>) -> serde_json::Value {
    let metadatas = match auth {
        Some(auth) => json!({ "auth": auth }),
        None => json!({}),
    };
    json!({
        "name": format!("{}-http", subdomain),
        "status": status,
        "conf": { "subdomain": subdomain, "metadatas": metadatas }
    })
}

/// Serve `body` from the frps proxy list endpoint.
pub async fn mount_proxies(frps: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/proxy/http"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(frps)
        .await;
}

/// Serve a successful token response for Alice.
pub async fn mount_token_success(indiko: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "token_type": "Bearer",
            "expires_in": 3600,
            "me": "https://alice.example/",
            "profile": { "name": "Alice", "email": "alice@example.com" }
        })))
        .mount(indiko)
        .await;
}

/// The `state` parameter of an authorization URL.
pub fn state_param(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    })
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/healthz", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
