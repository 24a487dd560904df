//! Route policy cache.
//!
//! Mirrors the tunnel server's list of online HTTP proxies so the auth
//! decision can ask "does this subdomain require a login?" without a
//! network round trip per request.
//!
//! Readers clone an `Arc` to the current [`RouteSnapshot`] under a short
//! read lock and never observe a half-built map. Refreshes are
//! single-flight and debounced: a refresh within [`CacheConfig::debounce`]
//! of the last successful one is a no-op, and callers that queued behind an
//! in-flight attempt share its outcome instead of fetching again.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default minimum spacing between successful refreshes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Default request timeout for the tunnel server API.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors fetching the proxy list.
#[derive(Debug, Error)]
pub enum RouteSourceError {
    #[error("Failed to fetch proxy list: {0}")]
    Fetch(String),

    #[error("Failed to decode proxy list: {0}")]
    Decode(String),
}

/// Access policy for one tunnel subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub subdomain: String,
    pub metadata: HashMap<String, String>,
}

impl RoutePolicy {
    /// The `auth` metadata value, if any.
    pub fn auth(&self) -> Option<&str> {
        self.metadata.get("auth").map(String::as_str)
    }
}

/// One proxy as reported by the tunnel server.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Raw proxy configuration; parsed per entry so one bad blob
    /// does not poison the whole list.
    #[serde(default)]
    pub conf: serde_json::Value,
}

/// The list envelope. Entries stay raw so each is decoded on its own.
#[derive(Debug, Deserialize)]
struct ProxyList {
    #[serde(default)]
    proxies: Option<Vec<serde_json::Value>>,
}

/// Decode a proxy list body, skipping entries that do not decode.
///
/// Only a body that is not a proxy list at all is an error.
fn decode_proxy_list(body: &[u8]) -> Result<Vec<ProxyEntry>, RouteSourceError> {
    let list: ProxyList =
        serde_json::from_slice(body).map_err(|e| RouteSourceError::Decode(e.to_string()))?;

    let entries = list
        .proxies
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ProxyEntry>(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable proxy entry");
                None
            }
        })
        .collect();

    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct ProxyConf {
    #[serde(default)]
    subdomain: String,
    #[serde(default)]
    metadatas: Option<HashMap<String, String>>,
}

/// Where route policies come from.
#[async_trait]
pub trait RouteSource: Send + Sync + std::fmt::Debug {
    /// Fetch the current proxy list.
    async fn fetch(&self) -> Result<Vec<ProxyEntry>, RouteSourceError>;
}

/// Reads proxies from the frps dashboard API (`GET {api}/api/proxy/http`).
#[derive(Debug, Clone)]
pub struct FrpsRouteSource {
    api_url: String,
    http: reqwest::Client,
}

impl FrpsRouteSource {
    pub fn new(api_url: impl Into<String>) -> Result<Self, RouteSourceError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RouteSourceError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl RouteSource for FrpsRouteSource {
    async fn fetch(&self) -> Result<Vec<ProxyEntry>, RouteSourceError> {
        let url = format!("{}/api/proxy/http", self.api_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RouteSourceError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouteSourceError::Fetch(format!(
                "{} returned {}",
                url,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RouteSourceError::Fetch(e.to_string()))?;
        decode_proxy_list(&body)
    }
}

/// An immutable generation of the route map.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    routes: HashMap<String, RoutePolicy>,
    refreshed_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl RouteSnapshot {
    pub fn get(&self, subdomain: &str) -> Option<&RoutePolicy> {
        self.routes.get(subdomain)
    }

    pub fn routes(&self) -> impl Iterator<Item = &RoutePolicy> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// When this generation was built. `None` before the first refresh.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Monotonic generation counter, 0 before the first refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was installed.
    Refreshed { routes: usize },
    /// Skipped; the last successful refresh is too recent.
    Debounced,
    /// The fetch failed; the previous snapshot stays.
    Failed,
}

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub debounce: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl CacheConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Bookkeeping kept under the single-flight lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_success: Option<Instant>,
    last_outcome: Option<RefreshOutcome>,
}

/// Cached subdomain to policy map.
#[derive(Debug)]
pub struct RoutePolicyCache {
    source: Arc<dyn RouteSource>,
    config: CacheConfig,
    snapshot: RwLock<Arc<RouteSnapshot>>,
    refresh_guard: tokio::sync::Mutex<RefreshState>,
    /// Completed fetch attempts; only bumped under `refresh_guard`.
    attempts: AtomicU64,
}

impl RoutePolicyCache {
    /// Create an empty cache. Nothing is fetched until the first refresh.
    pub fn new(source: Arc<dyn RouteSource>) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    pub fn with_config(source: Arc<dyn RouteSource>, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            snapshot: RwLock::new(Arc::new(RouteSnapshot::default())),
            refresh_guard: tokio::sync::Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.read().clone()
    }

    /// Look up a subdomain, refreshing once on a miss.
    pub async fn lookup(&self, subdomain: &str) -> Option<RoutePolicy> {
        if let Some(policy) = self.snapshot().get(subdomain) {
            return Some(policy.clone());
        }

        debug!(subdomain, "Route cache miss, refreshing");
        self.refresh().await;
        self.snapshot().get(subdomain).cloned()
    }

    /// Refetch the proxy list and swap in a new snapshot.
    ///
    /// A caller that waited on another caller's fetch gets that fetch's
    /// outcome, so an outage costs one upstream request per wave of misses.
    pub async fn refresh(&self) -> RefreshOutcome {
        let ticket = self.attempts.load(Ordering::Acquire);
        let mut state = self.refresh_guard.lock().await;

        if self.attempts.load(Ordering::Acquire) != ticket
            && let Some(outcome) = state.last_outcome
        {
            debug!(?outcome, "Sharing outcome of concurrent route refresh");
            return outcome;
        }

        if let Some(at) = state.last_success
            && at.elapsed() < self.config.debounce
        {
            return RefreshOutcome::Debounced;
        }

        let fetched = self.source.fetch().await;
        let outcome = match fetched {
            Ok(entries) => self.install(entries),
            Err(e) => {
                warn!(error = %e, "Route refresh failed, keeping previous routes");
                RefreshOutcome::Failed
            }
        };

        if matches!(outcome, RefreshOutcome::Refreshed { .. }) {
            state.last_success = Some(Instant::now());
        }
        state.last_outcome = Some(outcome);
        self.attempts.fetch_add(1, Ordering::Release);

        outcome
    }

    /// Build and swap in a snapshot from `entries`.
    fn install(&self, entries: Vec<ProxyEntry>) -> RefreshOutcome {
        let routes = build_routes(entries);
        let count = routes.len();
        {
            let mut current = self.snapshot.write();
            let generation = current.generation + 1;
            *current = Arc::new(RouteSnapshot {
                routes,
                refreshed_at: Some(Utc::now()),
                generation,
            });
        }

        info!(routes = count, "Refreshed route policies");
        RefreshOutcome::Refreshed { routes: count }
    }
}

/// Keep online proxies with a parseable config and a subdomain.
fn build_routes(entries: Vec<ProxyEntry>) -> HashMap<String, RoutePolicy> {
    let mut routes = HashMap::new();

    for entry in entries {
        if entry.status != "online" {
            continue;
        }

        let conf: ProxyConf = match serde_json::from_value(entry.conf) {
            Ok(conf) => conf,
            Err(e) => {
                debug!(proxy = %entry.name, error = %e, "Skipping proxy with unreadable config");
                continue;
            }
        };

        if conf.subdomain.is_empty() {
            continue;
        }

        routes.insert(
            conf.subdomain.clone(),
            RoutePolicy {
                subdomain: conf.subdomain,
                metadata: conf.metadatas.unwrap_or_default(),
            },
        );
    }

    routes
}
