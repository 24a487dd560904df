//! Forward-auth server for bore tunnels.
//!
//! A reverse proxy in front of the tunnels asks this server whether each
//! request may proceed. Tunnels opt in to authentication through route
//! metadata published by the tunnel server; everything else passes.
//!
//! # Features
//!
//! - `/.auth/check` decision endpoint with identity headers
//! - OAuth 2.0 authorization code + PKCE login against Indiko
//! - Encrypted, authenticated session cookie scoped to the tunnel domain
//! - Cached route policies with debounced, single-flight refresh
//! - Background refresh and sweep task
//!
//! # Example
//!
//! ```ignore
//! use bore_auth_server::{DecisionEngine, Server, ServerConfig};
//!
//! let config = ServerConfig::new(".bore.example");
//! let engine = DecisionEngine::new(&config, routes, tracker, codec);
//! Server::new(config, engine).run().await?;
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod housekeeping;
pub mod routes;
pub mod routes_cache;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CookieConfig, ServerConfig, parse_listen_addr};
pub use decision::{DecisionEngine, ForwardedRequest, IssuedSession, Verdict};
pub use error::{Result, ServerError};
pub use housekeeping::{Housekeeping, HousekeepingHandle};
pub use routes_cache::{
    CacheConfig, FrpsRouteSource, RefreshOutcome, RoutePolicy, RoutePolicyCache, RouteSnapshot,
    RouteSource, RouteSourceError,
};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The bore-auth HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: DecisionEngine) -> Self {
        Self {
            state: AppState::new(config, engine),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .merge(routes::auth_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves, then drain connections
    /// and stop the background task.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_address;
        self.serve(addr, shutdown).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.serve(addr, std::future::pending()).await
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        info!("Starting server on {}", addr);

        let housekeeping = Housekeeping::spawn(
            self.state.engine.routes().clone(),
            self.state.engine.tracker().clone(),
            self.state.config.housekeeping_period,
        );

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        housekeeping.shutdown().await;
        info!("Server stopped");

        served.map_err(|e| ServerError::Internal(format!("Server error: {}", e)))
    }
}
