//! Serve command - runs the forward-auth server.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser};
use tracing::{info, warn};

use bore_auth_oauth::{HttpTokenExchanger, OAuthConfig, PkceTracker, TrackerConfig};
use bore_auth_server::{
    DecisionEngine, FrpsRouteSource, RoutePolicyCache, Server, ServerConfig, parse_listen_addr,
};
use bore_auth_session::{KeySource, SessionCodec, SessionKeys};

use super::Context;

/// Arguments for the serve command.
///
/// Every option can also be set through the environment.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (`:8401` means all interfaces)
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8401")]
    pub listen: String,

    /// Base URL of the frps dashboard API
    #[arg(long, env = "FRPS_API_URL", default_value = "http://localhost:7400")]
    pub frps_api_url: String,

    /// Base URL of the Indiko authorization server
    #[arg(long, env = "INDIKO_URL", default_value = "https://indiko.dunkirk.sh")]
    pub indiko_url: String,

    /// OAuth client id
    #[arg(long, env = "CLIENT_ID", default_value = "https://bore.dunkirk.sh")]
    pub client_id: String,

    /// OAuth client secret (omitted from token requests when empty)
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth redirect URI
    #[arg(
        long,
        env = "REDIRECT_URI",
        default_value = "https://bore.dunkirk.sh/.auth/callback"
    )]
    pub redirect_uri: String,

    /// Session cookie domain; also defines the protected base domain
    #[arg(long, env = "COOKIE_DOMAIN", default_value = ".bore.dunkirk.sh")]
    pub cookie_domain: String,

    /// Set the Secure attribute on the session cookie
    #[arg(
        long,
        env = "COOKIE_SECURE",
        default_value = "true",
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub cookie_secure: bool,

    /// Cookie authentication key (base64 or raw; random when unset)
    #[arg(long, env = "COOKIE_HASH_KEY", hide_env_values = true)]
    pub cookie_hash_key: Option<String>,

    /// Cookie encryption key (base64 or raw; random when unset)
    #[arg(long, env = "COOKIE_BLOCK_KEY", hide_env_values = true)]
    pub cookie_block_key: Option<String>,

    /// Route metadata `auth` value that requires a login
    #[arg(long, env = "AUTH_PROVIDER", default_value = "indiko")]
    pub auth_provider: String,
}

/// Parser used when no subcommand is given: environment and defaults only.
#[derive(Parser)]
#[command(name = "bore-auth")]
struct EnvOnly {
    #[command(flatten)]
    args: ServeArgs,
}

impl ServeArgs {
    /// Arguments from the environment and defaults alone.
    pub fn from_env() -> Self {
        EnvOnly::parse_from(["bore-auth"]).args
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let bind_address = parse_listen_addr(&args.listen)
        .with_context(|| format!("Invalid listen address '{}'", args.listen))?;

    let config = ServerConfig::new(args.cookie_domain.trim())
        .with_bind_address(bind_address)
        .with_cookie_secure(args.cookie_secure)
        .with_auth_provider(args.auth_provider.trim());

    if config.base_domain().is_empty() {
        bail!("COOKIE_DOMAIN must name a domain, e.g. .bore.example");
    }
    if !config.cookie.secure {
        warn!("COOKIE_SECURE is off; session cookies will be sent over plain HTTP");
    }

    // ── Session keys ────────────────────────────────────────────────────

    let (keys, source) = SessionKeys::resolve(
        args.cookie_hash_key.as_deref(),
        args.cookie_block_key.as_deref(),
    );
    let codec = SessionCodec::new(config.cookie.name.clone(), &keys)
        .with_max_age(config.cookie.max_age);

    // ── OAuth ───────────────────────────────────────────────────────────

    let oauth = OAuthConfig::indiko(&args.indiko_url, args.client_id, args.redirect_uri)
        .with_client_secret(args.client_secret);
    let exchanger = Arc::new(
        HttpTokenExchanger::new(oauth.clone()).context("Failed to create token exchanger")?,
    );
    let tracker = Arc::new(PkceTracker::with_settings(
        oauth,
        TrackerConfig::default().with_session_lifetime(config.cookie.max_age),
        exchanger,
    ));

    // ── Routes ──────────────────────────────────────────────────────────

    let source_api = FrpsRouteSource::new(args.frps_api_url.clone())
        .context("Failed to create route source")?;
    let routes = Arc::new(RoutePolicyCache::new(Arc::new(source_api)));

    let engine = DecisionEngine::new(&config, routes, tracker, codec);

    info!(
        listen = %bind_address,
        base_domain = %config.base_domain(),
        frps = %args.frps_api_url,
        indiko = %args.indiko_url,
        ephemeral_keys = source == KeySource::Ephemeral,
        verbose = ctx.verbose,
        "bore-auth starting"
    );

    Server::new(config, engine)
        .run_with_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
