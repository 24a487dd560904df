//! Forward-auth decisions.
//!
//! The reverse proxy asks `/.auth/check` about every tunnel request. The
//! engine answers with a [`Verdict`]:
//!
//! 1. Hosts outside the base domain, or the bare base domain, pass through.
//! 2. Subdomains whose route policy does not name the recognized auth
//!    provider pass through.
//! 3. A request carrying a cookie that decodes to an unexpired session is
//!    allowed, with the identity attached.
//! 4. Everything else is sent to the login endpoint.
//!
//! Any failure to read or trust the session resolves to a login redirect.

use std::sync::Arc;

use bore_auth_oauth::PkceTracker;
use bore_auth_session::{Session, SessionCodec};
use tracing::{debug, info};
use url::Url;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::routes_cache::RoutePolicyCache;

/// The parts of the original request the proxy forwards to us.
#[derive(Debug, Clone, Default)]
pub struct ForwardedRequest {
    /// Original `Host`, possibly with a port.
    pub host: String,
    /// Original path and query.
    pub uri: String,
    /// Original scheme.
    pub scheme: String,
    /// Raw session cookie value, if present.
    pub session_cookie: Option<String>,
}

/// Outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not a protected route. Allow without identity headers.
    PassThrough,
    /// Protected route with a valid session.
    Allow(Session),
    /// Protected route without a valid session.
    Redirect { location: String },
}

/// A freshly minted session cookie and where to send the browser.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub cookie_value: String,
    pub redirect_to: String,
}

/// Makes auth decisions and drives the login flow.
#[derive(Debug)]
pub struct DecisionEngine {
    routes: Arc<RoutePolicyCache>,
    tracker: Arc<PkceTracker>,
    codec: SessionCodec,
    base_domain: String,
    auth_provider: String,
}

impl DecisionEngine {
    pub fn new(
        config: &ServerConfig,
        routes: Arc<RoutePolicyCache>,
        tracker: Arc<PkceTracker>,
        codec: SessionCodec,
    ) -> Self {
        Self {
            routes,
            tracker,
            codec,
            base_domain: config.base_domain(),
            auth_provider: config.auth_provider.clone(),
        }
    }

    pub fn routes(&self) -> &Arc<RoutePolicyCache> {
        &self.routes
    }

    pub fn tracker(&self) -> &Arc<PkceTracker> {
        &self.tracker
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Decide what to do with a forwarded request.
    pub async fn check(&self, request: &ForwardedRequest) -> Verdict {
        let Some(subdomain) = extract_subdomain(&request.host, &self.base_domain) else {
            return Verdict::PassThrough;
        };

        let Some(policy) = self.routes.lookup(&subdomain).await else {
            return Verdict::PassThrough;
        };

        if policy.auth() != Some(self.auth_provider.as_str()) {
            return Verdict::PassThrough;
        }

        if let Some(session) = self.read_session(request.session_cookie.as_deref()) {
            return Verdict::Allow(session);
        }

        Verdict::Redirect {
            location: self.login_url_for(request),
        }
    }

    /// Start a login and return the authorization server URL.
    pub fn login(&self, redirect: Option<&str>) -> String {
        let target = self.safe_redirect(redirect);
        self.tracker.begin(&target).url
    }

    /// Finish a login: redeem the code and mint a session cookie.
    pub async fn callback(&self, code: &str, state: &str) -> Result<IssuedSession> {
        if code.is_empty() || state.is_empty() {
            return Err(ServerError::MissingParams);
        }

        let login = self.tracker.complete(code, state).await?;
        let cookie_value = self.codec.encode(&login.session)?;

        info!(user = %login.session.user_id, "Issued session");

        Ok(IssuedSession {
            session: login.session,
            cookie_value,
            redirect_to: login.redirect_to,
        })
    }

    /// Where to send the browser after logout.
    pub fn logout_target(&self, redirect: Option<&str>) -> String {
        self.safe_redirect(redirect)
    }

    /// Return `target` if it points into the base domain, else the default.
    ///
    /// Only absolute http(s) URLs whose host is the base domain or one of
    /// its subdomains are accepted. The accepted URL is returned in its
    /// serialized form, which never contains control characters and is
    /// always a valid `Location` value.
    pub fn safe_redirect(&self, target: Option<&str>) -> String {
        let target = target.map(str::trim).filter(|t| !t.is_empty());
        let Some(target) = target else {
            return self.default_target();
        };

        match Url::parse(target) {
            Ok(url)
                if matches!(url.scheme(), "http" | "https")
                    && url
                        .host_str()
                        .is_some_and(|host| in_base_domain(host, &self.base_domain)) =>
            {
                url.into()
            }
            _ => {
                debug!(target, "Rejected redirect target outside base domain");
                self.default_target()
            }
        }
    }

    fn default_target(&self) -> String {
        format!("https://{}", self.base_domain)
    }

    fn read_session(&self, cookie: Option<&str>) -> Option<Session> {
        let cookie = cookie.filter(|c| !c.is_empty())?;
        match self.codec.decode(cookie) {
            Ok(session) if session.is_valid() => Some(session),
            Ok(session) => {
                debug!(user = %session.user_id, "Session expired");
                None
            }
            Err(e) => {
                debug!(error = %e, "Rejected session cookie");
                None
            }
        }
    }

    fn login_url_for(&self, request: &ForwardedRequest) -> String {
        let original = format!("{}://{}{}", request.scheme, request.host, request.uri);
        format!(
            "https://{}/.auth/login?redirect={}",
            self.base_domain,
            urlencoding::encode(&original)
        )
    }
}

/// The subdomain part of `host` under `base_domain`.
///
/// The port is ignored and matching is case-insensitive. Returns `None`
/// for hosts outside the base domain and for the base domain itself.
pub fn extract_subdomain(host: &str, base_domain: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let suffix = format!(".{}", base_domain.trim_start_matches('.').to_ascii_lowercase());

    let subdomain = host.strip_suffix(&suffix)?;
    if subdomain.is_empty() {
        return None;
    }
    Some(subdomain.to_string())
}

fn in_base_domain(host: &str, base_domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == base_domain || host.ends_with(&format!(".{}", base_domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{state_of, test_engine as engine_with};

    fn engine() -> DecisionEngine {
        engine_with(false)
    }

    fn request(host: &str, cookie: Option<String>) -> ForwardedRequest {
        ForwardedRequest {
            host: host.to_string(),
            uri: "/page?x=1".to_string(),
            scheme: "https".to_string(),
            session_cookie: cookie,
        }
    }

    fn session_cookie(engine: &DecisionEngine, lifetime: chrono::Duration) -> String {
        let session = Session::new(
            "https://alice.example/",
            "Alice",
            "alice@example.com",
            lifetime,
        );
        engine.codec().encode(&session).unwrap()
    }

    #[test]
    fn test_extract_subdomain() {
        assert_eq!(extract_subdomain("app.bore.example", "bore.example").as_deref(), Some("app"));
        assert_eq!(
            extract_subdomain("App.Bore.Example:8443", "bore.example").as_deref(),
            Some("app")
        );
        assert_eq!(extract_subdomain("a.b.bore.example", ".bore.example").as_deref(), Some("a.b"));
        assert_eq!(extract_subdomain("bore.example", "bore.example"), None);
        assert_eq!(extract_subdomain(".bore.example", "bore.example"), None);
        assert_eq!(extract_subdomain("evilbore.example", "bore.example"), None);
        assert_eq!(extract_subdomain("other.example", "bore.example"), None);
        assert_eq!(extract_subdomain("", "bore.example"), None);
    }

    #[tokio::test]
    async fn test_outside_base_domain_passes_through() {
        let engine = engine();
        assert_eq!(engine.check(&request("other.example", None)).await, Verdict::PassThrough);
        assert_eq!(engine.check(&request("bore.example", None)).await, Verdict::PassThrough);
    }

    #[tokio::test]
    async fn test_unprotected_routes_pass_through() {
        let engine = engine();
        assert_eq!(engine.check(&request("open.bore.example", None)).await, Verdict::PassThrough);
        assert_eq!(engine.check(&request("other.bore.example", None)).await, Verdict::PassThrough);
        assert_eq!(engine.check(&request("ghost.bore.example", None)).await, Verdict::PassThrough);
    }

    #[tokio::test]
    async fn test_protected_route_without_cookie_redirects() {
        let engine = engine();
        let verdict = engine.check(&request("app.bore.example", None)).await;

        let expected = format!(
            "https://bore.example/.auth/login?redirect={}",
            urlencoding::encode("https://app.bore.example/page?x=1")
        );
        assert_eq!(verdict, Verdict::Redirect { location: expected });
    }

    #[tokio::test]
    async fn test_valid_session_is_allowed() {
        let engine = engine();
        let cookie = session_cookie(&engine, chrono::Duration::days(1));

        match engine.check(&request("app.bore.example", Some(cookie))).await {
            Verdict::Allow(session) => {
                assert_eq!(session.user_id, "https://alice.example/");
                assert_eq!(session.email, "alice@example.com");
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_session_redirects() {
        let engine = engine();
        let cookie = session_cookie(&engine, chrono::Duration::seconds(-1));
        let verdict = engine.check(&request("app.bore.example", Some(cookie))).await;
        assert!(matches!(verdict, Verdict::Redirect { .. }));
    }

    #[tokio::test]
    async fn test_foreign_or_garbage_cookie_redirects() {
        let engine = engine();
        let foreign = session_cookie(&engine_with(false), chrono::Duration::days(1));

        for cookie in [foreign, "garbage".to_string(), String::new()] {
            let verdict = engine.check(&request("app.bore.example", Some(cookie))).await;
            assert!(matches!(verdict, Verdict::Redirect { .. }));
        }
    }

    #[test]
    fn test_safe_redirect() {
        let engine = engine();
        let default = "https://bore.example";

        assert_eq!(engine.safe_redirect(None), default);
        assert_eq!(engine.safe_redirect(Some("")), default);
        assert_eq!(
            engine.safe_redirect(Some("https://app.bore.example/x?y=1")),
            "https://app.bore.example/x?y=1"
        );
        assert_eq!(engine.safe_redirect(Some("http://bore.example/")), "http://bore.example/");
        assert_eq!(engine.safe_redirect(Some("https://evil.example/")), default);
        assert_eq!(engine.safe_redirect(Some("https://evilbore.example/")), default);
        assert_eq!(engine.safe_redirect(Some("https://bore.example@evil.example/")), default);
        assert_eq!(engine.safe_redirect(Some("javascript:alert(1)")), default);
        assert_eq!(engine.safe_redirect(Some("/relative")), default);
        assert_eq!(engine.logout_target(Some("https://evil.example")), default);
    }

    #[tokio::test]
    async fn test_login_then_callback_issues_cookie() {
        let engine = engine();
        let url = engine.login(Some("https://app.bore.example/page"));
        let state = state_of(&url);

        let issued = engine.callback("code", &state).await.unwrap();
        assert_eq!(issued.redirect_to, "https://app.bore.example/page");

        let decoded = engine.codec().decode(&issued.cookie_value).unwrap();
        assert_eq!(decoded, issued.session);
        assert_eq!(decoded.name, "Alice");

        // The new cookie opens the protected route.
        let verdict = engine
            .check(&request("app.bore.example", Some(issued.cookie_value)))
            .await;
        assert!(matches!(verdict, Verdict::Allow(_)));
    }

    #[tokio::test]
    async fn test_callback_errors() {
        let engine = engine();
        assert!(matches!(
            engine.callback("", "state").await,
            Err(ServerError::MissingParams)
        ));
        assert!(matches!(
            engine.callback("code", "").await,
            Err(ServerError::MissingParams)
        ));
        assert!(matches!(
            engine.callback("code", "never-issued").await,
            Err(ServerError::InvalidState)
        ));

        let failing = engine_with(true);
        let state = state_of(&failing.login(None));
        assert!(matches!(
            failing.callback("code", &state).await,
            Err(ServerError::AuthenticationFailed(_))
        ));
        // Consumed even though the exchange failed.
        assert!(matches!(
            failing.callback("code", &state).await,
            Err(ServerError::InvalidState)
        ));
    }

    #[test]
    fn test_safe_redirect_normalizes_control_characters() {
        let engine = engine();

        let target = engine.safe_redirect(Some("https://app.bore.example/a\nb\tc"));
        assert_eq!(target, "https://app.bore.example/abc");
        assert!(axum::http::HeaderValue::from_str(&target).is_ok());

        assert_eq!(
            engine.logout_target(Some("https://app.bore.example/a b")),
            "https://app.bore.example/a%20b"
        );
    }

    #[tokio::test]
    async fn test_callback_target_is_header_safe() {
        let engine = engine();
        let url = engine.login(Some("https://app.bore.example/a\nb"));

        let issued = engine.callback("code", &state_of(&url)).await.unwrap();
        assert_eq!(issued.redirect_to, "https://app.bore.example/ab");
        assert!(axum::http::HeaderValue::from_str(&issued.redirect_to).is_ok());
    }

    #[tokio::test]
    async fn test_login_sanitizes_target() {
        let engine = engine();
        let url = engine.login(Some("https://evil.example/"));
        assert_eq!(engine.tracker().len(), 1);

        let issued = engine.callback("code", &state_of(&url)).await.unwrap();
        assert_eq!(issued.redirect_to, "https://bore.example");
    }
}
