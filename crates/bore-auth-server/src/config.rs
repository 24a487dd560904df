//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "bore_session";

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8401";

/// Default cookie domain. The leading dot covers every tunnel subdomain.
pub const DEFAULT_COOKIE_DOMAIN: &str = ".bore.dunkirk.sh";

/// Route metadata value that turns on authentication.
pub const DEFAULT_AUTH_PROVIDER: &str = "indiko";

/// Default session lifetime (7 days).
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default interval between background route refreshes and attempt sweeps.
pub const DEFAULT_HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(30);

/// Session cookie attributes.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,
    /// `Domain` attribute, e.g. `.bore.example`.
    pub domain: String,
    /// Whether the `Secure` attribute is set.
    pub secure: bool,
    /// `Max-Age` of a freshly issued cookie.
    pub max_age: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: SESSION_COOKIE.to_string(),
            domain: DEFAULT_COOKIE_DOMAIN.to_string(),
            secure: true,
            max_age: DEFAULT_SESSION_LIFETIME,
        }
    }
}

impl CookieConfig {
    /// The base domain: the cookie domain without its leading dot, lowercased.
    pub fn base_domain(&self) -> String {
        self.domain.trim_start_matches('.').to_ascii_lowercase()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Session cookie attributes.
    pub cookie: CookieConfig,

    /// Route metadata `auth` value that requires a session.
    pub auth_provider: String,

    /// How often the background task refreshes routes and sweeps attempts.
    pub housekeeping_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8401)),
            cookie: CookieConfig::default(),
            auth_provider: DEFAULT_AUTH_PROVIDER.to_string(),
            housekeeping_period: DEFAULT_HOUSEKEEPING_PERIOD,
        }
    }
}

impl ServerConfig {
    /// Create a config for the given cookie domain.
    pub fn new(cookie_domain: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.cookie.domain = cookie_domain.into();
        config
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set whether cookies carry the `Secure` attribute.
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie.secure = secure;
        self
    }

    /// Set the session lifetime (also the cookie `Max-Age`).
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.cookie.max_age = lifetime;
        self
    }

    /// Set the recognized auth provider.
    pub fn with_auth_provider(mut self, provider: impl Into<String>) -> Self {
        self.auth_provider = provider.into();
        self
    }

    /// Set the housekeeping period.
    pub fn with_housekeeping_period(mut self, period: Duration) -> Self {
        self.housekeeping_period = period;
        self
    }

    /// The base domain tunnels live under.
    pub fn base_domain(&self) -> String {
        self.cookie.base_domain()
    }
}

/// Parse a listen address, accepting the `:port` shorthand.
pub fn parse_listen_addr(input: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    let input = input.trim();
    if input.starts_with(':') {
        format!("0.0.0.0{}", input).parse()
    } else {
        input.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), 8401);
        assert_eq!(config.cookie.name, "bore_session");
        assert!(config.cookie.secure);
        assert_eq!(config.auth_provider, "indiko");
        assert_eq!(config.base_domain(), "bore.dunkirk.sh");
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new(".Bore.Example")
            .with_bind_address("127.0.0.1:9000".parse().unwrap())
            .with_cookie_secure(false)
            .with_auth_provider("other")
            .with_session_lifetime(Duration::from_secs(60));

        assert_eq!(config.bind_address.port(), 9000);
        assert!(!config.cookie.secure);
        assert_eq!(config.auth_provider, "other");
        assert_eq!(config.cookie.max_age, Duration::from_secs(60));
        assert_eq!(config.base_domain(), "bore.example");
    }

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr(":8401").unwrap(),
            "0.0.0.0:8401".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_listen_addr("127.0.0.1:80").unwrap().port(), 80);
        assert!(parse_listen_addr("nonsense").is_err());
    }
}
