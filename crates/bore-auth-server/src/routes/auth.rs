//! Forward-auth endpoints under `/.auth`.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::warn;

use crate::config::CookieConfig;
use crate::decision::{ForwardedRequest, Verdict};
use crate::error::Result;
use crate::state::AppState;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_URI: &str = "x-forwarded-uri";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Query for `/.auth/login` and `/.auth/logout`.
#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub redirect: Option<String>,
}

/// Query for `/.auth/callback`.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Create the `/.auth` routes.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/.auth/check", get(check_handler))
        .route("/.auth/login", get(login_handler))
        .route("/.auth/callback", get(callback_handler))
        .route("/.auth/logout", get(logout_handler))
}

/// Decide whether the proxied request may proceed.
///
/// 200 to allow (with `X-Auth-*` identity headers for logged-in users),
/// 307 to the login endpoint otherwise.
pub async fn check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    let request = forwarded_request(&headers, &uri, &jar, &state.config.cookie.name);

    match state.engine.check(&request).await {
        Verdict::PassThrough => StatusCode::OK.into_response(),
        Verdict::Allow(session) => {
            let mut identity = HeaderMap::new();
            for (name, value) in [
                ("x-auth-user", &session.user_id),
                ("x-auth-name", &session.name),
                ("x-auth-email", &session.email),
            ] {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        identity.insert(HeaderName::from_static(name), value);
                    }
                    Err(_) => warn!(header = name, "Dropping identity header with invalid bytes"),
                }
            }
            (StatusCode::OK, identity).into_response()
        }
        Verdict::Redirect { location } => Redirect::temporary(&location).into_response(),
    }
}

/// Start a login and send the browser to the authorization server.
pub async fn login_handler(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Redirect {
    let url = state.engine.login(query.redirect.as_deref());
    Redirect::temporary(&url)
}

/// Authorization server callback.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let code = query.code.unwrap_or_default();
    let login_state = query.state.unwrap_or_default();

    let issued = state.engine.callback(&code, &login_state).await?;

    let cookie = session_cookie(
        &state.config.cookie,
        issued.cookie_value,
        max_age(&state.config.cookie),
    );
    Ok((jar.add(cookie), Redirect::temporary(&issued.redirect_to)))
}

/// Clear the session cookie and redirect.
pub async fn logout_handler(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let cookie = session_cookie(&state.config.cookie, String::new(), time::Duration::ZERO);
    let target = state.engine.logout_target(query.redirect.as_deref());
    (jar.add(cookie), Redirect::temporary(&target))
}

fn forwarded_request(
    headers: &HeaderMap,
    uri: &Uri,
    jar: &CookieJar,
    cookie_name: &str,
) -> ForwardedRequest {
    let host = header_str(headers, X_FORWARDED_HOST)
        .map(|h| h.split(',').next().unwrap_or_default().trim())
        .or_else(|| header_str(headers, header::HOST.as_str()))
        .unwrap_or_default()
        .to_string();

    let uri = header_str(headers, X_FORWARDED_URI)
        .map(str::to_string)
        .unwrap_or_else(|| {
            uri.path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string())
        });

    let scheme = header_str(headers, X_FORWARDED_PROTO)
        .unwrap_or("https")
        .to_string();

    ForwardedRequest {
        host,
        uri,
        scheme,
        session_cookie: jar.get(cookie_name).map(|c| c.value().to_string()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn session_cookie(
    config: &CookieConfig,
    value: String,
    max_age: time::Duration,
) -> Cookie<'static> {
    Cookie::build((config.name.clone(), value))
        .path("/")
        .domain(config.domain.clone())
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn max_age(config: &CookieConfig) -> time::Duration {
    time::Duration::seconds(i64::try_from(config.max_age.as_secs()).unwrap_or(i64::MAX))
}
