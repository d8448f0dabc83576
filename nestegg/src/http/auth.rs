use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;

pub const SESSION_COOKIE: &str = "nestegg_session";

/// The username behind a valid session cookie. Extracting it rejects the
/// request with 401 when the cookie is missing, unknown, or expired.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub username: String,
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE) else {
            debug!(path = %parts.uri.path(), "request without session cookie");
            return Err(ApiError::NotLoggedIn);
        };

        match state.sessions.get(token.value()) {
            Some(username) => Ok(SessionUser { username }),
            None => {
                debug!(path = %parts.uri.path(), "session unknown or expired");
                Err(ApiError::NotLoggedIn)
            }
        }
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}
