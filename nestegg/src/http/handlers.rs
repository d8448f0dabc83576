use std::any::Any;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::extract::WithRejection;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use super::auth::{expired_session_cookie, session_cookie, SESSION_COOKIE};
use super::error::ApiError;
use super::notes::{create_note, debug_dump, delete_note, list_notes, search_notes};
use super::responses::{HealthResponse, LoginRequest, LoginResponse, MessageResponse};
use super::retirement::{balance, contribute, dashboard, funds, reset, withdraw};
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond(state.global_limit.replenish_every_ms)
        .burst_size(state.global_limit.burst)
        .key_extractor(GlobalKeyExtractor)
        .finish();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/apps/401k", get(dashboard))
        .route("/apps/401k/", get(dashboard))
        .route("/apps/401k/balance", get(balance))
        .route("/apps/401k/funds", get(funds))
        .route("/apps/401k/contribute", post(contribute))
        .route("/apps/401k/withdraw", post(withdraw))
        .route("/apps/401k/reset", post(reset))
        .route("/apps/notes", get(list_notes))
        .route("/apps/notes/", get(list_notes))
        .route("/apps/notes/create", post(create_note))
        .route("/apps/notes/search", get(search_notes))
        .route("/apps/notes/delete/{id}", delete(delete_note))
        .route("/apps/notes/debug", get(debug_dump));

    match governor_conf {
        Some(conf) => app = app.layer(GovernorLayer::new(Arc::new(conf))),
        None => warn!(
            replenish_every_ms = state.global_limit.replenish_every_ms,
            burst = state.global_limit.burst,
            "invalid global rate limit; router-wide limiter disabled"
        ),
    }

    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(tower_http::request_id::SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            tower_http::request_id::MakeRequestUuid::default(),
        ))
        .layer(tower_http::request_id::PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %detail, "handler panicked");
    ApiError::Internal.into_response()
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let username = request.username.trim();
    if !state.auth.is_authorized(username, &request.password) {
        warn!(target: "security", user = %username, "failed login attempt");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.create(username.to_string());
    info!(user = %username, "user logged in");
    Ok((
        jar.add(session_cookie(token, state.secure_cookies)),
        Json(LoginResponse {
            message: "Logged in",
            username: username.to_string(),
        }),
    ))
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    if let Some(username) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.remove(cookie.value()))
    {
        info!(user = %username, "user logged out");
    }
    (
        jar.remove(expired_session_cookie()),
        Json(MessageResponse::new("Logged out")),
    )
}
