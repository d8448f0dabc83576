//! # nestegg
//!
//! Session-gated toy finance server: a 401(k) contribution simulator and a
//! personal notes board.
//!
//! ## Architecture
//!
//! - **Auth**: TOML users file with constant-time password comparison; logins
//!   issue an `HttpOnly`, `SameSite=Strict` session cookie
//! - **Ledger**: In-memory accounts, one mutex per account, 50% employer match
//! - **Notes**: In-memory per-user notes with owner-checked deletes
//! - **Rate limiting**: Per-user, per-endpoint sliding windows plus a
//!   router-wide token bucket
//! - **HTTP**: Axum router with request IDs, panic recovery, and graceful
//!   shutdown; suspicious activity goes to a dedicated security log

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod auth;
mod config;
mod http;
mod ledger;
mod notes;
mod rate_limit;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::auth::load_auth;
use crate::config::{AppConfig, Cli};
use crate::http::{router, AppState, SessionStore};
use crate::ledger::AccountStore;
use crate::notes::NoteStore;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    init_logging(config.security_log.as_deref()).context("failed to initialize logging")?;

    let auth = load_auth(&config.users_file).context("failed to load users file")?;
    info!(
        bind = %config.bind,
        users_file = %config.users_file.display(),
        user_count = auth.user_count(),
        security_log = ?config.security_log.as_ref().map(|path| path.display().to_string()),
        session_ttl_hours = config.session_ttl_hours,
        secure_cookies = config.secure_cookies,
        one_time_reset = config.ledger.one_time_reset,
        simulated_latency = ?config.ledger.simulated_latency,
        "configuration loaded"
    );

    let state = AppState {
        auth: Arc::new(auth),
        sessions: SessionStore::new(config.session_ttl_hours),
        accounts: AccountStore::new(config.ledger),
        notes: NoteStore::new(),
        limiter: Arc::new(RateLimiter::new(config.rate_limits)),
        secure_cookies: config.secure_cookies,
        global_limit: config.global_limit,
    };

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    if !config.secure_cookies {
        tracing::warn!("secure cookies disabled; session cookies will be sent over plain HTTP");
    }

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "nestegg listening");

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
            info!("shutting down gracefully");
        })
        .await
        .context("server exited with error")
}

/// Initialize tracing with a compact stdout layer filtered by `RUST_LOG`
/// (default: `info`). When `security_log` is set, events with the `security`
/// target are also appended to that file.
fn init_logging(security_log: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(filter);

    let security = match security_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open security log {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(Targets::new().with_target("security", Level::INFO));
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(security)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
