//! HTTP layer: Axum router, session handling, and the `/apps/401k` and
//! `/apps/notes` handlers.

mod auth;
mod error;
mod handlers;
mod notes;
mod responses;
mod retirement;
mod state;


pub use handlers::router;
pub use state::{AppState, SessionStore};
