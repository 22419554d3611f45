pub mod appresult;
pub mod auth;
pub mod backend;
pub mod config;
pub mod index;
pub mod models;
pub mod res;
pub mod rooms;
pub mod session;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use appresult::{AppError, AppResult};

use backend::SqliteBackend;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub backend: SqliteBackend,
}

/// `/` and `/login*` are open; every room route sends anonymous visitors
/// back to `/`.
pub fn app(app_state: AppState, session_idle: time::Duration) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(session_idle));

    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .merge(rooms::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}
