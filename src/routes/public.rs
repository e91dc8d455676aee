use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated** and accessible to any client. Logging
/// in and out has to live here, as does the read-only book catalogue.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /api/session
        // Current value of the session flag.
        .route("/api/session", get(handlers::get_session))
        // POST /api/session/login
        // Verifies credentials through the authentication policy.
        .route("/api/session/login", post(handlers::login))
        // POST /api/session/logout
        .route("/api/session/logout", post(handlers::logout))
        // GET /api/books?category=...
        .route("/api/books", get(handlers::get_books))
        // GET /api/books/stream
        // Server-sent book snapshots, backed by a store subscription.
        .route("/api/books/stream", get(handlers::stream_books))
}
