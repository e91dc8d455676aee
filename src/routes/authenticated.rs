use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes reachable only while the session is authenticated. The
/// `require_session` middleware wraps this router in `create_router`, and every
/// handler also takes the `Authenticated` extractor.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- User Profiles ---
        // GET /api/users
        .route("/api/users", get(handlers::get_users))
        // GET/PUT/PATCH /api/users/{id}
        // PUT creates or replaces the profile, PATCH merges into an existing one.
        .route(
            "/api/users/{id}",
            put(handlers::create_user_profile)
                .get(handlers::get_user_profile)
                .patch(handlers::update_user_profile),
        )
        // GET /api/users/{id}/activities?limit=...
        .route(
            "/api/users/{id}/activities",
            get(handlers::get_user_activities),
        )
        // --- Books ---
        // POST /api/books
        .route("/api/books", post(handlers::add_book))
        // --- Activity Log ---
        // POST /api/activities
        .route("/api/activities", post(handlers::log_activity))
}
