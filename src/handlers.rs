use crate::{
    AppState,
    auth::Authenticated,
    models::{
        CreatedResponse, LogActivityRequest, LoginRequest, LoginResponse, SessionStatus,
        WriteDocumentRequest,
    },
    navigation::safe_redirect_target,
    repository::{Document, StoreError},
    services::DEFAULT_ACTIVITY_LIMIT,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream;
use serde::Deserialize;
use tokio::sync::watch;

// --- Filter Structs ---

/// BookFilter
///
/// Query parameters for the book listing endpoint (GET /api/books).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct BookFilter {
    /// Only books whose `category` field equals this value.
    pub category: Option<String>,
}

/// ActivityQuery
///
/// Query parameters for GET /api/users/{id}/activities.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ActivityQuery {
    /// Maximum number of entries, newest first. Defaults to 10.
    pub limit: Option<usize>,
}

/// Maps a gateway failure to the response status. The service layer has
/// already logged it.
fn store_failure(error: StoreError) -> StatusCode {
    match error {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// --- Session Handlers ---

/// get_session
///
/// [Public Route] Reports whether the process-wide session is authenticated.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Session status", body = SessionStatus))
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: state.session.is_authenticated(),
    })
}

/// login
///
/// [Public Route] Attempts a login against the configured authentication policy.
/// A failed attempt also clears a previously authenticated session.
#[utoipa::path(
    post,
    path = "/api/session/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = LoginResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    if state
        .session
        .attempt_login(&payload.username, &payload.password)
    {
        let redirect = safe_redirect_target(payload.redirect.as_deref()).to_string();
        (
            StatusCode::OK,
            Json(LoginResponse {
                authenticated: true,
                redirect: Some(redirect),
            }),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(LoginResponse::default()))
    }
}

/// logout
///
/// [Public Route] Clears the session. Always succeeds.
#[utoipa::path(
    post,
    path = "/api/session/logout",
    responses((status = 200, description = "Logged out", body = SessionStatus))
)]
pub async fn logout(State(state): State<AppState>) -> Json<SessionStatus> {
    state.session.logout();
    Json(SessionStatus {
        authenticated: false,
    })
}

// --- User Handlers ---

/// get_users
///
/// [Authenticated Route] Lists every user profile.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = [Document]))
)]
pub async fn get_users(
    _auth: Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<Document>>, StatusCode> {
    let users = state.users.get_all_users().await.map_err(store_failure)?;
    Ok(Json(users))
}

/// get_user_profile
///
/// [Authenticated Route] Retrieves one user profile by user id.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = Document),
        (status = 404, description = "No profile for this user")
    )
)]
pub async fn get_user_profile(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, StatusCode> {
    match state.users.get_user_profile(&id).await {
        Ok(Some(fields)) => Ok(Json(Document { id, fields })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(store_failure(e)),
    }
}

/// create_user_profile
///
/// [Authenticated Route] Creates (or replaces) the profile stored under the user id.
/// `createdAt` and `updatedAt` are stamped by the server.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    request_body = WriteDocumentRequest,
    responses((status = 201, description = "Created", body = CreatedResponse))
)]
pub async fn create_user_profile(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<WriteDocumentRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), StatusCode> {
    state
        .users
        .create_user_profile(&id, payload.fields)
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// update_user_profile
///
/// [Authenticated Route] Merges the given fields into an existing profile and
/// refreshes `updatedAt`. Returns 404 when the profile does not exist.
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    request_body = WriteDocumentRequest,
    responses(
        (status = 204, description = "Updated"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user_profile(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<WriteDocumentRequest>,
) -> StatusCode {
    match state.users.update_user_profile(&id, payload.fields).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => store_failure(e),
    }
}

// --- Book Handlers ---

/// get_books
///
/// [Public Route] Lists books, optionally restricted to one category.
#[utoipa::path(
    get,
    path = "/api/books",
    params(BookFilter),
    responses((status = 200, description = "Books", body = [Document]))
)]
pub async fn get_books(
    State(state): State<AppState>,
    Query(filter): Query<BookFilter>,
) -> Result<Json<Vec<Document>>, StatusCode> {
    let books = match filter.category {
        Some(category) => state.books.get_books_by_category(&category).await,
        None => state.books.get_all_books().await,
    }
    .map_err(store_failure)?;
    Ok(Json(books))
}

/// add_book
///
/// [Authenticated Route] Adds a book under a generated id.
#[utoipa::path(
    post,
    path = "/api/books",
    request_body = WriteDocumentRequest,
    responses((status = 201, description = "Created", body = CreatedResponse))
)]
pub async fn add_book(
    _auth: Authenticated,
    State(state): State<AppState>,
    Json(payload): Json<WriteDocumentRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), StatusCode> {
    let id = state
        .books
        .add_book(payload.fields)
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// stream_books
///
/// [Public Route] Server-sent events: one `snapshot` event carrying the full
/// book list on connect and after every change. The store subscription lives
/// as long as the stream, so a disconnecting client unsubscribes.
///
/// Snapshots go through a `watch` channel, so a client that reads slowly only
/// ever has the latest one pending and skips the ones it missed.
#[utoipa::path(
    get,
    path = "/api/books/stream",
    responses((status = 200, description = "text/event-stream of book snapshots"))
)]
pub async fn stream_books(State(state): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = watch::channel(Vec::<Document>::new());

    let subscription = match state
        .books
        .on_books_snapshot(move |snapshot| {
            tx.send_replace(snapshot.to_vec());
        })
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => return store_failure(e).into_response(),
    };

    let events = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        // Ends the stream if the store drops the callback (and with it the sender).
        rx.changed().await.ok()?;
        let snapshot = rx.borrow_and_update().clone();
        let event = Event::default().event("snapshot").json_data(snapshot);
        Some((event, (rx, subscription)))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// --- Activity Handlers ---

/// log_activity
///
/// [Authenticated Route] Appends an activity entry for a user.
#[utoipa::path(
    post,
    path = "/api/activities",
    request_body = LogActivityRequest,
    responses((status = 201, description = "Logged", body = CreatedResponse))
)]
pub async fn log_activity(
    _auth: Authenticated,
    State(state): State<AppState>,
    Json(payload): Json<LogActivityRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), StatusCode> {
    let id = state
        .activities
        .log_activity(&payload.user_id, payload.activity)
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// get_user_activities
///
/// [Authenticated Route] A user's most recent activities, newest first.
#[utoipa::path(
    get,
    path = "/api/users/{id}/activities",
    params(("id" = String, Path, description = "User ID"), ActivityQuery),
    responses((status = 200, description = "Activities", body = [Document]))
)]
pub async fn get_user_activities(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Document>>, StatusCode> {
    let activities = state
        .activities
        .get_user_activities(&id, query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
        .await
        .map_err(store_failure)?;
    Ok(Json(activities))
}
