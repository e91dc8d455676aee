use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::Fields;

// --- Session Schemas ---

/// SessionStatus
///
/// Output schema for `GET /api/session` and `POST /api/session/logout`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SessionStatus {
    pub authenticated: bool,
}

/// LoginRequest
///
/// Input payload for `POST /api/session/login`. The password is handed to the
/// authentication policy and never logged or stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Path to continue to after a successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// LoginResponse
///
/// `redirect` is present only on success and is always a local path.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// LoginForm
///
/// Form body posted by the login page (`POST /login`).
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub redirect: Option<String>,
}

// --- Document Payloads ---

/// WriteDocumentRequest
///
/// Input payload for creating or updating a user profile and for adding a book.
/// Timestamps are assigned by the server; any supplied `createdAt`/`updatedAt`
/// is overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct WriteDocumentRequest {
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown>")]
    pub fields: Fields,
}

/// CreatedResponse
///
/// Output schema carrying the id of a newly created document.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatedResponse {
    pub id: String,
}

/// LogActivityRequest
///
/// Input payload for `POST /api/activities`. `activity.type` (if a string)
/// becomes the entry's type; otherwise the type is `general`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LogActivityRequest {
    pub user_id: String,
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown>")]
    pub activity: Fields,
}
