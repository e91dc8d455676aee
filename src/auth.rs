use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
};

use crate::session::SessionState;

/// Authenticated Extractor Result
///
/// Proof that the process-wide session was authenticated when the request was
/// extracted. Carries no identity: the session model is a single flag.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// Authenticated Extractor Implementation
///
/// Implements Axum's FromRequestParts so any handler (or the session middleware
/// in `lib.rs`) can require a logged-in session by taking `Authenticated` as an
/// argument. Only the `SessionState` is pulled from the application state.
///
/// Rejection: Returns StatusCode::UNAUTHORIZED (401) when the session is not authenticated.
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionState::from_ref(state);
        if session.is_authenticated() {
            Ok(Authenticated)
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
