//! Thin services over the document store gateway.
//!
//! Every call follows the same shape: stamp timestamps on writes, call the
//! store, log the outcome, and hand any error back to the caller unchanged.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::repository::{
    Direction, Document, DocumentStoreState, Fields, ListQuery, StoreError, Subscription,
};

pub const USERS: &str = "users";
pub const BOOKS: &str = "books";
pub const ACTIVITIES: &str = "activities";

/// Default number of activities returned by `get_user_activities`.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 10;

/// RFC 3339 UTC with fixed microsecond precision, so string order equals time order.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn stamp_created(fields: &mut Fields) {
    let now = timestamp_now();
    fields.insert("createdAt".to_string(), Value::String(now.clone()));
    fields.insert("updatedAt".to_string(), Value::String(now));
}

fn stamp_updated(fields: &mut Fields) {
    fields.insert("updatedAt".to_string(), Value::String(timestamp_now()));
}

/// UserService
///
/// User profiles, keyed by the caller-supplied user id.
#[derive(Clone)]
pub struct UserService {
    store: DocumentStoreState,
}

impl UserService {
    pub fn new(store: DocumentStoreState) -> Self {
        Self { store }
    }

    pub async fn create_user_profile(
        &self,
        user_id: &str,
        mut profile: Fields,
    ) -> Result<(), StoreError> {
        stamp_created(&mut profile);
        match self.store.create_document(USERS, Some(user_id), profile).await {
            Ok(_) => {
                tracing::info!(user_id, "user profile created");
                Ok(())
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "error creating user profile");
                Err(e)
            }
        }
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<Fields>, StoreError> {
        match self.store.get_document(USERS, user_id).await {
            Ok(Some(profile)) => Ok(Some(profile)),
            Ok(None) => {
                tracing::info!(user_id, "no user profile found");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "error getting user profile");
                Err(e)
            }
        }
    }

    pub async fn update_user_profile(
        &self,
        user_id: &str,
        mut updates: Fields,
    ) -> Result<(), StoreError> {
        stamp_updated(&mut updates);
        self.store
            .update_document(USERS, user_id, updates)
            .await
            .inspect(|_| tracing::info!(user_id, "user profile updated"))
            .inspect_err(|e| tracing::error!(user_id, error = %e, "error updating user profile"))
    }

    pub async fn get_all_users(&self) -> Result<Vec<Document>, StoreError> {
        self.store
            .list_documents(USERS, &ListQuery::all())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "error getting users"))
    }
}

/// BookService
#[derive(Clone)]
pub struct BookService {
    store: DocumentStoreState,
}

impl BookService {
    pub fn new(store: DocumentStoreState) -> Self {
        Self { store }
    }

    /// Adds a book under a generated id and returns that id.
    pub async fn add_book(&self, mut book: Fields) -> Result<String, StoreError> {
        stamp_created(&mut book);
        self.store
            .create_document(BOOKS, None, book)
            .await
            .inspect(|id| tracing::info!(book_id = %id, "book added"))
            .inspect_err(|e| tracing::error!(error = %e, "error adding book"))
    }

    pub async fn get_all_books(&self) -> Result<Vec<Document>, StoreError> {
        self.store
            .list_documents(BOOKS, &ListQuery::all())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "error getting books"))
    }

    pub async fn get_books_by_category(&self, category: &str) -> Result<Vec<Document>, StoreError> {
        self.store
            .list_documents(BOOKS, &ListQuery::all().where_eq("category", category))
            .await
            .inspect_err(|e| tracing::error!(category, error = %e, "error getting books by category"))
    }

    /// on_books_snapshot
    ///
    /// Real-time view of the books collection. The callback gets the full list
    /// now and after every change, until the returned handle is dropped.
    pub async fn on_books_snapshot<F>(&self, callback: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&[Document]) + Send + Sync + 'static,
    {
        self.store
            .subscribe(BOOKS, Arc::new(callback))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "error subscribing to books"))
    }
}

/// ActivityService
///
/// Append-only activity log per user.
#[derive(Clone)]
pub struct ActivityService {
    store: DocumentStoreState,
}

impl ActivityService {
    pub fn new(store: DocumentStoreState) -> Self {
        Self { store }
    }

    /// log_activity
    ///
    /// Records `{ userId, activity, timestamp, type }`. `type` is taken from
    /// `activity.type` when it is a string, `"general"` otherwise.
    pub async fn log_activity(&self, user_id: &str, activity: Fields) -> Result<String, StoreError> {
        let activity_type = activity
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("general")
            .to_string();

        let mut entry = Fields::new();
        entry.insert("userId".to_string(), Value::String(user_id.to_string()));
        entry.insert("activity".to_string(), Value::Object(activity));
        entry.insert("type".to_string(), Value::String(activity_type));
        stamp_created(&mut entry);
        if let Some(created) = entry.get("createdAt").cloned() {
            entry.insert("timestamp".to_string(), created);
        }

        self.store
            .create_document(ACTIVITIES, None, entry)
            .await
            .inspect(|_| tracing::debug!(user_id, "activity logged"))
            .inspect_err(|e| tracing::error!(user_id, error = %e, "error logging activity"))
    }

    /// Newest first, at most `limit` entries.
    pub async fn get_user_activities(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let query = ListQuery::all()
            .where_eq("userId", user_id)
            .order_by("timestamp", Direction::Descending)
            .limit(limit);

        self.store
            .list_documents(ACTIVITIES, &query)
            .await
            .inspect_err(|e| tracing::error!(user_id, error = %e, "error getting user activities"))
    }
}
