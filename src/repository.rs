use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder, types::Json};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, PoisonError, RwLock, Weak,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// The field map of a single document.
pub type Fields = Map<String, Value>;

/// Document
///
/// A stored document: its id within the collection plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Document {
    pub id: String,
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown>")]
    pub fields: Fields,
}

/// StoreError
///
/// Every failure a gateway call can surface. Callers decide what to do with it;
/// nothing here is retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document `{id}` not found in `{collection}`")]
    NotFound { collection: String, id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Equality filter on a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// ListQuery
///
/// Optional filter, ordering and limit for `list_documents`. Ordering by a
/// field excludes documents that do not have that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<FieldFilter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Snapshot callback for `subscribe`: receives the whole collection.
pub type SnapshotCallback = Arc<dyn Fn(&[Document]) + Send + Sync>;

/// DocumentStore Trait
///
/// The gateway contract to the hosted document database. Handlers and services
/// only see this trait (`Arc<dyn DocumentStore>`), so the backend can be the
/// Postgres adapter in production or the in-memory adapter locally and in tests.
///
/// Every call is independent and at-most-once from the caller's side.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// With `Some(id)` the document is created or overwritten; with `None` a
    /// fresh id is generated. Returns the id.
    async fn create_document(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> Result<String, StoreError>;

    /// `Ok(None)` when the document does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError>;

    /// Shallow merge of `partial` into an existing document.
    /// `StoreError::NotFound` when it does not exist.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError>;

    async fn list_documents(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Document>, StoreError>;

    /// Delivers the current snapshot immediately, then a new snapshot after
    /// every write to `collection`, until the returned handle is dropped.
    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<Subscription, StoreError>;
}

/// DocumentStoreState
///
/// The concrete type used to share the gateway across the application state.
pub type DocumentStoreState = Arc<dyn DocumentStore>;

fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// --- Change Feed ---

#[derive(Default)]
struct FeedInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (String, SnapshotCallback)>>,
    publication: AsyncMutex<()>,
}

impl FeedInner {
    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// ChangeFeed
///
/// Listener registry shared by the store adapters. Callbacks are collected
/// under the listener lock and invoked after it is released.
///
/// Adapters hold the `publication` guard from before reading a snapshot until
/// it has been published; in `subscribe` it also covers registration and the
/// initial delivery. Snapshots reach listeners in the order they were read, and
/// the last one delivered reflects every finished write.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    inner: Arc<FeedInner>,
}

impl ChangeFeed {
    pub fn register(&self, collection: &str, callback: SnapshotCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (collection.to_string(), callback));
        Subscription {
            id,
            feed: Arc::downgrade(&self.inner),
        }
    }

    pub async fn publication(&self) -> AsyncMutexGuard<'_, ()> {
        self.inner.publication.lock().await
    }

    pub fn has_listeners(&self, collection: &str) -> bool {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|(listened, _)| listened == collection)
    }

    pub fn publish(&self, collection: &str, snapshot: &[Document]) {
        let callbacks: Vec<SnapshotCallback> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(listened, _)| listened == collection)
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(snapshot);
        }
    }
}

/// Subscription
///
/// Handle returned by `subscribe`. Dropping it detaches the callback.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    id: u64,
    feed: Weak<FeedInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.remove(self.id);
        }
    }
}

// --- Postgres Adapter ---

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    fields: Json<Fields>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            fields: row.fields.0,
        }
    }
}

/// PostgresDocumentStore
///
/// Backs every collection with one JSONB table keyed by `(collection, id)`.
pub struct PostgresDocumentStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PostgresDocumentStore {
    /// Creates a new store using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    /// ensure_schema
    ///
    /// Creates the `documents` table if it does not already exist. Safe to call
    /// at every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields JSONB NOT NULL DEFAULT '{}'::jsonb,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pushes a fresh snapshot to subscribers of `collection`, if any.
    async fn notify(&self, collection: &str) {
        if !self.feed.has_listeners(collection) {
            return;
        }
        let _publication = self.feed.publication().await;
        match self.list_documents(collection, &ListQuery::all()).await {
            Ok(snapshot) => self.feed.publish(collection, &snapshot),
            Err(e) => tracing::warn!(collection, error = %e, "snapshot refresh failed"),
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn create_document(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let id = id.map_or_else(new_document_id, str::to_string);
        sqlx::query(
            r#"INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)
               ON CONFLICT (collection, id) DO UPDATE SET fields = EXCLUDED.fields"#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(fields))
        .execute(&self.pool)
        .await?;

        self.notify(collection).await;
        Ok(id)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, fields FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.fields.0))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError> {
        // `||` on jsonb is a shallow merge, matching the in-memory adapter.
        let result = sqlx::query(
            "UPDATE documents SET fields = fields || $3 WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(partial))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        self.notify(collection).await;
        Ok(())
    }

    /// list_documents
    ///
    /// Builds the query with QueryBuilder so every caller-supplied value is bound.
    /// The equality filter compares whole JSONB values, exactly like the
    /// in-memory adapter (no partial array or object matches).
    async fn list_documents(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, fields FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());

        if let Some(filter) = &query.filter {
            builder.push(" AND fields -> ");
            builder.push_bind(filter.field.clone());
            builder.push(" = ");
            builder.push_bind(Json(filter.value.clone()));
        }

        match &query.order {
            Some(order) => {
                builder.push(" AND jsonb_exists(fields, ");
                builder.push_bind(order.field.clone());
                builder.push(") ORDER BY fields -> ");
                builder.push_bind(order.field.clone());
                builder.push(match order.direction {
                    Direction::Ascending => " ASC",
                    Direction::Descending => " DESC",
                });
                builder.push(", id");
            }
            None => {
                builder.push(" ORDER BY id");
            }
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<Subscription, StoreError> {
        // Register before reading so no write between the two is missed; the
        // guard holds back that write's snapshot until the initial one is out.
        let _publication = self.feed.publication().await;
        let subscription = self.feed.register(collection, callback.clone());
        let snapshot = self.list_documents(collection, &ListQuery::all()).await?;
        callback(&snapshot);
        Ok(subscription)
    }
}

// --- In-Memory Adapter ---

/// InMemoryDocumentStore
///
/// A process-local implementation of `DocumentStore` used when no database is
/// configured in `Env::Local`, and by the test suites. `new_failing()` builds an
/// instance whose every call fails, for exercising error paths.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Fields>>>>,
    feed: ChangeFeed,
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.should_fail {
            return Err(StoreError::Unavailable(
                "in-memory store configured to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn snapshot(&self, collection: &str, query: &ListQuery) -> Vec<Document> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(documents) = collections.get(collection) else {
            return Vec::new();
        };

        let mut matching: Vec<Document> = documents
            .iter()
            .filter(|(_, fields)| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|filter| fields.get(&filter.field) == Some(&filter.value))
            })
            .filter(|(_, fields)| {
                query
                    .order
                    .as_ref()
                    .is_none_or(|order| fields.contains_key(&order.field))
            })
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        // BTreeMap iteration already yields id order; sort_by is stable.
        if let Some(order) = &query.order {
            matching.sort_by(|a, b| {
                let ordering =
                    compare_values(a.fields.get(&order.field), b.fields.get(&order.field));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        matching
    }

    async fn notify(&self, collection: &str) {
        if self.feed.has_listeners(collection) {
            let _publication = self.feed.publication().await;
            let snapshot = self.snapshot(collection, &ListQuery::all());
            self.feed.publish(collection, &snapshot);
        }
    }
}

/// Orders JSON scalars: numbers numerically, strings lexically, booleans
/// false before true. Values of different kinds compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_document(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> Result<String, StoreError> {
        self.check_available()?;
        let id = id.map_or_else(new_document_id, str::to_string);
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);

        self.notify(collection).await;
        Ok(id)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
        self.check_available()?;
        Ok(self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let existing = collections
                .get_mut(collection)
                .and_then(|documents| documents.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            existing.extend(partial);
        }

        self.notify(collection).await;
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        Ok(self.snapshot(collection, query))
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<Subscription, StoreError> {
        self.check_available()?;
        let _publication = self.feed.publication().await;
        let subscription = self.feed.register(collection, callback.clone());
        callback(&self.snapshot(collection, &ListQuery::all()));
        Ok(subscription)
    }
}
