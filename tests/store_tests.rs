use bookshelf_portal::repository::{
    Direction, Document, DocumentStore, Fields, InMemoryDocumentStore, ListQuery, StoreError,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

// --- Test Data Helpers ---

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn ids(documents: &[Document]) -> Vec<&str> {
    documents.iter().map(|d| d.id.as_str()).collect()
}

// --- CRUD ---

#[tokio::test]
async fn test_create_with_id_then_get() {
    let store = InMemoryDocumentStore::new();
    let id = store
        .create_document("users", Some("u1"), fields(json!({"name": "Ada"})))
        .await
        .unwrap();

    assert_eq!(id, "u1");
    let stored = store.get_document("users", "u1").await.unwrap();
    assert_eq!(stored, Some(fields(json!({"name": "Ada"}))));
}

#[tokio::test]
async fn test_create_with_existing_id_overwrites() {
    let store = InMemoryDocumentStore::new();
    store
        .create_document("users", Some("u1"), fields(json!({"name": "Ada", "age": 36})))
        .await
        .unwrap();
    store
        .create_document("users", Some("u1"), fields(json!({"name": "Grace"})))
        .await
        .unwrap();

    let stored = store.get_document("users", "u1").await.unwrap().unwrap();
    assert_eq!(stored, fields(json!({"name": "Grace"})));
}

#[tokio::test]
async fn test_create_without_id_generates_distinct_ids() {
    let store = InMemoryDocumentStore::new();
    let a = store
        .create_document("books", None, fields(json!({"title": "A"})))
        .await
        .unwrap();
    let b = store
        .create_document("books", None, fields(json!({"title": "B"})))
        .await
        .unwrap();

    assert!(!a.is_empty());
    assert_ne!(a, b);
    assert_eq!(
        store
            .list_documents("books", &ListQuery::all())
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_get_missing_document_is_none() {
    let store = InMemoryDocumentStore::new();
    assert_eq!(store.get_document("users", "ghost").await.unwrap(), None);
}

#[tokio::test]
async fn test_update_merges_shallowly() {
    let store = InMemoryDocumentStore::new();
    store
        .create_document(
            "users",
            Some("u1"),
            fields(json!({"name": "Ada", "prefs": {"theme": "dark", "lang": "en"}})),
        )
        .await
        .unwrap();

    store
        .update_document("users", "u1", fields(json!({"prefs": {"theme": "light"}, "age": 36})))
        .await
        .unwrap();

    let stored = store.get_document("users", "u1").await.unwrap().unwrap();
    assert_eq!(
        stored,
        fields(json!({"name": "Ada", "prefs": {"theme": "light"}, "age": 36}))
    );
}

#[tokio::test]
async fn test_update_missing_document_is_not_found() {
    let store = InMemoryDocumentStore::new();
    let result = store
        .update_document("users", "ghost", fields(json!({"a": 1})))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { ref id, .. }) if id == "ghost"));
}

// --- Queries ---

#[tokio::test]
async fn test_list_empty_collection() {
    let store = InMemoryDocumentStore::new();
    let all = store.list_documents("books", &ListQuery::all()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_where_eq_filter() {
    let store = InMemoryDocumentStore::new();
    for (id, category) in [("b1", "fiction"), ("b2", "science"), ("b3", "fiction")] {
        store
            .create_document("books", Some(id), fields(json!({"category": category})))
            .await
            .unwrap();
    }

    let fiction = store
        .list_documents("books", &ListQuery::all().where_eq("category", "fiction"))
        .await
        .unwrap();
    assert_eq!(ids(&fiction), vec!["b1", "b3"]);

    let none = store
        .list_documents("books", &ListQuery::all().where_eq("category", "poetry"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_order_limit_and_missing_field_exclusion() {
    let store = InMemoryDocumentStore::new();
    store
        .create_document("activities", Some("a"), fields(json!({"timestamp": "2024-01-01T00:00:00.000000Z"})))
        .await
        .unwrap();
    store
        .create_document("activities", Some("b"), fields(json!({"timestamp": "2024-03-01T00:00:00.000000Z"})))
        .await
        .unwrap();
    store
        .create_document("activities", Some("c"), fields(json!({"timestamp": "2024-02-01T00:00:00.000000Z"})))
        .await
        .unwrap();
    store
        .create_document("activities", Some("d"), fields(json!({"note": "no timestamp"})))
        .await
        .unwrap();

    let newest_first = store
        .list_documents(
            "activities",
            &ListQuery::all().order_by("timestamp", Direction::Descending),
        )
        .await
        .unwrap();
    assert_eq!(ids(&newest_first), vec!["b", "c", "a"]);

    let top_two = store
        .list_documents(
            "activities",
            &ListQuery::all()
                .order_by("timestamp", Direction::Descending)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(ids(&top_two), vec!["b", "c"]);

    let oldest_first = store
        .list_documents(
            "activities",
            &ListQuery::all().order_by("timestamp", Direction::Ascending),
        )
        .await
        .unwrap();
    assert_eq!(ids(&oldest_first), vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_where_eq_matches_whole_values_only() {
    let store = InMemoryDocumentStore::new();
    store
        .create_document("books", Some("b1"), fields(json!({"tags": ["a", "b"]})))
        .await
        .unwrap();
    store
        .create_document("books", Some("b2"), fields(json!({"tags": ["a"]})))
        .await
        .unwrap();

    let exact = store
        .list_documents("books", &ListQuery::all().where_eq("tags", json!(["a"])))
        .await
        .unwrap();
    assert_eq!(ids(&exact), vec!["b2"]);
}

#[tokio::test]
async fn test_numeric_ordering() {
    let store = InMemoryDocumentStore::new();
    for (id, pages) in [("x", 300), ("y", 20), ("z", 1000)] {
        store
            .create_document("books", Some(id), fields(json!({"pages": pages})))
            .await
            .unwrap();
    }
    let by_pages = store
        .list_documents("books", &ListQuery::all().order_by("pages", Direction::Ascending))
        .await
        .unwrap();
    assert_eq!(ids(&by_pages), vec!["y", "x", "z"]);
}

// --- Subscriptions ---

#[tokio::test]
async fn test_subscribe_delivers_initial_and_change_snapshots() {
    let store = InMemoryDocumentStore::new();
    store
        .create_document("books", Some("b1"), fields(json!({"title": "Dune"})))
        .await
        .unwrap();

    let sizes: Arc<Mutex<Vec<usize>>> = Arc::default();
    let recorder = sizes.clone();
    let subscription = store
        .subscribe(
            "books",
            Arc::new(move |snapshot: &[Document]| recorder.lock().unwrap().push(snapshot.len())),
        )
        .await
        .unwrap();

    store
        .create_document("books", Some("b2"), fields(json!({"title": "Emma"})))
        .await
        .unwrap();
    store
        .update_document("books", "b1", fields(json!({"year": 1965})))
        .await
        .unwrap();
    // Writes to other collections are not delivered.
    store
        .create_document("users", Some("u1"), fields(json!({})))
        .await
        .unwrap();

    subscription.unsubscribe();
    store
        .create_document("books", Some("b3"), fields(json!({"title": "Ulysses"})))
        .await
        .unwrap();

    assert_eq!(*sizes.lock().unwrap(), vec![1, 2, 2]);
}

#[tokio::test]
async fn test_dropping_subscription_detaches() {
    let store = InMemoryDocumentStore::new();
    let calls: Arc<Mutex<usize>> = Arc::default();
    let counter = calls.clone();

    {
        let _subscription = store
            .subscribe(
                "books",
                Arc::new(move |_: &[Document]| *counter.lock().unwrap() += 1),
            )
            .await
            .unwrap();
    }

    store
        .create_document("books", None, fields(json!({"title": "Late"})))
        .await
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

fn spawn_writers(
    store: &InMemoryDocumentStore,
    writers: usize,
    writes_each: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..writers)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..writes_each {
                    store
                        .create_document("books", Some(&format!("w{n}-{i}")), Fields::new())
                        .await
                        .unwrap();
                }
            })
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_leave_subscriber_with_latest_snapshot() {
    let store = InMemoryDocumentStore::new();
    let sizes: Arc<Mutex<Vec<usize>>> = Arc::default();
    let recorder = sizes.clone();
    let _subscription = store
        .subscribe(
            "books",
            Arc::new(move |snapshot: &[Document]| recorder.lock().unwrap().push(snapshot.len())),
        )
        .await
        .unwrap();

    for writer in spawn_writers(&store, 16, 8) {
        writer.await.unwrap();
    }

    let delivered = sizes.lock().unwrap();
    assert_eq!(delivered.last(), Some(&128));
    assert!(
        delivered.windows(2).all(|pair| pair[0] <= pair[1]),
        "snapshots went backwards: {delivered:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribing_during_writes_never_goes_backwards() {
    let store = InMemoryDocumentStore::new();
    let writers = spawn_writers(&store, 8, 16);

    let sizes: Arc<Mutex<Vec<usize>>> = Arc::default();
    let recorder = sizes.clone();
    let _subscription = store
        .subscribe(
            "books",
            Arc::new(move |snapshot: &[Document]| recorder.lock().unwrap().push(snapshot.len())),
        )
        .await
        .unwrap();

    for writer in writers {
        writer.await.unwrap();
    }

    let delivered = sizes.lock().unwrap();
    assert_eq!(delivered.last(), Some(&128));
    assert!(
        delivered.windows(2).all(|pair| pair[0] <= pair[1]),
        "snapshots went backwards: {delivered:?}"
    );
}

// --- Failure Paths ---

#[tokio::test]
async fn test_failing_store_surfaces_errors() {
    let store = InMemoryDocumentStore::new_failing();

    assert!(matches!(
        store.create_document("users", Some("u1"), Fields::new()).await,
        Err(StoreError::Unavailable(_))
    ));
    assert!(store.get_document("users", "u1").await.is_err());
    assert!(store.update_document("users", "u1", Fields::new()).await.is_err());
    assert!(store.list_documents("users", &ListQuery::all()).await.is_err());
    assert!(
        store
            .subscribe("users", Arc::new(|_: &[Document]| {}))
            .await
            .is_err()
    );
}
