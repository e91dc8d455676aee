use bookshelf_portal::{
    AppConfig, AppState, FixedCredentialPolicy, InMemoryDocumentStore, RouteTable, SessionState,
    create_router,
    models::{CreatedResponse, LoginResponse},
    repository::{Document, DocumentStoreState},
};
use reqwest::{StatusCode, header, redirect};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig::default();
    let session = SessionState::new(Arc::new(FixedCredentialPolicy::new(
        &config.auth_username,
        &config.auth_password,
    )));
    let store: DocumentStoreState = Arc::new(InMemoryDocumentStore::new());
    let state = AppState::new(store, session, RouteTable::canonical(), config);
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

/// Redirects are asserted, not followed.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_browser_login_flow() {
    let app = spawn_app().await;
    let client = client();

    // 1. Protected page bounces to the login page.
    let response = client
        .get(format!("{}/about", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/login?redirect=%2Fabout"
    );

    // 2. Login form submission forwards to the original target.
    let response = client
        .post(format!("{}/login", app.address))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("username=admin&password=password123&redirect=%2Fabout")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/about");

    // 3. The page now renders.
    let response = client
        .get(format!("{}/about", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("<h1>About</h1>"));

    // 4. Logging out guards it again.
    let response = client
        .post(format!("{}/logout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let response = client
        .get(format!("{}/about", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_book_lifecycle() {
    let app = spawn_app().await;
    let client = client();

    // Writes are rejected until the session is authenticated.
    let response = client
        .post(format!("{}/api/books", app.address))
        .json(&json!({"fields": {"title": "Dune", "category": "fiction"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let login: LoginResponse = client
        .post(format!("{}/api/session/login", app.address))
        .json(&json!({"username": "admin", "password": "password123"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(login.authenticated);
    assert_eq!(login.redirect.as_deref(), Some("/"));

    let response = client
        .post(format!("{}/api/books", app.address))
        .json(&json!({"fields": {"title": "Dune", "category": "fiction"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: CreatedResponse = response.json().await.unwrap();

    let books: Vec<Document> = client
        .get(format!("{}/api/books?category=fiction", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, created.id);
    assert_eq!(books[0].fields["title"], "Dune");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let spec: serde_json::Value = client()
        .get(format!("{}/api-docs/openapi.json", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(spec["paths"]["/api/session/login"].is_object());
    assert!(spec["paths"]["/api/users/{id}/activities"].is_object());
}
