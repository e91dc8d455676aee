use bookshelf_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    navigation::RouteTable,
    repository::{DocumentStoreState, InMemoryDocumentStore, PostgresDocumentStore},
    session::{FixedCredentialPolicy, SessionEvent, SessionState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point for the application, responsible for initializing
/// all core components: Configuration, Logging, Document Store, Session, and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    // AppConfig::load() panics when a production setting is missing.
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise fall back to the development defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bookshelf_portal=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON lines for log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Document Store Initialization
    // Postgres when DATABASE_URL is set (always, in production); otherwise the
    // in-memory store, which forgets everything on restart.
    let store: DocumentStoreState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            let postgres = PostgresDocumentStore::new(pool);
            postgres
                .ensure_schema()
                .await
                .expect("FATAL: Failed to create the documents table.");
            Arc::new(postgres)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory document store");
            Arc::new(InMemoryDocumentStore::new())
        }
    };

    // 5. Session Initialization
    // One session for the whole process, starting unauthenticated.
    let policy = FixedCredentialPolicy::new(&config.auth_username, &config.auth_password);
    let session = SessionState::new(Arc::new(policy));
    session.subscribe(|event, authenticated| match event {
        SessionEvent::LoggedIn => tracing::info!(authenticated, "session logged in"),
        SessionEvent::LoginRejected => tracing::warn!(authenticated, "login attempt rejected"),
        SessionEvent::LoggedOut => tracing::info!(authenticated, "session logged out"),
    });

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(store, session, RouteTable::canonical(), config);

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    // The long-running Axum server process.
    axum::serve(listener, app).await.unwrap();
}
