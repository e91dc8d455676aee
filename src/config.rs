use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded
/// and pulled into handlers via `FromRef`, like the rest of `AppState`.
#[derive(Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls logging format and which settings are mandatory.
    pub env: Env,
    // Postgres connection string. `None` in local mode selects the in-memory store.
    pub db_url: Option<String>,
    // Upper bound on pooled Postgres connections.
    pub db_max_connections: u32,
    // Credentials accepted by the placeholder authentication policy.
    pub auth_username: String,
    pub auth_password: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context: pretty logs and development fallbacks locally,
/// JSON logs and mandatory secrets in production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_AUTH_USERNAME: &str = "admin";
const LOCAL_AUTH_PASSWORD: &str = "password123";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

impl Default for AppConfig {
    /// default
    ///
    /// A safe, non-panicking configuration for test setup: local mode, in-memory
    /// store, development credentials.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            auth_username: LOCAL_AUTH_USERNAME.to_string(),
            auth_password: LOCAL_AUTH_PASSWORD.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `DATABASE_URL`, `AUTH_USERNAME` or
    /// `AUTH_PASSWORD` is missing, so the service never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        match env {
            Env::Local => Self {
                env: Env::Local,
                db_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                db_max_connections,
                auth_username: env::var("AUTH_USERNAME")
                    .unwrap_or_else(|_| LOCAL_AUTH_USERNAME.to_string()),
                auth_password: env::var("AUTH_PASSWORD")
                    .unwrap_or_else(|_| LOCAL_AUTH_PASSWORD.to_string()),
                bind_addr,
            },
            Env::Production => Self {
                env: Env::Production,
                db_url: Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                ),
                db_max_connections,
                auth_username: env::var("AUTH_USERNAME")
                    .expect("FATAL: AUTH_USERNAME required in prod"),
                auth_password: env::var("AUTH_PASSWORD")
                    .expect("FATAL: AUTH_PASSWORD required in prod"),
                bind_addr,
            },
        }
    }
}
