use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core components: session, navigation, document store gateway and its services.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod navigation;
pub mod pages;
pub mod repository;
pub mod services;
pub mod session;

// Module for routing segregation (Public API, Authenticated API, Pages).
pub mod routes;
use auth::Authenticated;
use routes::{authenticated, pages as page_router, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use navigation::{Navigator, RouteTable};
pub use repository::{DocumentStoreState, InMemoryDocumentStore, PostgresDocumentStore};
pub use services::{ActivityService, BookService, UserService};
pub use session::{FixedCredentialPolicy, SessionState};

use navigation::NavigationRequest;

/// ApiDoc
///
/// Auto-generated OpenAPI document for the JSON API, served at
/// `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_session, handlers::login, handlers::logout,
        handlers::get_users, handlers::get_user_profile, handlers::create_user_profile,
        handlers::update_user_profile, handlers::get_books, handlers::add_book,
        handlers::stream_books, handlers::log_activity, handlers::get_user_activities
    ),
    components(
        schemas(
            models::SessionStatus, models::LoginRequest, models::LoginResponse,
            models::WriteDocumentRequest, models::CreatedResponse, models::LogActivityRequest,
            repository::Document, navigation::Page,
        )
    ),
    tags(
        (name = "bookshelf-portal", description = "Bookshelf Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for everything a request may need. The session
/// is owned here and injected into the guard and the handlers; nothing reads it
/// from global state.
#[derive(Clone)]
pub struct AppState {
    /// Document store gateway (Postgres or in-memory).
    pub store: DocumentStoreState,
    /// The process-wide authentication flag.
    pub session: SessionState,
    /// The static route table consulted by the navigation guard.
    pub routes: Arc<RouteTable>,
    pub users: UserService,
    pub books: BookService,
    pub activities: ActivityService,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state and the services that sit on top of `store`.
    pub fn new(
        store: DocumentStoreState,
        session: SessionState,
        routes: RouteTable,
        config: AppConfig,
    ) -> Self {
        Self {
            users: UserService::new(store.clone()),
            books: BookService::new(store.clone()),
            activities: ActivityService::new(store.clone()),
            store,
            session,
            routes: Arc::new(routes),
            config,
        }
    }

    /// A navigator bound to this state's route table and session.
    pub fn navigator(&self) -> Navigator {
        Navigator::new(self.routes.clone(), self.session.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for DocumentStoreState {
    fn from_ref(app_state: &AppState) -> DocumentStoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.session.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// require_session
///
/// Middleware enforcing an authenticated session for `authenticated_routes`.
/// The `Authenticated` extractor rejects with 401 before the handler runs.
async fn require_session(_auth: Authenticated, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// navigation_guard
///
/// Runs before every page request. Resolves the target route, evaluates the
/// guard against the session flag, and either forwards the request (with the
/// resolved `Route` attached as an extension) or answers with a redirect to the
/// login page carrying the requested full path.
async fn navigation_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let navigation = NavigationRequest::from_uri(request.uri());
    let route = state.routes.resolve(&navigation.target_path);
    let decision = navigation::guard(
        route,
        state.session.is_authenticated(),
        &navigation,
        state.routes.login_path(),
    );

    match decision.location() {
        None => {
            if let Some(route) = route {
                request.extensions_mut().insert(route.clone());
            }
            next.run(request).await
        }
        Some(location) => {
            tracing::info!(
                target_path = %navigation.target_path,
                %location,
                "unauthenticated navigation redirected to login"
            );
            Redirect::to(&location).into_response()
        }
    }
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public API: No middleware applied.
        .merge(public::public_routes())
        // Authenticated API: Protected by `require_session`.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_session,
            )),
        )
        // Pages: every navigation, including the not-found fallback, goes
        // through the guard first.
        .merge(
            page_router::page_routes(&state.routes).layer(middleware::from_fn_with_state(
                state.clone(),
                navigation_guard,
            )),
        )
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` header,
/// so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
