use std::{collections::HashSet, sync::Arc};

use axum::http::Uri;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::session::SessionState;

/// Name of the route every protected navigation is redirected to.
pub const LOGIN_ROUTE: &str = "Login";

/// Query parameter carrying the originally requested full path.
pub const REDIRECT_PARAM: &str = "redirect";

/// Page
///
/// Opaque identifier of the view a route renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Page {
    Home,
    About,
    Login,
    Denied,
    NotFound,
}

/// Route
///
/// One entry of the static route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub name: String,
    pub requires_auth: bool,
    pub page: Page,
}

impl Route {
    pub fn public(path: &str, name: &str, page: Page) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            requires_auth: false,
            page,
        }
    }

    pub fn protected(path: &str, name: &str, page: Page) -> Self {
        Self {
            requires_auth: true,
            ..Self::public(path, name, page)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("duplicate route path `{0}`")]
    DuplicatePath(String),
    #[error("duplicate route name `{0}`")]
    DuplicateName(String),
    #[error("route path `{0}` must start with `/`")]
    RelativePath(String),
    #[error("route table has no `Login` route")]
    MissingLogin,
}

/// RouteTable
///
/// Immutable path → page table, built once at startup. Lookup is an exact
/// match on the path component (no trailing-slash folding, no parameters).
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    login_index: usize,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteTableError> {
        let mut paths = HashSet::new();
        let mut names = HashSet::new();

        for route in &routes {
            if !route.path.starts_with('/') {
                return Err(RouteTableError::RelativePath(route.path.clone()));
            }
            if !paths.insert(route.path.as_str()) {
                return Err(RouteTableError::DuplicatePath(route.path.clone()));
            }
            if !names.insert(route.name.as_str()) {
                return Err(RouteTableError::DuplicateName(route.name.clone()));
            }
        }

        let login_index = routes
            .iter()
            .position(|route| route.name == LOGIN_ROUTE)
            .ok_or(RouteTableError::MissingLogin)?;

        Ok(Self {
            routes,
            login_index,
        })
    }

    /// canonical
    ///
    /// The application's single router configuration. `/about` is the only
    /// route that requires an authenticated session.
    ///
    /// # Panics
    /// Never in practice: the table is fixed and checked by `RouteTable::new`.
    pub fn canonical() -> Self {
        let routes = vec![
            Route::public("/", "Home", Page::Home),
            Route::protected("/about", "About", Page::About),
            Route::public("/login", LOGIN_ROUTE, Page::Login),
            Route::public("/denied", "Denied", Page::Denied),
        ];
        match Self::new(routes) {
            Ok(table) => table,
            Err(e) => panic!("canonical route table is invalid: {e}"),
        }
    }

    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.path == path)
    }

    pub fn by_name(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn login_path(&self) -> &str {
        &self.routes[self.login_index].path
    }
}

/// NavigationRequest
///
/// One navigation attempt: the path used for route lookup and the full path
/// (path plus query) handed back to the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub target_path: String,
    pub full_path: String,
}

impl NavigationRequest {
    pub fn new(full_path: &str) -> Self {
        let target_path = full_path
            .split_once('?')
            .map_or(full_path, |(path, _)| path)
            .to_string();
        Self {
            target_path,
            full_path: full_path.to_string(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        let full_path = uri
            .path_and_query()
            .map_or_else(|| uri.path(), |pq| pq.as_str());
        Self::new(full_path)
    }
}

/// NavigationDecision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Redirect { path: String, redirect: String },
}

impl NavigationDecision {
    /// location
    ///
    /// The redirect URL, e.g. `/login?redirect=%2Fabout`. `None` for `Allow`.
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Redirect { path, redirect } => {
                let query = serde_urlencoded::to_string([(REDIRECT_PARAM, redirect.as_str())])
                    .unwrap_or_default();
                if query.is_empty() {
                    Some(path.clone())
                } else {
                    Some(format!("{path}?{query}"))
                }
            }
        }
    }
}

/// guard
///
/// Decides a single navigation from the target route's metadata and the
/// session flag. Pure: the same inputs always give the same decision.
///
/// - unresolvable target: Allow (the not-found page renders)
/// - public route: Allow
/// - protected route, authenticated: Allow
/// - protected route, unauthenticated: Redirect to `login_path` carrying the
///   requested full path
pub fn guard(
    target: Option<&Route>,
    authenticated: bool,
    request: &NavigationRequest,
    login_path: &str,
) -> NavigationDecision {
    match target {
        Some(route) if route.requires_auth && !authenticated => NavigationDecision::Redirect {
            path: login_path.to_string(),
            redirect: request.full_path.clone(),
        },
        _ => NavigationDecision::Allow,
    }
}

/// safe_redirect_target
///
/// Accepts a post-login redirect only when it is a local absolute path.
/// Anything else (missing, `//host`, `https://...`) falls back to `/`.
/// Browsers drop tabs and newlines from URLs and treat a backslash as `/`, so
/// targets with whitespace or control characters are rejected, as are backslashes.
pub fn safe_redirect_target(redirect: Option<&str>) -> &str {
    match redirect {
        Some(target) if is_local_path(target) => target,
        _ => "/",
    }
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target
            .chars()
            .any(|c| c == '\\' || c.is_whitespace() || c.is_control())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Render { page: Page, name: Option<String> },
    Redirect { location: String },
}

/// Navigator
///
/// Drives navigations against the route table and an injected session.
/// Every call runs the guard to completion before deciding what renders.
#[derive(Clone)]
pub struct Navigator {
    routes: Arc<RouteTable>,
    session: SessionState,
}

impl Navigator {
    pub fn new(routes: Arc<RouteTable>, session: SessionState) -> Self {
        Self { routes, session }
    }

    pub fn navigate(&self, full_path: &str) -> NavigationOutcome {
        let request = NavigationRequest::new(full_path);
        let route = self.routes.resolve(&request.target_path);
        let decision = guard(
            route,
            self.session.is_authenticated(),
            &request,
            self.routes.login_path(),
        );

        if let Some(location) = decision.location() {
            tracing::debug!(target_path = %request.target_path, %location, "navigation redirected");
            return NavigationOutcome::Redirect { location };
        }

        match route {
            Some(route) => NavigationOutcome::Render {
                page: route.page,
                name: Some(route.name.clone()),
            },
            None => NavigationOutcome::Render {
                page: Page::NotFound,
                name: None,
            },
        }
    }
}
