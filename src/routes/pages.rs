use crate::{AppState, navigation::Page, navigation::RouteTable, pages};
use axum::{
    Router,
    routing::{get, post},
};

/// Page Router Module
///
/// One GET route per entry of the route table, plus the form endpoints of the
/// login flow and a not-found fallback. `create_router` layers the navigation
/// guard over the whole router, fallback included, so no page renders before
/// the guard has decided.
pub fn page_routes(table: &RouteTable) -> Router<AppState> {
    let router = table
        .routes()
        .iter()
        .fold(Router::new(), |router, route| {
            let method_router = if route.page == Page::Login {
                // POST /login
                // Login form submission; forwards to the `redirect` target on success.
                get(pages::render_page).post(pages::submit_login)
            } else {
                get(pages::render_page)
            };
            router.route(&route.path, method_router)
        });

    router
        // POST /logout
        .route("/logout", post(pages::submit_logout))
        .fallback(pages::not_found)
}
