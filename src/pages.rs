//! Page views for the routes of the route table.
//!
//! Every request reaching these handlers has already passed the navigation
//! guard middleware, which attaches the resolved `Route` as an extension.

use axum::{
    Extension, Form,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::{
    AppState,
    models::LoginForm,
    navigation::{Page, REDIRECT_PARAM, Route, safe_redirect_target},
};

/// Query accepted by page routes; only the login page reads it.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub redirect: Option<String>,
}

struct PageContext<'a> {
    authenticated: bool,
    redirect: Option<&'a str>,
    error: Option<&'a str>,
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, authenticated: bool, body: &str) -> String {
    let session = if authenticated {
        r#"<form method="post" action="/logout"><button type="submit">Log out</button></form>"#
    } else {
        r#"<a href="/login">Log in</a>"#
    };
    format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} · Bookshelf</title></head>
<body>
<nav><a href="/">Home</a> | <a href="/about">About</a> | {session}</nav>
<main>
{body}
</main>
</body>
</html>"#
    )
}

fn render(page: Page, ctx: &PageContext<'_>) -> String {
    match page {
        Page::Home => layout(
            "Home",
            ctx.authenticated,
            "<h1>Bookshelf</h1><p>Browse the catalogue and keep track of your reading.</p>",
        ),
        Page::About => layout(
            "About",
            ctx.authenticated,
            "<h1>About</h1><p>Members-only area: profile, reading activity and book submissions.</p>",
        ),
        Page::Login => {
            let error = ctx
                .error
                .map(|message| format!(r#"<p role="alert">{}</p>"#, escape_html(message)))
                .unwrap_or_default();
            let redirect = ctx
                .redirect
                .map(|target| {
                    format!(
                        r#"<input type="hidden" name="{REDIRECT_PARAM}" value="{}">"#,
                        escape_html(target)
                    )
                })
                .unwrap_or_default();
            let body = format!(
                r#"<h1>Log in</h1>{error}
<form method="post" action="/login">
<label>Username <input name="username" autocomplete="username"></label>
<label>Password <input name="password" type="password" autocomplete="current-password"></label>
{redirect}
<button type="submit">Log in</button>
</form>"#
            );
            layout("Log in", ctx.authenticated, &body)
        }
        Page::Denied => layout(
            "Access denied",
            ctx.authenticated,
            "<h1>Access denied</h1><p>You do not have permission to view this page.</p>",
        ),
        Page::NotFound => layout(
            "Not found",
            ctx.authenticated,
            "<h1>Not found</h1><p>There is no page at this address.</p>",
        ),
    }
}

/// render_page
///
/// Renders the page of the route the guard resolved.
pub async fn render_page(
    State(state): State<AppState>,
    Extension(route): Extension<Route>,
    Query(query): Query<PageQuery>,
) -> Html<String> {
    let ctx = PageContext {
        authenticated: state.session.is_authenticated(),
        redirect: query.redirect.as_deref(),
        error: None,
    };
    Html(render(route.page, &ctx))
}

/// Fallback for paths outside the route table. The guard lets these through.
pub async fn not_found(State(state): State<AppState>) -> Response {
    let ctx = PageContext {
        authenticated: state.session.is_authenticated(),
        redirect: None,
        error: None,
    };
    (StatusCode::NOT_FOUND, Html(render(Page::NotFound, &ctx))).into_response()
}

/// submit_login
///
/// Handles the login form. On success the user is forwarded to the page that
/// triggered the redirect (local paths only), else to `/`. On failure the login
/// page is shown again with 401 and the redirect target preserved.
pub async fn submit_login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    if state.session.attempt_login(&form.username, &form.password) {
        let target = safe_redirect_target(form.redirect.as_deref());
        return Redirect::to(target).into_response();
    }

    let ctx = PageContext {
        authenticated: false,
        redirect: form.redirect.as_deref(),
        error: Some("Invalid username or password."),
    };
    (StatusCode::UNAUTHORIZED, Html(render(Page::Login, &ctx))).into_response()
}

pub async fn submit_logout(State(state): State<AppState>) -> Redirect {
    state.session.logout();
    Redirect::to("/")
}
