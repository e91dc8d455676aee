/// Router Module Index
///
/// Organizes routing into access-segregated modules. Access control is applied
/// at the module level (via Axum layers in `create_router`), so a handler can
/// not be exposed without the layer its module demands.

/// JSON API routes open to every client, including the session endpoints.
pub mod public;

/// JSON API routes gated by the session middleware.
/// Requires an authenticated session.
pub mod authenticated;

/// Page routes built from the route table, behind the navigation guard.
pub mod pages;
