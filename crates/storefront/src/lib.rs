//! Joyería Góngora storefront library.
//!
//! Cart, checkout against Webpay, order history and the region/comuna
//! lookups behind the address form. The binary in `main.rs` wires this up
//! with `PostgreSQL`, Sentry and the real outbound clients; tests build the
//! same router over in-memory collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::state::AppState;

/// Build the storefront application over any session store.
///
/// Sentry layers are added by the binary, outside this router.
pub fn app<Store>(state: AppState, session_store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    with_middleware(routes::routes(), state, session_store)
}

/// Wrap `routes` in the session, request ID and tracing layers.
pub fn with_middleware<Store>(
    routes: Router<AppState>,
    state: AppState,
    session_store: Store,
) -> Router
where
    Store: SessionStore + Clone,
{
    let session_layer = middleware::configure_session_layer(session_store, state.config());

    routes
        .layer(session_layer)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<axum::body::Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            },
        ))
        .with_state(state)
}
