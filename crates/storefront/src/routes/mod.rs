//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                               - Liveness check
//! GET  /health/ready                         - Readiness check (database)
//!
//! # Geo lookups (address form)
//! GET  /api/regiones/                        - All regions
//! GET  /api/regiones/{region_code}/comunas/  - Comunas of a region
//!
//! # Cart
//! GET  /cart                                 - Cart contents (JSON)
//! POST /cart/add                             - Add a product
//! POST /cart/update                          - Change a line's quantity
//! POST /cart/remove                          - Remove a line
//!
//! # Checkout
//! POST /checkout/shipping                    - Store shipping details
//! GET  /checkout/pay                         - Payment summary
//!
//! # Webpay
//! POST /webpay/init/                         - Create order, go to Webpay (auth)
//! GET  /webpay/confirmacion/?token_ws=       - Return from Webpay
//!
//! # Orders (requires auth)
//! GET  /orders                               - Order history
//! GET  /orders/{id}                          - Order detail
//! ```

pub mod cart;
pub mod checkout;
pub mod geo;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the geo API routes router.
pub fn geo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(geo::regions))
        .route("/{region_code}/comunas/", get(geo::comunas))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/shipping", post(checkout::save_shipping))
        .route("/pay", get(checkout::pay))
}

/// Create the Webpay routes router.
pub fn webpay_routes() -> Router<AppState> {
    Router::new()
        .route("/init/", post(payments::init))
        .route("/confirmacion/", get(payments::confirm))
}

/// Create the order history routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
}

/// Build the complete storefront router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/regiones", geo_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/webpay", webpay_routes())
        .nest("/orders", order_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
