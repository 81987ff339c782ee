//! Session middleware configuration and typed session access.
//!
//! Sessions are stored in `PostgreSQL` (`tower_sessions.session`) and hold
//! the signed-in user, the cart and the shipping form between checkout
//! steps.

use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};

use crate::config::StorefrontConfig;
use crate::models::{SessionCart, ShippingDetails, session_keys};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "gongora_session";

/// Session expiry time in seconds (14 days).
const SESSION_EXPIRY_SECONDS: i64 = 14 * 24 * 60 * 60;

/// Apply the storefront cookie settings to a session store.
///
/// Production uses `tower_sessions_sqlx_store::PostgresStore`; the
/// `tower_sessions.session` table is created by the storefront migrations.
#[must_use]
pub fn configure_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// Load the cart; a missing or unreadable cart is an empty one.
pub async fn load_cart(session: &Session) -> SessionCart {
    session
        .get::<SessionCart>(session_keys::CART)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Store the cart.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn save_cart(
    session: &Session,
    cart: &SessionCart,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CART, cart).await
}

/// Empty the cart after a successful payment.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_cart(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<SessionCart>(session_keys::CART).await?;
    Ok(())
}

/// Shipping form saved by the shipping step, if any.
pub async fn load_shipping(session: &Session) -> Option<ShippingDetails> {
    session
        .get::<ShippingDetails>(session_keys::CHECKOUT_SHIPPING)
        .await
        .ok()
        .flatten()
}

/// Store the shipping form.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn save_shipping(
    session: &Session,
    shipping: &ShippingDetails,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CHECKOUT_SHIPPING, shipping)
        .await
}
