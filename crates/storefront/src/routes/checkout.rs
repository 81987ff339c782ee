//! Checkout step handlers.
//!
//! The shipping step stores the address form in the session; the pay step
//! shows what is about to be charged before the buyer posts to
//! `/webpay/init/`.

use axum::{
    Form, Json,
    response::{IntoResponse, Redirect},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::{load_cart, load_shipping, save_shipping as store_shipping};
use crate::models::ShippingDetails;
use crate::payments::CheckoutError;
use crate::routes::cart::CartView;

/// Pay step summary.
#[derive(Debug, Serialize)]
pub struct PaySummary {
    pub cart: CartView,
    pub shipping: ShippingDetails,
    /// Goods only; shipping cost is added when the payment starts.
    pub subtotal: String,
}

/// Store the shipping form and continue to the pay step.
///
/// An empty cart goes back to `/cart` without storing anything.
#[instrument(skip(session, form))]
pub async fn save_shipping(
    session: Session,
    Form(form): Form<ShippingDetails>,
) -> Result<impl IntoResponse> {
    if load_cart(&session).await.is_empty() {
        return Err(CheckoutError::EmptyCart.into());
    }
    store_shipping(&session, &form).await?;
    Ok(Redirect::to("/checkout/pay"))
}

/// Pay step. Sends the buyer back to whichever step is incomplete.
#[instrument(skip(session))]
pub async fn pay(session: Session) -> Result<Json<PaySummary>> {
    let cart = load_cart(&session).await;
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart.into());
    }

    let shipping = load_shipping(&session)
        .await
        .ok_or(CheckoutError::MissingShipping)?;

    Ok(Json(PaySummary {
        subtotal: cart.subtotal_price().display(),
        cart: CartView::from(&cart),
        shipping,
    }))
}
