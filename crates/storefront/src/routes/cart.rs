//! Cart route handlers.
//!
//! The cart lives in the session. Mutating endpoints take a form post and
//! redirect back to `/cart`.

use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use gongora_core::{Price, ProductId};

use crate::db::ProductRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{load_cart, save_cart};
use crate::models::{CartLine, MAX_LINE_QUANTITY, SessionCart};
use crate::state::AppState;

/// One cart line for display.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
}

impl From<&CartLine> for CartItemView {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            price: Price::clp(line.unit_price).display(),
            line_price: Price::clp(line.subtotal()).display(),
        }
    }
}

impl From<&SessionCart> for CartView {
    fn from(cart: &SessionCart) -> Self {
        Self {
            items: cart.lines().iter().map(CartItemView::from).collect(),
            subtotal: cart.subtotal_price().display(),
            item_count: cart.item_count(),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: ProductId,
}

/// Reject quantities above the per-line maximum.
fn checked_quantity(quantity: u32) -> Result<u32> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "cantidad máxima por producto: {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(quantity)
}

/// Display the cart.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Json<CartView> {
    let cart = load_cart(&session).await;
    Json(CartView::from(&cart))
}

/// Add a product to the cart.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<impl IntoResponse> {
    let quantity = checked_quantity(form.quantity.unwrap_or(1))?;
    let product = ProductRepository::new(state.pool())
        .get(form.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("producto {}", form.product_id)))?;

    let mut cart = load_cart(&session).await;
    cart.add(&product, quantity);
    save_cart(&session, &cart).await?;

    add_breadcrumb(
        "cart",
        "Added product",
        Some(&[("product_id", &product.id.to_string())]),
    );

    Ok(Redirect::to("/cart"))
}

/// Change a line's quantity; zero removes it.
#[instrument(skip(session))]
pub async fn update(
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<impl IntoResponse> {
    let quantity = checked_quantity(form.quantity)?;
    let mut cart = load_cart(&session).await;
    if cart.set_quantity(form.product_id, quantity) {
        save_cart(&session, &cart).await?;
    }

    Ok(Redirect::to("/cart"))
}

/// Remove a line from the cart.
#[instrument(skip(session))]
pub async fn remove(
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<impl IntoResponse> {
    let mut cart = load_cart(&session).await;
    if cart.remove(form.product_id) {
        save_cart(&session, &cart).await?;
    }

    Ok(Redirect::to("/cart"))
}
