//! Order history for the signed-in user.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use gongora_core::OrderId;

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderItem};
use crate::state::AppState;

/// Order with its lines.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// The user's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = state.payments().orders().list_for_user(user.id).await?;
    Ok(Json(orders))
}

/// One order. Orders of other users are reported as missing.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let store = state.payments().orders();

    let order = store
        .get(id)
        .await?
        .filter(|order| order.user_id == user.id)
        .ok_or_else(|| AppError::NotFound(format!("pedido {id}")))?;

    let items = store.items(order.id).await?;
    Ok(Json(OrderDetail { order, items }))
}
