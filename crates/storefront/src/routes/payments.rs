//! Webpay checkout handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, instrument};

use gongora_core::OrderId;

use crate::error::{Result, add_breadcrumb, set_sentry_user};
use crate::middleware::{RequireAuth, clear_cart, load_cart, load_shipping};
use crate::models::Order;
use crate::payments::{CheckoutDraft, InitiateOutcome, PaymentOutcome};
use crate::state::AppState;

/// Webpay returns here with `token_ws`.
pub const CONFIRM_PATH: &str = "/webpay/confirmacion/";

/// Pay step form.
#[derive(Debug, Deserialize)]
pub struct InitForm {
    pub shipping_cost: Option<String>,
}

/// Return query from Webpay.
#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token_ws: Option<String>,
}

/// Order summary for the result page.
#[derive(Debug, Clone)]
pub struct OrderSummaryView {
    pub id: OrderId,
    pub total: String,
    pub status: String,
}

impl From<&Order> for OrderSummaryView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            total: order.total_price().display(),
            status: order.status.to_string(),
        }
    }
}

/// Payment result page.
#[derive(Template, WebTemplate)]
#[template(path = "payments/result.html")]
pub struct PaymentResultTemplate {
    pub success: bool,
    pub message: String,
    pub order: Option<OrderSummaryView>,
    /// Pretty-printed processor payload; empty when there is nothing to show.
    pub detail: String,
}

impl From<&PaymentOutcome> for PaymentResultTemplate {
    fn from(outcome: &PaymentOutcome) -> Self {
        let detail = match &outcome.detail {
            serde_json::Value::Null => String::new(),
            serde_json::Value::Object(map) if map.is_empty() => String::new(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        };

        Self {
            success: outcome.is_success(),
            message: outcome.message.clone(),
            order: outcome.order.as_ref().map(OrderSummaryView::from),
            detail,
        }
    }
}

/// Create a pending order for the session cart and send the buyer to
/// Webpay.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn init(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<InitForm>,
) -> Result<Response> {
    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("checkout", "Webpay init", None);

    let draft = CheckoutDraft {
        user,
        cart: load_cart(&session).await,
        shipping: load_shipping(&session).await,
        shipping_cost: form.shipping_cost,
        return_url: state.config().absolute_url(CONFIRM_PATH),
    };

    match state.payments().initiate(draft).await? {
        InitiateOutcome::Redirect(url) => Ok(Redirect::to(&url).into_response()),
        InitiateOutcome::Failed(outcome) => {
            Ok(PaymentResultTemplate::from(&outcome).into_response())
        }
    }
}

/// Settle the order after the buyer returns from Webpay.
#[instrument(skip(state, session, query))]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ConfirmQuery>,
) -> Result<Response> {
    let token = query.token_ws.as_deref().filter(|t| !t.is_empty());
    let outcome = state.payments().confirm(token).await?;

    Ok(render_confirmation(&session, &outcome).await)
}

/// Empty the paid-for cart and render the result.
///
/// The order is already settled here, so a session failure is logged and
/// the buyer still sees the result.
async fn render_confirmation(session: &Session, outcome: &PaymentOutcome) -> Response {
    if outcome.clear_cart
        && let Err(e) = clear_cart(session).await
    {
        let order_id = outcome.order.as_ref().map(|order| order.id);
        error!(order_id = ?order_id, error = %e, "Failed to clear cart after payment");
    }

    PaymentResultTemplate::from(outcome).into_response()
}
