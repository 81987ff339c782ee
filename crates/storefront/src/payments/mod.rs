//! Checkout payment flow against Webpay.
//!
//! [`PaymentService::initiate`] turns the session cart into a `pending`
//! order and opens a Webpay transaction. [`PaymentService::confirm`] runs
//! when the buyer comes back with `token_ws` and settles the order as
//! `paid` or `cancelled`.
//!
//! Settling is compare-and-swap: an order leaves `pending` exactly once, and
//! only the request that moved it sends a notification. A confirmation for
//! an order that is already settled returns the stored state without
//! contacting Webpay again.

pub mod webpay;

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use gongora_core::{OrderStatus, Price};

use crate::db::{OrderStore, RepositoryError, Transition};
use crate::models::{CurrentUser, NewOrder, Order, SessionCart, ShippingDetails};
use crate::services::Notifications;

pub use webpay::{
    CommitResult, CreateTransaction, CreatedTransaction, PaymentGateway, WebpayClient, WebpayError,
    response_message,
};

/// Shown when Webpay could not create the transaction.
pub const INIT_FAILED: &str = "No se pudo iniciar el pago con Webpay.";

/// Shown when the commit call itself failed.
pub const COMMIT_FAILED: &str = "Error al confirmar el pago con Webpay";

/// Shown when the buyer comes back without a token.
pub const CANCELLED_BY_USER: &str = "Pago cancelado por el usuario en Webpay.";

/// Shown for an authorized payment.
pub const APPROVED: &str = "Transacción aprobada";

/// Errors surfaced by the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to pay for.
    #[error("cart is empty")]
    EmptyCart,

    /// The shipping step has not been completed.
    #[error("shipping details missing")]
    MissingShipping,

    /// Cart total does not fit a Webpay amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Webpay confirmed a token we have no order for.
    #[error("no order for token {token}")]
    OrderNotFound { token: String },

    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Whether the payment went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Success,
    Failed,
}

/// What the buyer is told after initiate or confirm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub state: PaymentState,
    pub order: Option<Order>,
    pub message: String,
    /// Processor payload or `{"error": ...}`.
    pub detail: serde_json::Value,
    /// The session cart was paid for and should be emptied.
    #[serde(skip)]
    pub clear_cart: bool,
}

impl PaymentOutcome {
    fn failed(order: Option<Order>, message: &str, detail: serde_json::Value) -> Self {
        Self {
            state: PaymentState::Failed,
            order,
            message: message.to_string(),
            detail,
            clear_cart: false,
        }
    }

    /// Outcome for an order that was already settled by an earlier request.
    fn settled(order: Order) -> Self {
        let (state, message) = match order.status {
            OrderStatus::Paid => (PaymentState::Success, APPROVED),
            OrderStatus::Pending | OrderStatus::Cancelled => {
                (PaymentState::Failed, webpay::DEFAULT_REJECTION)
            }
        };

        Self {
            state,
            order: Some(order),
            message: message.to_string(),
            detail: serde_json::json!({}),
            clear_cart: false,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == PaymentState::Success
    }
}

/// Result of [`PaymentService::initiate`].
#[derive(Debug, Clone, PartialEq)]
pub enum InitiateOutcome {
    /// Send the buyer to this Webpay URL.
    Redirect(String),
    /// The transaction could not be opened; the order was cancelled.
    Failed(PaymentOutcome),
}

/// Everything initiate needs from the request and session.
#[derive(Debug, Clone)]
pub struct CheckoutDraft {
    pub user: CurrentUser,
    pub cart: SessionCart,
    pub shipping: Option<ShippingDetails>,
    /// Raw `shipping_cost` form field.
    pub shipping_cost: Option<String>,
    /// Absolute URL of the confirmation endpoint.
    pub return_url: String,
}

/// Parse the `shipping_cost` form field; anything but a non-negative
/// integer counts as zero.
#[must_use]
pub fn parse_shipping_cost(raw: Option<&str>) -> i64 {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|cost| *cost >= 0)
        .unwrap_or(0)
}

/// Random `orden-{id}-{suffix}` reference for Webpay.
fn buy_order_reference(order: &Order) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("orden-{}-{suffix}", order.id)
}

/// Runs the checkout payment flow.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: Notifications,
}

impl PaymentService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: Notifications,
    ) -> Self {
        Self {
            orders,
            gateway,
            notifications,
        }
    }

    /// Order storage, for read-only views.
    #[must_use]
    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    /// Create a pending order for the cart and open a Webpay transaction.
    ///
    /// The cart is left untouched; it is only emptied by a successful
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCart` or `MissingShipping` before anything is stored.
    /// Webpay failures, and failing to store Webpay's token, are not errors:
    /// the order is cancelled and [`InitiateOutcome::Failed`] is returned.
    #[instrument(skip(self, draft), fields(user_id = %draft.user.id))]
    pub async fn initiate(&self, draft: CheckoutDraft) -> Result<InitiateOutcome, CheckoutError> {
        if draft.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let shipping = draft.shipping.ok_or(CheckoutError::MissingShipping)?;

        let shipping_cost = parse_shipping_cost(draft.shipping_cost.as_deref());
        let total = (draft.cart.subtotal() + Decimal::from(shipping_cost)).trunc();
        let amount = Price::clp(total)
            .whole_units()
            .ok_or(CheckoutError::InvalidAmount(total))?;

        let order = self
            .orders
            .create_pending(NewOrder {
                user_id: draft.user.id,
                customer_email: Some(draft.user.email.clone()),
                total,
                shipping_data: Some(shipping.to_order_data(shipping_cost)),
                items: draft.cart.to_order_items(),
            })
            .await?;

        let buy_order = buy_order_reference(&order);
        let request = CreateTransaction {
            buy_order: buy_order.clone(),
            session_id: draft.user.id.to_string(),
            amount,
            return_url: draft.return_url,
        };

        match self.gateway.create_transaction(&request).await {
            Ok(created) => {
                if let Err(e) = self
                    .orders
                    .attach_payment(order.id, &created.token, &buy_order)
                    .await
                {
                    // Without a stored token no confirmation can find this order.
                    error!(order_id = %order.id, error = %e, "Webpay token could not be stored");
                    let detail = serde_json::json!({ "error": e.to_string() });
                    let outcome = self
                        .settle(order, OrderStatus::Cancelled, INIT_FAILED, detail)
                        .await?;
                    return Ok(InitiateOutcome::Failed(outcome));
                }
                info!(order_id = %order.id, buy_order = %buy_order, amount, "Webpay transaction created");
                Ok(InitiateOutcome::Redirect(created.redirect_url()))
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Webpay transaction could not be created");
                let detail = serde_json::json!({ "error": e.to_string() });
                let outcome = self
                    .settle(order, OrderStatus::Cancelled, INIT_FAILED, detail)
                    .await?;
                Ok(InitiateOutcome::Failed(outcome))
            }
        }
    }

    /// Settle the order for `token` with Webpay's verdict.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` when Webpay answered for a token that matches
    /// no order. Nothing is modified in that case.
    #[instrument(skip(self, token))]
    pub async fn confirm(&self, token: Option<&str>) -> Result<PaymentOutcome, CheckoutError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            info!("Buyer returned from Webpay without a token");
            return Ok(PaymentOutcome::failed(
                None,
                CANCELLED_BY_USER,
                serde_json::json!({}),
            ));
        };

        if let Some(order) = self.orders.find_by_token(token).await?
            && order.status.is_terminal()
        {
            info!(order_id = %order.id, status = %order.status, "Order already settled");
            return Ok(PaymentOutcome::settled(order));
        }

        match self.gateway.commit_transaction(token).await {
            Err(e) => {
                error!(error = %e, "Webpay commit failed");
                let order = self.order_for_token(token).await?;
                let detail = serde_json::json!({ "error": e.to_string() });
                self.settle(order, OrderStatus::Cancelled, COMMIT_FAILED, detail)
                    .await
            }
            Ok(result) => {
                let order = self.order_for_token(token).await?;
                if result.is_authorized() {
                    self.settle(order, OrderStatus::Paid, APPROVED, result.raw)
                        .await
                } else {
                    let message = response_message(result.response_code);
                    info!(
                        order_id = %order.id,
                        status = ?result.status,
                        response_code = ?result.response_code,
                        "Payment not authorized"
                    );
                    self.settle(order, OrderStatus::Cancelled, message, result.raw)
                        .await
                }
            }
        }
    }

    async fn order_for_token(&self, token: &str) -> Result<Order, CheckoutError> {
        self.orders
            .find_by_token(token)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound {
                token: token.to_string(),
            })
    }

    /// Move `order` out of `pending` and notify, unless another request
    /// already did.
    async fn settle(
        &self,
        order: Order,
        to: OrderStatus,
        message: &str,
        detail: serde_json::Value,
    ) -> Result<PaymentOutcome, CheckoutError> {
        match self.orders.transition(order.id, to).await? {
            Transition::Applied(order) => {
                info!(order_id = %order.id, status = %order.status, "Order settled");
                if to == OrderStatus::Paid {
                    self.notifications.paid(&order).await;
                    Ok(PaymentOutcome {
                        state: PaymentState::Success,
                        order: Some(order),
                        message: message.to_string(),
                        detail,
                        clear_cart: true,
                    })
                } else {
                    self.notifications.failed(&order, message, &detail).await;
                    Ok(PaymentOutcome::failed(Some(order), message, detail))
                }
            }
            Transition::AlreadySettled(order) => {
                warn!(
                    order_id = %order.id,
                    status = %order.status,
                    requested = %to,
                    "Order settled by a concurrent request"
                );
                Ok(PaymentOutcome::settled(order))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use gongora_core::{Email, OrderId, ProductId, UserId};

    use super::*;
    use crate::db::InMemoryOrderStore;
    use crate::db::products::Product;
    use crate::models::OrderItem;
    use crate::services::{NotificationError, Notifier};

    /// Gateway with scripted answers that records every call.
    #[derive(Default)]
    struct FakeGateway {
        fail_create: bool,
        commit: Mutex<Option<Result<serde_json::Value, u16>>>,
        creates: AtomicUsize,
        commits: AtomicUsize,
        last_request: Mutex<Option<CreateTransaction>>,
    }

    impl FakeGateway {
        fn committing(payload: serde_json::Value) -> Self {
            Self {
                commit: Mutex::new(Some(Ok(payload))),
                ..Self::default()
            }
        }

        fn commit_error(status: u16) -> Self {
            Self {
                commit: Mutex::new(Some(Err(status))),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_transaction(
            &self,
            request: &CreateTransaction,
        ) -> Result<CreatedTransaction, WebpayError> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            *self.last_request.lock().unwrap() = Some(request.clone());
            if self.fail_create {
                return Err(WebpayError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(CreatedTransaction {
                token: format!("tok-{n}"),
                url: "https://webpay.test/init".to_string(),
            })
        }

        async fn commit_transaction(&self, _token: &str) -> Result<CommitResult, WebpayError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            match self.commit.lock().unwrap().clone() {
                Some(Ok(payload)) => Ok(CommitResult::from_raw(payload)),
                Some(Err(status)) => Err(WebpayError::Api {
                    status,
                    message: "commit failed".to_string(),
                }),
                None => Err(WebpayError::Parse("no script".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        paid: AtomicUsize,
        failed: Mutex<Vec<String>>,
        broken: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_paid(&self, _order: &Order) -> Result<(), NotificationError> {
            self.paid.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(NotificationError::InvalidAddress("x".to_string()));
            }
            Ok(())
        }

        async fn send_failed(
            &self,
            _order: &Order,
            message: &str,
            _detail: &serde_json::Value,
        ) -> Result<(), NotificationError> {
            self.failed.lock().unwrap().push(message.to_string());
            if self.broken {
                return Err(NotificationError::InvalidAddress("x".to_string()));
            }
            Ok(())
        }
    }

    struct Harness {
        store: InMemoryOrderStore,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
        service: PaymentService,
    }

    fn harness_with(gateway: FakeGateway, notifier: RecordingNotifier) -> Harness {
        let store = InMemoryOrderStore::new();
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(notifier);
        let service = PaymentService::new(
            Arc::new(store.clone()),
            gateway.clone(),
            Notifications::new(notifier.clone()),
        );
        Harness {
            store,
            gateway,
            notifier,
            service,
        }
    }

    fn harness(gateway: FakeGateway) -> Harness {
        harness_with(gateway, RecordingNotifier::default())
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("ana@gongora.cl").unwrap(),
        }
    }

    fn cart() -> SessionCart {
        let mut cart = SessionCart::default();
        cart.add(
            &Product {
                id: ProductId::new(1),
                name: "Anillo de plata".to_string(),
                price: Decimal::new(19_990, 0),
            },
            2,
        );
        cart
    }

    fn draft(cart: SessionCart, shipping_cost: Option<&str>) -> CheckoutDraft {
        CheckoutDraft {
            user: user(),
            cart,
            shipping: Some(ShippingDetails {
                first_name: "Ana".to_string(),
                email: "envio@gongora.cl".to_string(),
                ..ShippingDetails::default()
            }),
            shipping_cost: shipping_cost.map(str::to_string),
            return_url: "http://localhost:3000/webpay/confirmacion/".to_string(),
        }
    }

    /// Initiate a checkout and return the token Webpay issued.
    async fn pending_order(h: &Harness) -> (Order, String) {
        let outcome = h.service.initiate(draft(cart(), Some("3500"))).await.unwrap();
        assert!(matches!(outcome, InitiateOutcome::Redirect(_)));
        let order = h.store.all().await.pop().unwrap();
        let token = order.token.clone().unwrap();
        (order, token)
    }

    #[test]
    fn test_parse_shipping_cost() {
        assert_eq!(parse_shipping_cost(Some("3500")), 3500);
        assert_eq!(parse_shipping_cost(Some(" 0 ")), 0);
        assert_eq!(parse_shipping_cost(Some("")), 0);
        assert_eq!(parse_shipping_cost(Some("abc")), 0);
        assert_eq!(parse_shipping_cost(Some("12.5")), 0);
        assert_eq!(parse_shipping_cost(Some("-100")), 0);
        assert_eq!(parse_shipping_cost(None), 0);
    }

    #[tokio::test]
    async fn test_initiate_empty_cart_creates_nothing() {
        let h = harness(FakeGateway::default());

        let err = h
            .service
            .initiate(draft(SessionCart::default(), None))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::EmptyCart));
        assert!(h.store.is_empty().await);
        assert_eq!(h.gateway.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initiate_requires_shipping() {
        let h = harness(FakeGateway::default());
        let mut draft = draft(cart(), None);
        draft.shipping = None;

        let err = h.service.initiate(draft).await.unwrap_err();
        assert!(matches!(err, CheckoutError::MissingShipping));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_initiate_success_redirects_with_token() {
        let h = harness(FakeGateway::default());

        let outcome = h.service.initiate(draft(cart(), Some("3500"))).await.unwrap();
        assert_eq!(
            outcome,
            InitiateOutcome::Redirect("https://webpay.test/init?token_ws=tok-1".to_string())
        );

        let order = h.store.all().await.pop().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Decimal::new(43_480, 0));
        assert_eq!(order.token.as_deref(), Some("tok-1"));
        assert_eq!(order.shipping_data.as_ref().unwrap()["shipping_cost"], 3500);

        let buy_order = order.buy_order.unwrap();
        let prefix = format!("orden-{}-", order.id);
        assert!(buy_order.starts_with(&prefix));
        let suffix = &buy_order[prefix.len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));

        let request = h.gateway.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.amount, 43_480);
        assert_eq!(request.session_id, "7");
        assert_eq!(request.buy_order, buy_order);
        assert_eq!(h.store.items(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_initiate_invalid_shipping_cost_counts_as_zero() {
        let h = harness(FakeGateway::default());
        h.service.initiate(draft(cart(), Some("gratis"))).await.unwrap();

        let order = h.store.all().await.pop().unwrap();
        assert_eq!(order.total, Decimal::new(39_980, 0));
        assert_eq!(order.shipping_data.unwrap()["shipping_cost"], 0);
    }

    #[tokio::test]
    async fn test_initiate_gateway_failure_cancels_and_notifies() {
        let h = harness(FakeGateway {
            fail_create: true,
            ..FakeGateway::default()
        });

        let outcome = h.service.initiate(draft(cart(), None)).await.unwrap();
        let InitiateOutcome::Failed(outcome) = outcome else {
            panic!("expected failure outcome");
        };

        assert_eq!(outcome.message, INIT_FAILED);
        assert!(outcome.detail["error"].as_str().unwrap().contains("boom"));
        assert_eq!(outcome.order.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(*h.notifier.failed.lock().unwrap(), vec![INIT_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_confirm_authorized_marks_paid() {
        let h = harness(FakeGateway::committing(
            serde_json::json!({"status": "AUTHORIZED", "response_code": 0}),
        ));
        let (order, token) = pending_order(&h).await;

        let outcome = h.service.confirm(Some(&token)).await.unwrap();

        assert!(outcome.is_success());
        assert!(outcome.clear_cart);
        assert_eq!(outcome.message, APPROVED);
        assert_eq!(outcome.detail["status"], "AUTHORIZED");
        assert_eq!(
            h.store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Paid
        );
        assert_eq!(h.notifier.paid.load(Ordering::SeqCst), 1);
        assert!(h.notifier.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_rejected_maps_response_code() {
        let h = harness(FakeGateway::committing(
            serde_json::json!({"status": "FAILED", "response_code": -1}),
        ));
        let (order, token) = pending_order(&h).await;

        let outcome = h.service.confirm(Some(&token)).await.unwrap();

        assert_eq!(outcome.state, PaymentState::Failed);
        assert!(!outcome.clear_cart);
        assert_eq!(outcome.message, "Rechazo de la transacción");
        assert_eq!(
            h.store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(
            *h.notifier.failed.lock().unwrap(),
            vec!["Rechazo de la transacción".to_string()]
        );
    }

    #[tokio::test]
    async fn test_confirm_unknown_code_uses_default_message() {
        let h = harness(FakeGateway::committing(serde_json::json!({"status": "REVERSED"})));
        let (_, token) = pending_order(&h).await;

        let outcome = h.service.confirm(Some(&token)).await.unwrap();
        assert_eq!(outcome.message, webpay::DEFAULT_REJECTION);
    }

    #[tokio::test]
    async fn test_confirm_without_token() {
        let h = harness(FakeGateway::default());

        for token in [None, Some(""), Some("  ")] {
            let outcome = h.service.confirm(token).await.unwrap();
            assert_eq!(outcome.state, PaymentState::Failed);
            assert!(outcome.order.is_none());
            assert_eq!(outcome.message, CANCELLED_BY_USER);
        }
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_confirm_unknown_token() {
        let h = harness(FakeGateway::committing(
            serde_json::json!({"status": "AUTHORIZED", "response_code": 0}),
        ));
        let (order, _) = pending_order(&h).await;

        let err = h.service.confirm(Some("desconocido")).await.unwrap_err();

        assert!(matches!(err, CheckoutError::OrderNotFound { .. }));
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
        assert_eq!(h.notifier.paid.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_confirm_commit_failure_cancels() {
        let h = harness(FakeGateway::commit_error(500));
        let (order, token) = pending_order(&h).await;

        let outcome = h.service.confirm(Some(&token)).await.unwrap();

        assert_eq!(outcome.message, COMMIT_FAILED);
        assert!(outcome.detail["error"].is_string());
        assert_eq!(
            h.store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(*h.notifier.failed.lock().unwrap(), vec![COMMIT_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_confirm_commit_failure_unknown_token() {
        let h = harness(FakeGateway::commit_error(500));

        let err = h.service.confirm(Some("nada")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_second_confirm_is_idempotent() {
        let h = harness(FakeGateway::committing(
            serde_json::json!({"status": "AUTHORIZED", "response_code": 0}),
        ));
        let (_, token) = pending_order(&h).await;

        h.service.confirm(Some(&token)).await.unwrap();
        let replay = h.service.confirm(Some(&token)).await.unwrap();

        assert!(replay.is_success());
        assert!(!replay.clear_cart);
        assert_eq!(replay.order.unwrap().status, OrderStatus::Paid);
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.paid.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_order_is_never_paid_later() {
        let h = harness(FakeGateway::committing(
            serde_json::json!({"status": "AUTHORIZED", "response_code": 0}),
        ));
        let (order, token) = pending_order(&h).await;
        h.store
            .transition(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let outcome = h.service.confirm(Some(&token)).await.unwrap();

        assert_eq!(outcome.state, PaymentState::Failed);
        assert_eq!(outcome.order.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 0);
    }

    /// Gateway whose commits wait for each other, so two confirmations are
    /// both past the settled-order check before either settles.
    struct RacingGateway {
        barrier: tokio::sync::Barrier,
        commits: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for RacingGateway {
        async fn create_transaction(
            &self,
            _request: &CreateTransaction,
        ) -> Result<CreatedTransaction, WebpayError> {
            Ok(CreatedTransaction {
                token: "tok-race".to_string(),
                url: "https://webpay.test/init".to_string(),
            })
        }

        async fn commit_transaction(&self, _token: &str) -> Result<CommitResult, WebpayError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.barrier.wait().await;
            Ok(CommitResult::from_raw(
                serde_json::json!({"status": "AUTHORIZED", "response_code": 0}),
            ))
        }
    }

    #[tokio::test]
    async fn test_concurrent_confirms_notify_once() {
        let store = InMemoryOrderStore::new();
        let gateway = Arc::new(RacingGateway {
            barrier: tokio::sync::Barrier::new(2),
            commits: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let service = PaymentService::new(
            Arc::new(store.clone()),
            gateway.clone(),
            Notifications::new(notifier.clone()),
        );
        service.initiate(draft(cart(), None)).await.unwrap();

        let (a, b) = tokio::join!(
            service.confirm(Some("tok-race")),
            service.confirm(Some("tok-race"))
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(gateway.commits.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.paid.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| o.clear_cart).count(), 1);

        let loser = outcomes.iter().find(|o| !o.clear_cart).unwrap();
        assert!(loser.is_success());
        assert_eq!(loser.message, APPROVED);
        assert_eq!(loser.order.as_ref().unwrap().status, OrderStatus::Paid);

        let order = store.all().await.pop().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    /// Store that accepts orders but cannot record Webpay's token.
    struct TokenlessStore(InMemoryOrderStore);

    #[async_trait]
    impl OrderStore for TokenlessStore {
        async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError> {
            self.0.create_pending(order).await
        }

        async fn attach_payment(
            &self,
            _id: OrderId,
            token: &str,
            _buy_order: &str,
        ) -> Result<Order, RepositoryError> {
            Err(RepositoryError::Conflict(format!("token {token} already used")))
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<Order>, RepositoryError> {
            self.0.find_by_token(token).await
        }

        async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
            self.0.get(id).await
        }

        async fn transition(
            &self,
            id: OrderId,
            to: OrderStatus,
        ) -> Result<Transition, RepositoryError> {
            self.0.transition(id, to).await
        }

        async fn items(
            &self,
            id: OrderId,
        ) -> Result<Vec<OrderItem>, RepositoryError> {
            self.0.items(id).await
        }

        async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
            self.0.list_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_initiate_token_storage_failure_cancels_and_notifies() {
        let store = InMemoryOrderStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = PaymentService::new(
            Arc::new(TokenlessStore(store.clone())),
            Arc::new(FakeGateway::default()),
            Notifications::new(notifier.clone()),
        );

        let outcome = service.initiate(draft(cart(), None)).await.unwrap();
        let InitiateOutcome::Failed(outcome) = outcome else {
            panic!("expected failure outcome");
        };

        assert_eq!(outcome.message, INIT_FAILED);
        assert!(outcome.detail["error"].as_str().unwrap().contains("tok-1"));
        assert!(!outcome.clear_cart);

        let order = store.all().await.pop().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.token.is_none());
        assert_eq!(*notifier.failed.lock().unwrap(), vec![INIT_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_change_outcome() {
        let h = harness_with(
            FakeGateway::committing(serde_json::json!({"status": "AUTHORIZED", "response_code": 0})),
            RecordingNotifier {
                broken: true,
                ..RecordingNotifier::default()
            },
        );
        let (order, token) = pending_order(&h).await;

        let outcome = h.service.confirm(Some(&token)).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(h.notifier.paid.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Paid
        );
    }
}
