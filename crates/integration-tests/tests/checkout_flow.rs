//! Cart, checkout and Webpay round trips through the router.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use gongora_core::OrderStatus;
use gongora_integration_tests::{BASE_URL, Sent, TestApp, WEBPAY_FORM_URL};

/// Signed in, two rings in the cart, shipping done.
async fn ready_to_pay() -> TestApp {
    let mut app = TestApp::new();
    app.login(7, "ana@example.cl").await;
    app.add_to_cart(3, "Anillo Luna", 12_990, 2).await;
    app.submit_shipping().await;
    app
}

/// Start the payment and return the Webpay token.
async fn start_payment(app: &mut TestApp) -> String {
    let response = app.post("/webpay/init/", "shipping_cost=3990").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let orders = app.orders.all().await;
    let token = orders[0].token.clone().unwrap();
    assert_eq!(
        response.location(),
        Some(format!("{WEBPAY_FORM_URL}?token_ws={token}").as_str())
    );
    token
}

#[tokio::test]
async fn test_cart_starts_empty() {
    let mut app = TestApp::new();

    let response = app.get("/cart").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["item_count"], 0);
    assert_eq!(response.json()["items"], json!([]));
}

#[tokio::test]
async fn test_cart_update_and_remove() {
    let mut app = TestApp::new();
    app.add_to_cart(3, "Anillo Luna", 12_990, 1).await;
    app.add_to_cart(4, "Aros Sol", 8_500, 1).await;

    let response = app.post("/cart/update", "product_id=3&quantity=3").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/cart"));

    app.post("/cart/remove", "product_id=4").await;

    let cart = app.get("/cart").await.json();
    assert_eq!(cart["item_count"], 3);
    assert_eq!(cart["subtotal"], "$38.970");
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cart_rejects_quantity_above_line_maximum() {
    let mut app = TestApp::new();
    app.add_to_cart(3, "Anillo Luna", 12_990, 1).await;
    app.add_to_cart(4, "Aros Sol", 8_500, 1).await;

    for product_id in [3, 4] {
        let response = app
            .post(
                "/cart/update",
                &format!("product_id={product_id}&quantity=4294967295"),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    let cart = app.get("/cart").await.json();
    assert_eq!(cart["item_count"], 2);
    assert_eq!(cart["subtotal"], "$21.490");
}

#[tokio::test]
async fn test_shipping_step_with_empty_cart_goes_back_to_cart() {
    let mut app = TestApp::new();

    let response = app
        .post(
            "/checkout/shipping",
            "first_name=Ana&last_name=Rojas&email=ana%40example.cl&phone=%2B56911112222\
             &address=Av.+Providencia+123&comuna=Providencia&region=13&shipping_method=delivery",
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/cart"));

    app.add_to_cart(3, "Anillo Luna", 12_990, 1).await;
    let response = app.get("/checkout/pay").await;
    assert_eq!(response.location(), Some("/checkout/shipping"));
}

#[tokio::test]
async fn test_pay_step_redirects_to_missing_step() {
    let mut app = TestApp::new();

    let response = app.get("/checkout/pay").await;
    assert_eq!(response.location(), Some("/cart"));

    app.add_to_cart(3, "Anillo Luna", 12_990, 1).await;
    let response = app.get("/checkout/pay").await;
    assert_eq!(response.location(), Some("/checkout/shipping"));

    app.submit_shipping().await;
    let response = app.get("/checkout/pay").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["subtotal"], "$12.990");
    assert_eq!(response.json()["shipping"]["comuna"], "Providencia");
}

#[tokio::test]
async fn test_init_requires_login() {
    let mut app = TestApp::new();

    let response = app.post("/webpay/init/", "shipping_cost=0").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(
        response.location(),
        Some("/accounts/login/?next=%2Fwebpay%2Finit%2F")
    );
    assert!(app.orders.is_empty().await);
}

#[tokio::test]
async fn test_init_with_empty_cart_creates_no_order() {
    let mut app = TestApp::new();
    app.login(7, "ana@example.cl").await;

    let response = app.post("/webpay/init/", "shipping_cost=0").await;
    assert_eq!(response.location(), Some("/cart"));
    assert!(app.orders.is_empty().await);
    assert_eq!(app.gateway.creates(), 0);
}

#[tokio::test]
async fn test_init_without_shipping_creates_no_order() {
    let mut app = TestApp::new();
    app.login(7, "ana@example.cl").await;
    app.add_to_cart(3, "Anillo Luna", 12_990, 1).await;

    let response = app.post("/webpay/init/", "shipping_cost=0").await;
    assert_eq!(response.location(), Some("/checkout/shipping"));
    assert!(app.orders.is_empty().await);
}

#[tokio::test]
async fn test_init_creates_pending_order_and_redirects() {
    let mut app = ready_to_pay().await;

    start_payment(&mut app).await;

    let orders = app.orders.all().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[0].total, Decimal::from(29_970));
    assert_eq!(orders[0].shipping_data.as_ref().unwrap()["shipping_cost"], 3990);

    let request = app.gateway.last_request().unwrap();
    assert_eq!(request.amount, 29_970);
    assert_eq!(request.session_id, "7");
    assert_eq!(request.return_url, format!("{BASE_URL}/webpay/confirmacion/"));
    assert!(request.buy_order.starts_with(&format!("orden-{}-", orders[0].id)));

    // The cart survives until the payment is confirmed.
    assert_eq!(app.get("/cart").await.json()["item_count"], 2);
}

#[tokio::test]
async fn test_init_gateway_failure_cancels_order() {
    let mut app = ready_to_pay().await;
    app.gateway.fail_create();

    let response = app.post("/webpay/init/", "shipping_cost=3990").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("No se pudo iniciar el pago con Webpay."));

    let orders = app.orders.all().await;
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    assert_eq!(
        app.notifier.sent(),
        vec![Sent::Failed(
            orders[0].id,
            "No se pudo iniciar el pago con Webpay.".to_string()
        )]
    );
}

#[tokio::test]
async fn test_authorized_payment_marks_paid_and_clears_cart() {
    let mut app = ready_to_pay().await;
    let token = start_payment(&mut app).await;
    app.gateway
        .commit_with(json!({"status": "AUTHORIZED", "response_code": 0, "amount": 29970}));

    let response = app
        .get(&format!("/webpay/confirmacion/?token_ws={token}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Transacción aprobada"));

    let order = app.orders.all().await.remove(0);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(app.notifier.sent(), vec![Sent::Paid(order.id)]);
    assert_eq!(app.get("/cart").await.json()["item_count"], 0);
}

#[tokio::test]
async fn test_rejected_payment_keeps_cart() {
    let mut app = ready_to_pay().await;
    let token = start_payment(&mut app).await;
    app.gateway
        .commit_with(json!({"status": "FAILED", "response_code": -1}));

    let response = app
        .get(&format!("/webpay/confirmacion/?token_ws={token}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Rechazo de la transacción"));

    let order = app.orders.all().await.remove(0);
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(app.get("/cart").await.json()["item_count"], 2);
}

#[tokio::test]
async fn test_return_without_token_is_cancelled_by_user() {
    let mut app = ready_to_pay().await;
    start_payment(&mut app).await;

    let response = app.get("/webpay/confirmacion/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Pago cancelado por el usuario en Webpay."));
    assert_eq!(app.gateway.commits(), 0);
    assert_eq!(app.orders.all().await[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let mut app = TestApp::new();
    app.gateway
        .commit_with(json!({"status": "AUTHORIZED", "response_code": 0}));

    let response = app.get("/webpay/confirmacion/?token_ws=desconocido").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, "Orden no encontrada para el token");
    assert_eq!(app.gateway.commits(), 1);
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_commit_failure_cancels_order() {
    let mut app = ready_to_pay().await;
    let token = start_payment(&mut app).await;

    let response = app
        .get(&format!("/webpay/confirmacion/?token_ws={token}"))
        .await;
    assert!(response.body.contains("Error al confirmar el pago con Webpay"));
    assert_eq!(app.orders.all().await[0].status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_replayed_confirmation_is_idempotent() {
    let mut app = ready_to_pay().await;
    let token = start_payment(&mut app).await;
    app.gateway
        .commit_with(json!({"status": "AUTHORIZED", "response_code": 0}));

    let uri = format!("/webpay/confirmacion/?token_ws={token}");
    app.get(&uri).await;
    let replay = app.get(&uri).await;

    assert_eq!(replay.status, StatusCode::OK);
    assert!(replay.body.contains("Transacción aprobada"));
    assert_eq!(app.gateway.commits(), 1);
    assert_eq!(app.notifier.sent().len(), 1);
}
