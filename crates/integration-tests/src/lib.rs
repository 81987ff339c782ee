//! Test harness for router-level storefront tests.
//!
//! [`TestApp`] builds the real storefront router over in-memory
//! collaborators: orders live in an [`InMemoryOrderStore`], sessions in a
//! `MemoryStore`, Webpay is a [`ScriptedGateway`] and e-mails go to a
//! [`RecordingNotifier`]. No database or network is needed; the pool is
//! lazy and points at a closed port.
//!
//! Two test-only routes stand in for the accounts service and the catalog:
//! `POST /test/login` signs a user in and `POST /test/cart` puts a product
//! in the cart without a product lookup.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::routing::post;
use axum::{Form, Router};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session};

use gongora_core::{Email, OrderId, ProductId, UserId};
use gongora_storefront::config::{GeoConfig, StorefrontConfig, WebpayConfig};
use gongora_storefront::db::{InMemoryOrderStore, Product};
use gongora_storefront::geo::{EmbeddedSource, GeoResolver, GeoSource};
use gongora_storefront::middleware::{load_cart, save_cart, set_current_user};
use gongora_storefront::models::{CurrentUser, Order};
use gongora_storefront::payments::{
    CommitResult, CreateTransaction, CreatedTransaction, PaymentGateway, PaymentService,
    WebpayError,
};
use gongora_storefront::services::{NotificationError, Notifications, Notifier};
use gongora_storefront::state::AppState;
use gongora_storefront::{routes, with_middleware};

/// Base URL the test storefront believes it is served from.
pub const BASE_URL: &str = "http://tienda.test";

/// Where the scripted gateway sends buyers.
pub const WEBPAY_FORM_URL: &str = "https://webpay.test/webpayserver/initTransaction";

// =============================================================================
// Collaborators
// =============================================================================

/// Webpay stand-in with scripted answers.
///
/// Tokens are `tok-{buy_order}`. Commit answers with the scripted payload,
/// or fails with HTTP 500 when none is set.
#[derive(Default)]
pub struct ScriptedGateway {
    fail_create: AtomicBool,
    commit: Mutex<Option<serde_json::Value>>,
    creates: AtomicUsize,
    commits: AtomicUsize,
    last_request: Mutex<Option<CreateTransaction>>,
}

impl ScriptedGateway {
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn commit_with(&self, payload: serde_json::Value) {
        *self.commit.lock().unwrap() = Some(payload);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CreateTransaction> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<CreatedTransaction, WebpayError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(WebpayError::Api {
                status: 503,
                message: "servicio no disponible".to_string(),
            });
        }

        Ok(CreatedTransaction {
            token: format!("tok-{}", request.buy_order),
            url: WEBPAY_FORM_URL.to_string(),
        })
    }

    async fn commit_transaction(&self, _token: &str) -> Result<CommitResult, WebpayError> {
        self.commits.fetch_add(1, Ordering::SeqCst);

        match self.commit.lock().unwrap().clone() {
            Some(payload) => Ok(CommitResult::from_raw(payload)),
            None => Err(WebpayError::Api {
                status: 500,
                message: "commit failed".to_string(),
            }),
        }
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Paid(OrderId),
    Failed(OrderId, String),
}

/// Notifier that records instead of sending.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_paid(&self, order: &Order) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(Sent::Paid(order.id));
        Ok(())
    }

    async fn send_failed(
        &self,
        order: &Order,
        message: &str,
        _detail: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Failed(order.id, message.to_string()));
        Ok(())
    }
}

// =============================================================================
// Test-only routes
// =============================================================================

#[derive(Deserialize)]
struct LoginForm {
    user_id: i32,
    email: String,
}

#[derive(Deserialize)]
struct CartForm {
    product_id: i32,
    name: String,
    price: i64,
    quantity: u32,
}

async fn login(session: Session, Form(form): Form<LoginForm>) -> StatusCode {
    let user = CurrentUser {
        id: UserId::new(form.user_id),
        email: Email::parse(&form.email).unwrap(),
    };
    set_current_user(&session, &user).await.unwrap();
    StatusCode::NO_CONTENT
}

async fn seed_cart(session: Session, Form(form): Form<CartForm>) -> StatusCode {
    let mut cart = load_cart(&session).await;
    cart.add(
        &Product {
            id: ProductId::new(form.product_id),
            name: form.name,
            price: Decimal::from(form.price),
        },
        form.quantity,
    );
    save_cart(&session, &cart).await.unwrap();
    StatusCode::NO_CONTENT
}

fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/test/login", post(login))
        .route("/test/cart", post(seed_cart))
}

// =============================================================================
// App
// =============================================================================

/// Configuration pointing nowhere; nothing in the harness dials out.
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://gongora@127.0.0.1:9/gongora"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: BASE_URL.to_string(),
        geo: GeoConfig::default(),
        webpay: WebpayConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            api_key_id: "597055555532".to_string(),
            api_key_secret: SecretString::from("unused-in-tests"),
            create_timeout: Duration::from_secs(1),
            commit_timeout: Duration::from_secs(1),
        },
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Storefront router plus handles on its collaborators.
pub struct TestApp {
    router: Router,
    cookie: Option<String>,
    pub orders: InMemoryOrderStore,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    /// App whose geo lookups are answered by the embedded tier only.
    pub fn new() -> Self {
        let embedded: Arc<dyn GeoSource> = Arc::new(EmbeddedSource);
        Self::with_geo(GeoResolver::with_tiers(
            vec![embedded],
            Duration::from_secs(60),
        ))
    }

    pub fn with_geo(geo: GeoResolver) -> Self {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("postgres://gongora@127.0.0.1:9/gongora")
            .unwrap();

        let orders = InMemoryOrderStore::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let payments = PaymentService::new(
            Arc::new(orders.clone()),
            gateway.clone(),
            Notifications::new(notifier.clone()),
        );
        let state = AppState::from_parts(config, pool, geo, payments);
        let router = with_middleware(
            routes::routes().merge(test_routes()),
            state,
            MemoryStore::default(),
        );

        Self {
            router,
            cookie: None,
            orders,
            gateway,
            notifier,
        }
    }

    /// Send a request, carrying the session cookie across calls.
    pub async fn send(&mut self, method: Method, uri: &str, form: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, form: &str) -> TestResponse {
        self.send(Method::POST, uri, Some(form)).await
    }

    /// Sign in as `user_id`.
    pub async fn login(&mut self, user_id: i32, email: &str) {
        let response = self
            .post(
                "/test/login",
                &format!("user_id={user_id}&email={}", email.replace('@', "%40")),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    /// Put `quantity` units of a product in the cart.
    pub async fn add_to_cart(&mut self, product_id: i32, name: &str, price: i64, quantity: u32) {
        let response = self
            .post(
                "/test/cart",
                &format!(
                    "product_id={product_id}&name={}&price={price}&quantity={quantity}",
                    name.replace(' ', "+")
                ),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    /// Complete the shipping step.
    pub async fn submit_shipping(&mut self) {
        let response = self
            .post(
                "/checkout/shipping",
                "first_name=Ana&last_name=Rojas&email=ana%40example.cl&phone=%2B56911112222\
                 &address=Av.+Providencia+123&comuna=Providencia&region=13&shipping_method=delivery",
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Collected response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}
