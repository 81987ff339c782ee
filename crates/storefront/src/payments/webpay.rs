//! Webpay Plus REST client (Transbank).
//!
//! Two calls are used:
//!
//! - `POST {base}/transactions` creates a transaction and returns the
//!   `token` plus the form `url` the buyer is redirected to.
//! - `PUT {base}/transactions/{token}` commits it once the buyer returns.
//!
//! Neither call is retried: a commit that fails is reported as such and the
//! order is cancelled.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::WebpayConfig;

/// Status Webpay reports for an approved payment.
pub const AUTHORIZED: &str = "AUTHORIZED";

/// Message used when a response code is missing or unknown.
pub const DEFAULT_REJECTION: &str = "El pago no fue autorizado.";

/// Buyer-facing text for a Webpay `response_code`.
#[must_use]
pub fn response_message(code: Option<i64>) -> &'static str {
    match code {
        Some(0) => "Transacción aprobada",
        Some(-1) => "Rechazo de la transacción",
        Some(-2) => "Transacción debe reintentarse",
        Some(-3) => "Error en transacción",
        Some(-4) => "Rechazo de transacción",
        Some(-5) => "Rechazo por error de tasa",
        Some(-6) => "Excede cupo máximo mensual",
        Some(-7) => "Excede límite diario por transacción",
        Some(-8) => "Rubro no autorizado",
        _ => DEFAULT_REJECTION,
    }
}

/// Errors that can occur when talking to Webpay.
#[derive(Debug, Error)]
pub enum WebpayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Credentials cannot be sent as headers.
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Body of the create-transaction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateTransaction {
    pub buy_order: String,
    pub session_id: String,
    /// Whole CLP.
    pub amount: i64,
    pub return_url: String,
}

/// Response of the create-transaction call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedTransaction {
    pub token: String,
    pub url: String,
}

impl CreatedTransaction {
    /// Where to send the buyer: `{url}?token_ws={token}`.
    #[must_use]
    pub fn redirect_url(&self) -> String {
        format!("{}?token_ws={}", self.url, urlencoding::encode(&self.token))
    }
}

/// Response of the commit call, kept raw for display and notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub status: Option<String>,
    pub response_code: Option<i64>,
    pub raw: serde_json::Value,
}

impl CommitResult {
    #[must_use]
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let status = raw
            .get("status")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let response_code = raw.get("response_code").and_then(serde_json::Value::as_i64);

        Self {
            status,
            response_code,
            raw,
        }
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.status.as_deref() == Some(AUTHORIZED)
    }
}

/// The payment processor as seen by the payment flow.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<CreatedTransaction, WebpayError>;

    async fn commit_transaction(&self, token: &str) -> Result<CommitResult, WebpayError>;
}

/// Webpay Plus REST API client.
#[derive(Clone)]
pub struct WebpayClient {
    client: reqwest::Client,
    base_url: String,
    create_timeout: std::time::Duration,
    commit_timeout: std::time::Duration,
}

impl WebpayClient {
    /// Create a new Webpay client.
    ///
    /// # Errors
    ///
    /// Returns error if the credentials are not valid header values or the
    /// HTTP client fails to build.
    pub fn new(config: &WebpayConfig) -> Result<Self, WebpayError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "Tbk-Api-Key-Id",
            HeaderValue::from_str(&config.api_key_id)
                .map_err(|e| WebpayError::InvalidHeader(format!("api key id: {e}")))?,
        );

        let mut secret = HeaderValue::from_str(config.api_key_secret.expose_secret())
            .map_err(|e| WebpayError::InvalidHeader(format!("api key secret: {e}")))?;
        secret.set_sensitive(true);
        headers.insert("Tbk-Api-Key-Secret", secret);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            create_timeout: config.create_timeout,
            commit_timeout: config.commit_timeout,
        })
    }

    async fn error_from(response: reqwest::Response) -> WebpayError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        WebpayError::Api { status, message }
    }
}

#[async_trait]
impl PaymentGateway for WebpayClient {
    #[instrument(skip(self, request), fields(buy_order = %request.buy_order, amount = request.amount))]
    async fn create_transaction(
        &self,
        request: &CreateTransaction,
    ) -> Result<CreatedTransaction, WebpayError> {
        let response = self
            .client
            .post(format!("{}/transactions", self.base_url))
            .timeout(self.create_timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| WebpayError::Parse(e.to_string()))
    }

    #[instrument(skip(self, token))]
    async fn commit_transaction(&self, token: &str) -> Result<CommitResult, WebpayError> {
        let response = self
            .client
            .put(format!(
                "{}/transactions/{}",
                self.base_url,
                urlencoding::encode(token)
            ))
            .timeout(self.commit_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WebpayError::Parse(e.to_string()))?;

        Ok(CommitResult::from_raw(raw))
    }
}
