//! Order notifications.
//!
//! Payment code talks to [`Notifications`], never to a [`Notifier`]
//! directly: a notification that cannot be delivered is logged and dropped,
//! and the payment outcome is the same whether it was sent or not.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::Error as SmtpError;
use thiserror::Error;

use crate::models::Order;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Delivers order notifications to the purchaser and shop staff.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The order was paid.
    async fn send_paid(&self, order: &Order) -> Result<(), NotificationError>;

    /// Payment could not be started or was not authorized.
    async fn send_failed(
        &self,
        order: &Order,
        message: &str,
        detail: &serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// Notifier used when no mail transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_paid(&self, order: &Order) -> Result<(), NotificationError> {
        tracing::debug!(order_id = %order.id, "Email disabled, skipping paid notification");
        Ok(())
    }

    async fn send_failed(
        &self,
        order: &Order,
        _message: &str,
        _detail: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        tracing::debug!(order_id = %order.id, "Email disabled, skipping failure notification");
        Ok(())
    }
}

/// Best-effort wrapper around a [`Notifier`].
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Send the paid notification, logging any failure.
    pub async fn paid(&self, order: &Order) {
        if let Err(e) = self.notifier.send_paid(order).await {
            tracing::error!(order_id = %order.id, error = %e, "Failed to send paid notification");
        }
    }

    /// Send the failure notification, logging any failure.
    pub async fn failed(&self, order: &Order, message: &str, detail: &serde_json::Value) {
        if let Err(e) = self.notifier.send_failed(order, message, detail).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Failed to send payment failure notification"
            );
        }
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}
