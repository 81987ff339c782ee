//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::PgOrderStore;
use crate::geo::{GeoError, GeoResolver};
use crate::payments::{PaymentService, WebpayClient, WebpayError};
use crate::services::{EmailNotifier, Notifications};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("geo client: {0}")]
    Geo(#[from] GeoError),
    #[error("webpay client: {0}")]
    Webpay(#[from] WebpayError),
    #[error("smtp transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    geo: GeoResolver,
    payments: PaymentService,
}

impl AppState {
    /// Create the production state: Postgres orders, Webpay, DPA lookups and
    /// SMTP notifications when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the outbound clients cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let geo = GeoResolver::new(&config.geo)?;
        let gateway = WebpayClient::new(&config.webpay)?;

        let notifications = match &config.email {
            Some(email) => Notifications::new(Arc::new(EmailNotifier::new(email)?)),
            None => {
                tracing::warn!("SMTP_HOST not set, order e-mails are disabled");
                Notifications::default()
            }
        };

        let payments = PaymentService::new(
            Arc::new(PgOrderStore::new(pool.clone())),
            Arc::new(gateway),
            notifications,
        );

        Ok(Self::from_parts(config, pool, geo, payments))
    }

    /// Assemble state from already-built services.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        pool: PgPool,
        geo: GeoResolver,
        payments: PaymentService,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                geo,
                payments,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Region and comuna lookups.
    #[must_use]
    pub fn geo(&self) -> &GeoResolver {
        &self.inner.geo
    }

    /// Checkout payment flow.
    #[must_use]
    pub fn payments(&self) -> &PaymentService {
        &self.inner.payments
    }
}
