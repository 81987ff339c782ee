//! SMTP delivery of order notifications.
//!
//! Uses SMTP via lettre for delivery with Askama text and HTML templates.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;

use gongora_core::OrderId;

use super::notify::{NotificationError, Notifier};
use crate::config::EmailConfig;
use crate::models::Order;

#[derive(Template)]
#[template(path = "email/order_paid.html")]
struct OrderPaidHtml<'a> {
    order_id: OrderId,
    customer_name: &'a str,
    total: &'a str,
    shipping_method: &'a str,
    for_admin: bool,
}

#[derive(Template)]
#[template(path = "email/order_paid.txt")]
struct OrderPaidText<'a> {
    order_id: OrderId,
    customer_name: &'a str,
    total: &'a str,
    shipping_method: &'a str,
    for_admin: bool,
}

#[derive(Template)]
#[template(path = "email/order_failed.html")]
struct OrderFailedHtml<'a> {
    order_id: OrderId,
    customer_name: &'a str,
    total: &'a str,
    message: &'a str,
    detail: &'a str,
    for_admin: bool,
}

#[derive(Template)]
#[template(path = "email/order_failed.txt")]
struct OrderFailedText<'a> {
    order_id: OrderId,
    customer_name: &'a str,
    total: &'a str,
    message: &'a str,
    detail: &'a str,
    for_admin: bool,
}

/// Fields shared by every order template.
struct OrderContext {
    order_id: OrderId,
    customer_name: String,
    total: String,
    shipping_method: String,
}

impl OrderContext {
    fn new(order: &Order) -> Self {
        let shipping = order.shipping_data.as_ref();
        let field = |name: &str| {
            shipping
                .and_then(|data| data.get(name))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        let customer_name = format!("{} {}", field("first_name"), field("last_name"))
            .trim()
            .to_string();

        Self {
            order_id: order.id,
            customer_name,
            total: order.total_price().display(),
            shipping_method: field("shipping_method"),
        }
    }
}

/// Subjects for the purchaser and staff copies.
#[must_use]
pub fn paid_subjects(order_id: OrderId) -> (String, String) {
    (
        format!("¡Gracias! Pedido #{order_id} confirmado"),
        format!("Nuevo pedido pagado #{order_id}"),
    )
}

#[must_use]
pub fn failed_subjects(order_id: OrderId) -> (String, String) {
    (
        format!("Tu pago del pedido #{order_id} no se completó"),
        format!("Pago fallido para pedido #{order_id}"),
    )
}

/// Sends order notifications by e-mail.
///
/// The purchaser gets one message; configured admin recipients get a copy
/// with a staff subject. Orders without a recipient address are skipped
/// entirely.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_recipients: Vec<String>,
}

impl EmailNotifier {
    /// Create a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            admin_recipients: config.admin_recipients.clone(),
        })
    }

    async fn send_multipart_email(
        &self,
        to: &[&str],
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), NotificationError> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(self.from_address.clone()))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for address in to {
            let mailbox: Mailbox = address
                .parse()
                .map_err(|_| NotificationError::InvalidAddress((*address).to_string()))?;
            builder = builder.to(mailbox);
        }

        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body),
                ),
        )?;

        self.mailer.send(email).await?;

        tracing::info!(recipients = to.len(), subject = %subject, "Email sent successfully");
        Ok(())
    }

    fn admin_recipients(&self) -> Vec<&str> {
        self.admin_recipients.iter().map(String::as_str).collect()
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_paid(&self, order: &Order) -> Result<(), NotificationError> {
        let Some(recipient) = order.notification_recipient() else {
            tracing::info!(order_id = %order.id, "No recipient for paid notification");
            return Ok(());
        };

        let ctx = OrderContext::new(order);
        let (customer_subject, admin_subject) = paid_subjects(order.id);

        for for_admin in [false, true] {
            let to = if for_admin {
                self.admin_recipients()
            } else {
                vec![recipient.as_str()]
            };
            if to.is_empty() {
                continue;
            }

            let html = OrderPaidHtml {
                order_id: ctx.order_id,
                customer_name: &ctx.customer_name,
                total: &ctx.total,
                shipping_method: &ctx.shipping_method,
                for_admin,
            }
            .render()?;
            let text = OrderPaidText {
                order_id: ctx.order_id,
                customer_name: &ctx.customer_name,
                total: &ctx.total,
                shipping_method: &ctx.shipping_method,
                for_admin,
            }
            .render()?;

            let subject = if for_admin {
                &admin_subject
            } else {
                &customer_subject
            };
            self.send_multipart_email(&to, subject, text, html).await?;
        }

        Ok(())
    }

    async fn send_failed(
        &self,
        order: &Order,
        message: &str,
        detail: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let Some(recipient) = order.notification_recipient() else {
            tracing::info!(order_id = %order.id, "No recipient for failure notification");
            return Ok(());
        };

        let ctx = OrderContext::new(order);
        let detail = serde_json::to_string_pretty(detail).unwrap_or_default();
        let (customer_subject, admin_subject) = failed_subjects(order.id);

        for for_admin in [false, true] {
            let to = if for_admin {
                self.admin_recipients()
            } else {
                vec![recipient.as_str()]
            };
            if to.is_empty() {
                continue;
            }

            let html = OrderFailedHtml {
                order_id: ctx.order_id,
                customer_name: &ctx.customer_name,
                total: &ctx.total,
                message,
                detail: &detail,
                for_admin,
            }
            .render()?;
            let text = OrderFailedText {
                order_id: ctx.order_id,
                customer_name: &ctx.customer_name,
                total: &ctx.total,
                message,
                detail: &detail,
                for_admin,
            }
            .render()?;

            let subject = if for_admin {
                &admin_subject
            } else {
                &customer_subject
            };
            self.send_multipart_email(&to, subject, text, html).await?;
        }

        Ok(())
    }
}
