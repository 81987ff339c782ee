//! Services for storefront.
//!
//! - `notify` - Notifier seam and best-effort delivery wrapper
//! - `email` - SMTP notifier for paid and failed orders

pub mod email;
pub mod notify;

pub use email::EmailNotifier;
pub use notify::{NoopNotifier, NotificationError, Notifications, Notifier};
