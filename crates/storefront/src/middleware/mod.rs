//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{RequireAuth, set_current_user};
pub use request_id::{RequestId, request_id_middleware};
pub use session::{
    clear_cart, configure_session_layer, load_cart, load_shipping, save_cart, save_shipping,
};
