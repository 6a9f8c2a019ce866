//! The API layer, containing web handlers and routing.

pub mod handlers;
pub mod router;

pub use handlers::{ApiDoc, request_context, status_for};
pub use router::{
    HttpConfig, RateLimitConfig, build_router, create_router, create_router_with_rate_limit,
};
