//! Phone OTP authentication and user provisioning for the escrow platform.
//!
//! Layers:
//! - [`domain`]: core types, capability traits and the error taxonomy
//! - [`app`]: the authentication service, rate limiting and background reaper
//! - [`infra`]: PostgreSQL stores and the Twilio SMS gateway
//! - [`api`]: axum handlers, router and OpenAPI document

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
