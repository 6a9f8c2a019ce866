//! Infrastructure layer implementations.

pub mod database;
pub mod sms;

pub use database::{PostgresClient, PostgresConfig};
pub use sms::{TwilioConfig, TwilioSmsGateway};
