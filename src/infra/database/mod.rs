//! Database infrastructure.

pub mod postgres;

pub use postgres::{PostgresClient, PostgresConfig};
