//! Outbound SMS delivery.

pub mod twilio;

pub use twilio::{DEFAULT_TWILIO_API_URL, TwilioConfig, TwilioSmsGateway};
