//! Application state management.

use std::sync::Arc;

use crate::domain::{OtpDeliveryGateway, OtpStore, UserStore};

use super::policy::OtpPolicy;
use super::service::AuthService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
}

impl AppState {
    /// Create a new application state with the default policy
    #[must_use]
    pub fn new(
        otp_store: Arc<dyn OtpStore>,
        user_store: Arc<dyn UserStore>,
        gateway: Arc<dyn OtpDeliveryGateway>,
    ) -> Self {
        Self::with_policy(otp_store, user_store, gateway, OtpPolicy::default())
    }

    #[must_use]
    pub fn with_policy(
        otp_store: Arc<dyn OtpStore>,
        user_store: Arc<dyn UserStore>,
        gateway: Arc<dyn OtpDeliveryGateway>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            service: Arc::new(AuthService::new(otp_store, user_store, gateway, policy)),
        }
    }

    /// Swap in a pre-built service, e.g. one with a test clock (builder pattern)
    #[must_use]
    pub fn with_service(mut self, service: AuthService) -> Self {
        self.service = Arc::new(service);
        self
    }
}
