//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::AppError;
use super::phone::PhoneNumber;
use super::types::{NewUser, OtpChallenge, User};

/// Persistence for OTP challenges, keyed by normalized phone number.
///
/// Every mutating method is a single atomic step keyed on the challenge id,
/// so a stale reader can never resurrect or double-spend a challenge.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Check store connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Insert or overwrite the challenge for its phone number
    async fn replace_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError>;

    /// Get the non-consumed challenge for a phone number, expired or not
    async fn get_live_challenge(&self, phone: &str) -> Result<Option<OtpChallenge>, AppError>;

    /// Decrement attempts if the challenge is still current and not exhausted.
    /// Returns the remaining attempts, or `None` if nothing was updated.
    async fn record_failed_attempt(
        &self,
        phone: &str,
        challenge_id: Uuid,
    ) -> Result<Option<i32>, AppError>;

    /// Mark the challenge consumed if it is still current, unconsumed and
    /// not exhausted. Returns `true` for exactly one caller.
    async fn consume_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError>;

    /// Delete the challenge if it is still the current one
    async fn remove_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError>;

    /// Delete consumed challenges and those expired before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Persistence for user records with a unique phone number
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Check store connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, AppError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Insert a user. A taken phone number fails with
    /// `DatabaseError::Duplicate` and leaves the store unchanged.
    async fn insert_user(&self, user: &NewUser) -> Result<User, AppError>;

    /// Set profile fields and mark the profile completed
    async fn complete_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        modified_at: DateTime<Utc>,
        modified_by: Option<&str>,
    ) -> Result<Option<User>, AppError>;
}

/// Outbound channel that delivers a message to a phone
#[async_trait]
pub trait OtpDeliveryGateway: Send + Sync {
    /// Check provider reachability
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Deliver `message` to `phone`. Failures are returned, never retried.
    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), AppError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of one-time codes
pub trait CodeGenerator: Send + Sync {
    /// Produce `length` symbols drawn from `charset`
    fn generate(&self, length: usize, charset: &[char]) -> String;
}
