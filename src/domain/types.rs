//! Domain types with validation support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::error::ErrorKind;
use super::phone::PhoneNumber;

/// Audit columns embedded in persisted records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl AuditFields {
    #[must_use]
    pub fn created(at: DateTime<Utc>, by: Option<String>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            modified_at: None,
            modified_by: None,
        }
    }
}

/// A platform user, identified by phone number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier (UUID v7)
    #[schema(example = "01927a3e-6b1c-7d3e-8f1a-2b3c4d5e6f70")]
    pub id: Uuid,
    /// Normalized phone number, immutable after creation
    #[schema(example = "+15550100")]
    pub phone_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Whether the user has filled in their profile
    pub is_profile_completed: bool,
    pub audit: AuditFields,
}

/// Data for inserting a user on first successful verification
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub id: Uuid,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl NewUser {
    #[must_use]
    pub fn for_phone(phone: &PhoneNumber, now: DateTime<Utc>, created_by: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            phone_number: phone.as_str().to_string(),
            created_at: now,
            created_by,
        }
    }

    /// The record as it looks right after insertion
    #[must_use]
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            phone_number: self.phone_number,
            first_name: None,
            last_name: None,
            email: None,
            is_profile_completed: false,
            audit: AuditFields::created(self.created_at, self.created_by),
        }
    }
}

/// Stored state for one in-flight OTP request.
///
/// Only a salted hash of the code is kept; see [`hash_code`].
#[derive(Debug, Clone, PartialEq)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub phone_number: String,
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: i32,
    pub consumed: bool,
}

impl OtpChallenge {
    #[must_use]
    pub fn issue(
        phone: &PhoneNumber,
        code: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
        max_attempts: i32,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            phone_number: phone.as_str().to_string(),
            code_hash: hash_code(&id, code),
            created_at: now,
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
            consumed: false,
        }
    }

    /// Strictly after `expires_at`; the expiry instant itself is still valid
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_locked(&self) -> bool {
        self.attempts_remaining <= 0
    }
}

/// SHA-256 of the challenge id followed by the code, hex encoded
pub fn hash_code(challenge_id: &Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge_id.as_bytes());
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Request body for `POST /otp/request`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpRequest {
    #[validate(length(min = 1, message = "Country code is required"))]
    #[schema(example = "+1")]
    pub country_code: String,
    #[validate(length(min = 1, message = "Mobile number is required"))]
    #[schema(example = "5550100")]
    pub mobile_number: String,
}

impl RequestOtpRequest {
    #[must_use]
    pub fn new(country_code: impl Into<String>, mobile_number: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            mobile_number: mobile_number.into(),
        }
    }
}

/// Request body for `POST /otp/verify`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, message = "Country code is required"))]
    #[schema(example = "+1")]
    pub country_code: String,
    #[validate(length(min = 1, message = "Mobile number is required"))]
    #[schema(example = "5550100")]
    pub mobile_number: String,
    #[validate(length(min = 1, max = 16, message = "Code must be 1-16 characters"))]
    #[schema(example = "123456")]
    pub otp: String,
}

impl VerifyOtpRequest {
    #[must_use]
    pub fn new(
        country_code: impl Into<String>,
        mobile_number: impl Into<String>,
        otp: impl Into<String>,
    ) -> Self {
        Self {
            country_code: country_code.into(),
            mobile_number: mobile_number.into(),
            otp: otp.into(),
        }
    }
}

/// Request body for `PUT /users/{id}/profile`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileRequest {
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,
    #[validate(email(message = "Email address is invalid"))]
    pub email: Option<String>,
}

/// Successful outcome of an OTP request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtpDispatch {
    #[schema(example = "+15550100")]
    pub phone_number: String,
    pub expires_at: DateTime<Utc>,
}

/// Explicit per-call caller context.
///
/// Built at the HTTP boundary and passed down; there is no ambient
/// current-user state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Identity asserted by the upstream identity provider
    pub user_id: Option<Uuid>,
    /// Correlation id for logs and audit columns
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Value recorded in `created_by`/`modified_by`
    pub fn actor(&self) -> Option<String> {
        self.user_id
            .map(|id| id.to_string())
            .or_else(|| self.request_id.as_ref().map(|r| format!("request:{r}")))
    }
}

/// Success/failure envelope returned by every endpoint.
///
/// Exactly one of `value` and the error pair is present.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult<T: ToSchema> {
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "The verification code is incorrect")]
    pub error_message: Option<String>,
}

impl<T: ToSchema> ApiResult<T> {
    pub fn success(value: T) -> Self {
        Self {
            is_success: true,
            value: Some(value),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            value: None,
            error_code: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

/// Placeholder payload for failure envelopes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoValue {}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Database health status
    pub database: HealthStatus,
    /// SMS gateway health status
    pub sms_gateway: HealthStatus,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    /// The database is critical; a broken gateway only degrades the service
    #[must_use]
    pub fn new(database: HealthStatus, sms_gateway: HealthStatus) -> Self {
        let status = match (&database, &sms_gateway) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            sms_gateway,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phone::DEFAULT_ALLOWED_COUNTRY_CODES;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+1", "5550100", DEFAULT_ALLOWED_COUNTRY_CODES).unwrap()
    }

    #[test]
    fn test_challenge_expiry_boundary() {
        let now = Utc::now();
        let challenge = OtpChallenge::issue(&phone(), "123456", now, chrono::Duration::minutes(5), 3);

        assert_eq!(challenge.expires_at, now + chrono::Duration::minutes(5));
        assert!(!challenge.is_expired_at(challenge.expires_at));
        assert!(!challenge.is_expired_at(challenge.expires_at - chrono::Duration::milliseconds(1)));
        assert!(challenge.is_expired_at(challenge.expires_at + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_challenge_does_not_store_plaintext_code() {
        let challenge =
            OtpChallenge::issue(&phone(), "123456", Utc::now(), chrono::Duration::minutes(5), 3);

        assert_ne!(challenge.code_hash, "123456");
        assert_eq!(challenge.code_hash.len(), 64);
        assert_eq!(challenge.code_hash, hash_code(&challenge.id, "123456"));
        assert_eq!(challenge.attempts_remaining, 3);
        assert!(!challenge.consumed);
        assert!(!challenge.is_locked());
    }

    #[test]
    fn test_code_hash_is_salted_by_challenge() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(hash_code(&a, "123456"), hash_code(&b, "123456"));
    }

    #[test]
    fn test_new_user_defaults() {
        let user = NewUser::for_phone(&phone(), Utc::now(), Some("request:abc".to_string()))
            .into_user();
        assert_eq!(user.phone_number, "+15550100");
        assert!(!user.is_profile_completed);
        assert!(user.first_name.is_none());
        assert_eq!(user.audit.created_by.as_deref(), Some("request:abc"));
        assert!(user.audit.modified_at.is_none());
    }

    #[test]
    fn test_api_result_success_shape() {
        let result = ApiResult::success(OtpDispatch {
            phone_number: "+15550100".to_string(),
            expires_at: Utc::now(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isSuccess"], true);
        assert_eq!(json["value"]["phoneNumber"], "+15550100");
        assert!(json.get("errorMessage").is_none());
        assert!(json.get("errorCode").is_none());
    }

    #[test]
    fn test_api_result_failure_shape() {
        let result = ApiResult::<User>::failure(ErrorKind::NotFound, "No active verification code");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isSuccess"], false);
        assert_eq!(json["errorCode"], "NOT_FOUND");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn test_request_validation() {
        assert!(RequestOtpRequest::new("+1", "5550100").validate().is_ok());
        assert!(RequestOtpRequest::new("", "5550100").validate().is_err());
        assert!(VerifyOtpRequest::new("+1", "5550100", "").validate().is_err());

        let profile = CompleteProfileRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: Some("not-an-email".to_string()),
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_request_context_actor() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.actor(), None);

        let ctx = RequestContext {
            user_id: None,
            request_id: Some("r-1".to_string()),
        };
        assert_eq!(ctx.actor().as_deref(), Some("request:r-1"));
    }

    #[test]
    fn test_health_status_aggregation() {
        assert_eq!(
            HealthResponse::new(HealthStatus::Healthy, HealthStatus::Healthy).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthResponse::new(HealthStatus::Healthy, HealthStatus::Unhealthy).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthResponse::new(HealthStatus::Unhealthy, HealthStatus::Healthy).status,
            HealthStatus::Unhealthy
        );
    }
}
