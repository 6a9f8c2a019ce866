//! Error taxonomy for the authentication service.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Input validation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),
}

/// Expected outcomes of the OTP state machine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("No active verification code for this number")]
    NotFound,

    #[error("Verification code has expired")]
    Expired,

    #[error("Too many failed verification attempts")]
    TooManyAttempts,

    #[error("Verification code does not match")]
    CodeMismatch,

    #[error("Too many code requests, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Verification code could not be issued: {0}")]
    DeliveryUnavailable(String),
}

/// Persistence failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Failures talking to third-party providers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Provider misconfigured: {0}")]
    Configuration(String),
}

/// Invalid static configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing configuration: {0}")]
    Missing(String),
}

/// Stable, client-visible error classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Expired,
    TooManyAttempts,
    CodeMismatch,
    RateLimitExceeded,
    DeliveryUnavailable,
    StorageUnavailable,
    Unauthorized,
    Forbidden,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Expired => "EXPIRED",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::CodeMismatch => "CODE_MISMATCH",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::DeliveryUnavailable => "DELIVERY_UNAVAILABLE",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
        }
    }

    /// Fixed message shown to clients. Never carries internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "The request is invalid",
            Self::NotFound => "No active verification code was found",
            Self::Expired => "The verification code has expired, request a new one",
            Self::TooManyAttempts => "Too many failed attempts, request a new code",
            Self::CodeMismatch => "The verification code is incorrect",
            Self::RateLimitExceeded => "Too many requests, try again later",
            Self::DeliveryUnavailable => "The verification code could not be sent",
            Self::StorageUnavailable => "The service is temporarily unavailable",
            Self::Unauthorized => "Authentication is required",
            Self::Forbidden => "Access to this resource is not allowed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    /// Classify this error into the stable client-facing set
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Otp(otp) => match otp {
                OtpError::NotFound => ErrorKind::NotFound,
                OtpError::Expired => ErrorKind::Expired,
                OtpError::TooManyAttempts => ErrorKind::TooManyAttempts,
                OtpError::CodeMismatch => ErrorKind::CodeMismatch,
                OtpError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
                OtpError::DeliveryUnavailable(_) => ErrorKind::DeliveryUnavailable,
            },
            Self::Database(DatabaseError::NotFound(_)) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::StorageUnavailable,
            Self::ExternalService(_) => ErrorKind::DeliveryUnavailable,
            Self::Config(_) | Self::Internal(_) => ErrorKind::StorageUnavailable,
            Self::Authentication(_) => ErrorKind::Unauthorized,
            Self::Authorization(_) => ErrorKind::Forbidden,
            Self::RateLimited => ErrorKind::RateLimitExceeded,
        }
    }

    /// Seconds a client should wait before retrying, when known
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Otp(OtpError::RateLimitExceeded { retry_after_secs }) => Some(*retry_after_secs),
            Self::RateLimited => Some(1),
            _ => None,
        }
    }

    /// Message safe to return to the client.
    ///
    /// Validation errors describe the offending field; every other kind
    /// uses the fixed message of its [`ErrorKind`].
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Otp(OtpError::RateLimitExceeded { retry_after_secs }) => format!(
                "{} (retry in {retry_after_secs}s)",
                self.kind().public_message()
            ),
            Self::Database(DatabaseError::NotFound(_)) => {
                "The requested record was not found".to_string()
            }
            _ => self.kind().public_message().to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}
