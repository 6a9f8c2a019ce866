//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod phone;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ErrorKind, ExternalServiceError, OtpError,
    ValidationError,
};
pub use phone::{DEFAULT_ALLOWED_COUNTRY_CODES, PhoneNumber};
pub use traits::{Clock, CodeGenerator, OtpDeliveryGateway, OtpStore, SystemClock, UserStore};
pub use types::{
    ApiResult, AuditFields, CompleteProfileRequest, HealthResponse, HealthStatus, NewUser,
    NoValue, OtpChallenge, OtpDispatch, RequestContext, RequestOtpRequest, User,
    VerifyOtpRequest, hash_code,
};
