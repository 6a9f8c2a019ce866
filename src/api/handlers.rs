//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::{
    ApiResult, AppError, AuditFields, CompleteProfileRequest, ErrorKind, HealthResponse,
    HealthStatus, NoValue, OtpDispatch, RequestContext, RequestOtpRequest, User,
    ValidationError, VerifyOtpRequest,
};

/// Caller identity asserted by the upstream gateway.
///
/// Only the gateway may set this header: the service trusts it as-is, so
/// browsers are not allowed to send it cross-origin (see the CORS layer).
pub const USER_ID_HEADER: &str = "x-user-id";
/// Correlation id propagated into logs and audit columns
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Escrow Auth Service API",
        version = "0.1.0",
        description = "Phone number OTP login and user provisioning for the escrow platform",
        license(
            name = "MIT"
        )
    ),
    paths(
        request_otp_handler,
        verify_otp_handler,
        get_user_handler,
        complete_profile_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            RequestOtpRequest,
            VerifyOtpRequest,
            CompleteProfileRequest,
            OtpDispatch,
            User,
            AuditFields,
            ErrorKind,
            NoValue,
            ApiResult<OtpDispatch>,
            ApiResult<User>,
            ApiResult<NoValue>,
            HealthResponse,
            HealthStatus,
        )
    ),
    tags(
        (name = "otp", description = "One-time password login"),
        (name = "users", description = "User profile endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Request a one-time code
///
/// Validates the number, throttles repeated requests and sends a fresh code
/// by SMS. Any earlier code for the same number stops working.
#[utoipa::path(
    post,
    path = "/otp/request",
    tag = "otp",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = ApiResult<OtpDispatch>),
        (status = 400, description = "Invalid phone number", body = ApiResult<NoValue>),
        (status = 429, description = "Too many code requests", body = ApiResult<NoValue>),
        (status = 503, description = "Code could not be delivered", body = ApiResult<NoValue>)
    )
)]
pub async fn request_otp_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RequestOtpRequest>, JsonRejection>,
) -> Result<Json<ApiResult<OtpDispatch>>, AppError> {
    let Json(payload) = payload.map_err(json_rejection)?;
    let dispatch = state.service.request_otp(&payload).await?;
    Ok(Json(ApiResult::success(dispatch)))
}

/// Verify a one-time code
///
/// On success the user owning the number is returned, created on first login.
#[utoipa::path(
    post,
    path = "/otp/verify",
    tag = "otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Code accepted", body = ApiResult<User>),
        (status = 400, description = "Malformed phone number or code", body = ApiResult<NoValue>),
        (status = 401, description = "Code expired or incorrect", body = ApiResult<NoValue>),
        (status = 403, description = "Too many failed attempts", body = ApiResult<NoValue>),
        (status = 404, description = "No active code for this number", body = ApiResult<NoValue>),
        (status = 503, description = "Storage unavailable", body = ApiResult<NoValue>)
    )
)]
pub async fn verify_otp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<ApiResult<User>>, AppError> {
    let Json(payload) = payload.map_err(json_rejection)?;
    let ctx = request_context(&headers);
    let user = state.service.verify_otp(&payload, &ctx).await?;
    Ok(Json(ApiResult::success(user)))
}

/// Get the caller's user record
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ("X-User-Id" = Uuid, Header, description = "Authenticated caller")
    ),
    responses(
        (status = 200, description = "User found", body = ApiResult<User>),
        (status = 401, description = "Caller identity missing", body = ApiResult<NoValue>),
        (status = 403, description = "Caller is not this user", body = ApiResult<NoValue>),
        (status = 404, description = "User not found", body = ApiResult<NoValue>)
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResult<User>>, AppError> {
    let Path(id) = id.map_err(path_rejection)?;
    let ctx = request_context(&headers);
    let user = state.service.get_user(id, &ctx).await?;
    Ok(Json(ApiResult::success(user)))
}

/// Complete the caller's profile
#[utoipa::path(
    put,
    path = "/users/{id}/profile",
    tag = "users",
    request_body = CompleteProfileRequest,
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ("X-User-Id" = Uuid, Header, description = "Authenticated caller")
    ),
    responses(
        (status = 200, description = "Profile saved", body = ApiResult<User>),
        (status = 400, description = "Invalid profile fields", body = ApiResult<NoValue>),
        (status = 401, description = "Caller identity missing", body = ApiResult<NoValue>),
        (status = 403, description = "Caller is not this user", body = ApiResult<NoValue>),
        (status = 404, description = "User not found", body = ApiResult<NoValue>)
    )
)]
pub async fn complete_profile_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CompleteProfileRequest>, JsonRejection>,
) -> Result<Json<ApiResult<User>>, AppError> {
    let Path(id) = id.map_err(path_rejection)?;
    let Json(payload) = payload.map_err(json_rejection)?;
    let ctx = request_context(&headers);
    let user = state.service.complete_profile(id, &payload, &ctx).await?;
    Ok(Json(ApiResult::success(user)))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Build the per-call context from request headers.
///
/// An unparseable `X-User-Id` is treated as absent.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| match Uuid::parse_str(v.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring malformed X-User-Id header");
                None
            }
        });
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(64).collect());

    RequestContext {
        user_id,
        request_id,
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::Validation(ValidationError::InvalidField {
        field: "body".to_string(),
        message: rejection.body_text(),
    })
}

fn path_rejection(rejection: PathRejection) -> AppError {
    AppError::Validation(ValidationError::InvalidField {
        field: "id".to_string(),
        message: rejection.body_text(),
    })
}

/// HTTP status for each client-visible error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Expired | ErrorKind::CodeMismatch | ErrorKind::Unauthorized => {
            StatusCode::UNAUTHORIZED
        }
        ErrorKind::TooManyAttempts | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::DeliveryUnavailable | ErrorKind::StorageUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        // Internal detail stays in the log
        if status.is_server_error() {
            error!(error_code = %kind, error = %self, "Server error");
        }

        let body = Json(ApiResult::<NoValue>::failure(kind, self.public_message()));
        let mut response = (status, body).into_response();

        if let Some(value) = self
            .retry_after_secs()
            .and_then(|secs| HeaderValue::from_str(&secs.to_string()).ok())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}
