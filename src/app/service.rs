//! Authentication service: OTP issuance, verification and user provisioning.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    AppError, Clock, CodeGenerator, CompleteProfileRequest, DatabaseError, HealthResponse,
    HealthStatus, NewUser, OtpChallenge, OtpDeliveryGateway, OtpDispatch, OtpError, OtpStore,
    PhoneNumber, RequestContext, RequestOtpRequest, SystemClock, User, UserStore,
    ValidationError, VerifyOtpRequest, hash_code,
};

use super::codes::OsRngCodeGenerator;
use super::policy::OtpPolicy;
use super::rate_limiter::OtpRequestLimiter;

/// Application service containing the OTP login flow
pub struct AuthService {
    otp_store: Arc<dyn OtpStore>,
    user_store: Arc<dyn UserStore>,
    gateway: Arc<dyn OtpDeliveryGateway>,
    policy: OtpPolicy,
    limiter: OtpRequestLimiter,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        otp_store: Arc<dyn OtpStore>,
        user_store: Arc<dyn UserStore>,
        gateway: Arc<dyn OtpDeliveryGateway>,
        policy: OtpPolicy,
    ) -> Self {
        let limiter =
            OtpRequestLimiter::new(policy.rate_limit_max_requests, policy.rate_limit_window);
        Self {
            otp_store,
            user_store,
            gateway,
            policy,
            limiter,
            clock: Arc::new(SystemClock),
            codes: Arc::new(OsRngCodeGenerator),
        }
    }

    /// Replace the time source (builder pattern)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the code source (builder pattern)
    #[must_use]
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Validate and normalize a phone number against the configured allow-list
    pub fn parse_phone(
        &self,
        country_code: &str,
        national_number: &str,
    ) -> Result<PhoneNumber, AppError> {
        PhoneNumber::parse(
            country_code,
            national_number,
            &self.policy.allowed_country_codes,
        )
    }

    /// Issue a fresh code for a phone number and deliver it.
    ///
    /// Any earlier code for the same number stops being valid as soon as the
    /// new challenge is stored.
    #[instrument(skip(self, request))]
    pub async fn request_otp(&self, request: &RequestOtpRequest) -> Result<OtpDispatch, AppError> {
        validate_request(request)?;
        let phone = self.parse_phone(&request.country_code, &request.mobile_number)?;
        let now = self.clock.now();

        self.limiter
            .check_and_record(phone.as_str(), now)
            .inspect_err(|_| warn!(phone = %phone.masked(), "OTP request rate limited"))?;

        let code = self
            .codes
            .generate(self.policy.code_length, &self.policy.code_charset);
        let challenge = OtpChallenge::issue(
            &phone,
            &code,
            now,
            self.policy.ttl,
            self.policy.max_attempts,
        );

        self.otp_store
            .replace_challenge(&challenge)
            .await
            .map_err(|e| {
                error!(phone = %phone.masked(), error = %e, "Failed to store OTP challenge");
                OtpError::DeliveryUnavailable("challenge could not be stored".to_string())
            })?;

        let message = self.policy.render_message(&code);
        let delivery =
            tokio::time::timeout(self.policy.delivery_timeout, self.gateway.send(&phone, &message))
                .await;
        let failure = match delivery {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "delivery timed out after {}s",
                self.policy.delivery_timeout.as_secs()
            )),
        };

        if let Some(reason) = failure {
            error!(phone = %phone.masked(), reason = %reason, "OTP delivery failed");
            // Withdraw the undeliverable challenge unless a newer one replaced it
            if let Err(e) = self
                .otp_store
                .remove_challenge(phone.as_str(), challenge.id)
                .await
            {
                warn!(error = %e, "Failed to withdraw undelivered OTP challenge");
            }
            return Err(OtpError::DeliveryUnavailable(reason).into());
        }

        info!(
            phone = %phone.masked(),
            expires_at = %challenge.expires_at,
            "OTP issued"
        );

        Ok(OtpDispatch {
            phone_number: phone.as_str().to_string(),
            expires_at: challenge.expires_at,
        })
    }

    /// Check a submitted code and return the (possibly new) user it proves.
    #[instrument(skip(self, request, ctx))]
    pub async fn verify_otp(
        &self,
        request: &VerifyOtpRequest,
        ctx: &RequestContext,
    ) -> Result<User, AppError> {
        validate_request(request)?;
        let phone = self.parse_phone(&request.country_code, &request.mobile_number)?;
        if !self.policy.is_well_formed_code(&request.otp) {
            return Err(ValidationError::InvalidField {
                field: "otp".to_string(),
                message: format!("Code must be {} characters", self.policy.code_length),
            }
            .into());
        }

        let now = self.clock.now();
        let challenge = self
            .otp_store
            .get_live_challenge(phone.as_str())
            .await?
            .ok_or(OtpError::NotFound)?;

        if challenge.is_expired_at(now) {
            self.otp_store
                .remove_challenge(phone.as_str(), challenge.id)
                .await?;
            info!(phone = %phone.masked(), "OTP challenge expired");
            return Err(OtpError::Expired.into());
        }

        if challenge.is_locked() {
            warn!(phone = %phone.masked(), "Verification attempted on locked OTP challenge");
            return Err(OtpError::TooManyAttempts.into());
        }

        let submitted = hash_code(&challenge.id, &request.otp);
        let matches: bool = submitted
            .as_bytes()
            .ct_eq(challenge.code_hash.as_bytes())
            .into();

        if !matches {
            match self
                .otp_store
                .record_failed_attempt(phone.as_str(), challenge.id)
                .await?
            {
                Some(remaining) => {
                    warn!(phone = %phone.masked(), remaining, "OTP code mismatch")
                }
                None => debug!(phone = %phone.masked(), "OTP challenge changed during verification"),
            }
            return Err(OtpError::CodeMismatch.into());
        }

        // A concurrent verifier, replacement or lockout may have won the race
        if !self
            .otp_store
            .consume_challenge(phone.as_str(), challenge.id)
            .await?
        {
            debug!(phone = %phone.masked(), "OTP challenge no longer current");
            return Err(OtpError::NotFound.into());
        }

        let user = self.find_or_create_user(&phone, ctx).await?;
        info!(user_id = %user.id, "OTP verified");
        Ok(user)
    }

    /// Look up the user for a phone number, creating it on first sight.
    ///
    /// Safe to call concurrently: a unique violation on insert means another
    /// caller created the record first, which is then read back.
    #[instrument(skip(self, phone, ctx), fields(phone = %phone.masked()))]
    pub async fn find_or_create_user(
        &self,
        phone: &PhoneNumber,
        ctx: &RequestContext,
    ) -> Result<User, AppError> {
        if let Some(user) = self.user_store.find_user_by_phone(phone.as_str()).await? {
            return Ok(user);
        }

        let new_user = NewUser::for_phone(phone, self.clock.now(), ctx.actor());
        match self.user_store.insert_user(&new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "Provisioned new user");
                Ok(user)
            }
            Err(AppError::Database(DatabaseError::Duplicate(_))) => {
                debug!("User created concurrently, reading it back");
                self.user_store
                    .find_user_by_phone(phone.as_str())
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("user missing after duplicate insert".to_string())
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the caller's own user record
    #[instrument(skip(self, ctx))]
    pub async fn get_user(&self, id: Uuid, ctx: &RequestContext) -> Result<User, AppError> {
        authorize_self(id, ctx)?;
        self.user_store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))
    }

    /// Fill in the caller's profile and mark it completed
    #[instrument(skip(self, request, ctx))]
    pub async fn complete_profile(
        &self,
        id: Uuid,
        request: &CompleteProfileRequest,
        ctx: &RequestContext,
    ) -> Result<User, AppError> {
        authorize_self(id, ctx)?;
        validate_request(request)?;

        let actor = ctx.actor();
        let user = self
            .user_store
            .complete_profile(
                id,
                request.first_name.trim(),
                request.last_name.trim(),
                request.email.as_deref().map(str::trim),
                self.clock.now(),
                actor.as_deref(),
            )
            .await?
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))?;

        info!(user_id = %user.id, "Profile completed");
        Ok(user)
    }

    /// Drop expired challenges and idle rate-limit windows
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let purged = self.otp_store.purge_expired(now).await?;
        self.limiter.prune(now);
        if purged > 0 {
            info!(purged, "Purged stale OTP challenges");
        }
        Ok(purged)
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let database = match (
            self.user_store.health_check().await,
            self.otp_store.health_check().await,
        ) {
            (Ok(()), Ok(())) => HealthStatus::Healthy,
            _ => HealthStatus::Unhealthy,
        };
        let sms_gateway = match self.gateway.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        HealthResponse::new(database, sms_gateway)
    }
}

fn validate_request<T: Validate>(request: &T) -> Result<(), AppError> {
    request.validate().map_err(|e| {
        warn!(error = %e, "Validation failed");
        AppError::Validation(ValidationError::Multiple(e.to_string()))
    })
}

fn authorize_self(id: Uuid, ctx: &RequestContext) -> Result<(), AppError> {
    match ctx.user_id {
        None => Err(AppError::Authentication(
            "caller identity is missing".to_string(),
        )),
        Some(caller) if caller != id => Err(AppError::Authorization(format!(
            "user {caller} may not access user {id}"
        ))),
        Some(_) => Ok(()),
    }
}
