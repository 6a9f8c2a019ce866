//! OTP issuance policy loaded once at process start.

use std::env;
use std::time::Duration;

use crate::domain::{ConfigError, DEFAULT_ALLOWED_COUNTRY_CODES};

pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_CODE_CHARSET: &str = "0123456789";
pub const DEFAULT_TTL_SECS: i64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 3;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: i64 = 600;
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "Your verification code is {code}";
/// Upper bound for `OTP_TTL_SECS` and `OTP_RATE_LIMIT_WINDOW_SECS`
pub const MAX_WINDOW_SECS: i64 = 86_400;

/// Tunables for code generation, verification and request throttling
#[derive(Debug, Clone)]
pub struct OtpPolicy {
    /// Number of symbols in a code
    pub code_length: usize,
    /// Symbols a code is drawn from
    pub code_charset: Vec<char>,
    /// Lifetime of a challenge
    pub ttl: chrono::Duration,
    /// Mismatches allowed before the challenge locks
    pub max_attempts: i32,
    /// Requests allowed per number inside `rate_limit_window`
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: chrono::Duration,
    /// Upper bound on a single gateway call
    pub delivery_timeout: Duration,
    /// Calling codes accepted by the phone validator, without `+`
    pub allowed_country_codes: Vec<String>,
    /// SMS body, `{code}` is substituted
    pub message_template: String,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            code_charset: DEFAULT_CODE_CHARSET.chars().collect(),
            ttl: chrono::Duration::seconds(DEFAULT_TTL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: chrono::Duration::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            delivery_timeout: Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
            allowed_country_codes: DEFAULT_ALLOWED_COUNTRY_CODES
                .iter()
                .map(|cc| cc.to_string())
                .collect(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

impl OtpPolicy {
    /// Load the policy from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let code_length = env::var("OTP_CODE_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.code_length);

        let code_charset = env::var("OTP_CODE_CHARSET")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().collect())
            .unwrap_or(defaults.code_charset);

        let ttl = parse_secs("OTP_TTL_SECS", env::var("OTP_TTL_SECS").ok())?
            .unwrap_or(defaults.ttl);

        let max_attempts = env::var("OTP_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let rate_limit_max_requests = env::var("OTP_RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_max_requests);

        let rate_limit_window = parse_secs(
            "OTP_RATE_LIMIT_WINDOW_SECS",
            env::var("OTP_RATE_LIMIT_WINDOW_SECS").ok(),
        )?
        .unwrap_or(defaults.rate_limit_window);

        let delivery_timeout = env::var("OTP_DELIVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.delivery_timeout);

        // Comma separated, e.g. "1,44,98"
        let allowed_country_codes = env::var("OTP_ALLOWED_COUNTRY_CODES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|cc| cc.trim().trim_start_matches('+').to_string())
                    .filter(|cc| !cc.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|codes| !codes.is_empty())
            .unwrap_or(defaults.allowed_country_codes);

        let message_template = env::var("OTP_MESSAGE_TEMPLATE")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.message_template);

        let policy = Self {
            code_length,
            code_charset,
            ttl,
            max_attempts,
            rate_limit_max_requests,
            rate_limit_window,
            delivery_timeout,
            allowed_country_codes,
            message_template,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Reject values the service cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=12).contains(&self.code_length) {
            return Err(invalid("OTP_CODE_LENGTH", "must be between 4 and 12"));
        }
        if self.code_charset.len() < 2 {
            return Err(invalid("OTP_CODE_CHARSET", "must contain at least 2 symbols"));
        }
        let max_window = chrono::Duration::seconds(MAX_WINDOW_SECS);
        let in_range = |d: chrono::Duration| d > chrono::Duration::zero() && d <= max_window;
        if !in_range(self.ttl) {
            return Err(invalid("OTP_TTL_SECS", "must be between 1 and 86400"));
        }
        if self.max_attempts < 1 {
            return Err(invalid("OTP_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.rate_limit_max_requests < 1 {
            return Err(invalid("OTP_RATE_LIMIT_MAX_REQUESTS", "must be at least 1"));
        }
        if !in_range(self.rate_limit_window) {
            return Err(invalid(
                "OTP_RATE_LIMIT_WINDOW_SECS",
                "must be between 1 and 86400",
            ));
        }
        if self.delivery_timeout.is_zero() {
            return Err(invalid("OTP_DELIVERY_TIMEOUT_SECS", "must be positive"));
        }
        if self.allowed_country_codes.is_empty() {
            return Err(ConfigError::Missing("OTP_ALLOWED_COUNTRY_CODES".to_string()));
        }
        if !self.message_template.contains("{code}") {
            return Err(invalid("OTP_MESSAGE_TEMPLATE", "must contain {code}"));
        }
        Ok(())
    }

    /// SMS body for a freshly generated code
    pub fn render_message(&self, code: &str) -> String {
        self.message_template.replace("{code}", code)
    }

    /// Whether `code` could have been produced under this policy
    pub fn is_well_formed_code(&self, code: &str) -> bool {
        code.chars().count() == self.code_length
            && code.chars().all(|c| self.code_charset.contains(&c))
    }
}

/// Seconds from an optional raw value. Unparsable input falls back to the
/// default, values chrono cannot represent are rejected.
fn parse_secs(key: &str, raw: Option<String>) -> Result<Option<chrono::Duration>, ConfigError> {
    let Some(secs) = raw.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return Ok(None);
    };
    chrono::Duration::try_seconds(secs)
        .map(Some)
        .ok_or_else(|| invalid(key, "out of range"))
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
