//! Twilio Programmable Messaging gateway.
//!
//! Sends the OTP message through the Messages resource:
//! `POST {api_url}/2010-04-01/Accounts/{sid}/Messages.json` with a
//! form-encoded `To`/`From`/`Body` payload and HTTP basic auth.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    AppError, ConfigError, ExternalServiceError, OtpDeliveryGateway, PhoneNumber,
};

/// Default Twilio REST API base URL
pub const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";

/// Default per-request timeout for the HTTP client
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials and endpoint for the Twilio account
#[derive(Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number or messaging service id
    pub from_number: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl TwilioConfig {
    #[must_use]
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: SecretString::from(auth_token.into()),
            from_number: from_number.into(),
            api_url: DEFAULT_TWILIO_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the API base URL (builder pattern)
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load credentials from the environment.
    ///
    /// Returns `Ok(None)` when no Twilio variables are set (mock mode) and
    /// an error when only some of them are.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let read = |key: &str| env::var(key).ok().filter(|v| !v.is_empty());
        let account_sid = read("TWILIO_ACCOUNT_SID");
        let auth_token = read("TWILIO_AUTH_TOKEN");
        let from_number = read("TWILIO_FROM_NUMBER");

        let config = match (account_sid, auth_token, from_number) {
            (None, None, None) => return Ok(None),
            (Some(sid), Some(token), Some(from)) => Self::new(sid, token, from),
            (sid, token, _) => {
                let missing = if sid.is_none() {
                    "TWILIO_ACCOUNT_SID"
                } else if token.is_none() {
                    "TWILIO_AUTH_TOKEN"
                } else {
                    "TWILIO_FROM_NUMBER"
                };
                return Err(ConfigError::Missing(missing.to_string()));
            }
        };

        let config = match read("TWILIO_API_URL") {
            Some(url) => config.with_api_url(url),
            None => config,
        };
        Ok(Some(config))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.account_sid
        )
    }
}

/// Accepted message as returned by Twilio
#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// Error payload returned by Twilio on 4xx/5xx
#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// SMS gateway backed by Twilio, or a logging stub when unconfigured
#[derive(Debug)]
pub struct TwilioSmsGateway {
    http_client: Client,
    config: Option<TwilioConfig>,
}

impl TwilioSmsGateway {
    /// Create a gateway. `None` runs in mock mode and sends nothing.
    pub fn new(config: Option<TwilioConfig>) -> Result<Self, AppError> {
        let timeout = config
            .as_ref()
            .map_or(DEFAULT_REQUEST_TIMEOUT, |c| c.request_timeout);
        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalService(ExternalServiceError::Configuration(e.to_string()))
        })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Gateway that only logs
    pub fn mock() -> Result<Self, AppError> {
        Self::new(None)
    }

    /// Check if running in mock mode (no credentials configured)
    #[must_use]
    pub fn is_mock_mode(&self) -> bool {
        self.config.is_none()
    }

    async fn post_message(
        &self,
        config: &TwilioConfig,
        to: &str,
        body: &str,
    ) -> Result<MessageResponse, AppError> {
        let url = config.messages_url();
        debug!(url = %url, "Calling Twilio Messages API");

        let form = [
            ("To", to),
            ("From", config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&config.account_sid, Some(config.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Twilio API request failed");
                if e.is_timeout() {
                    AppError::ExternalService(ExternalServiceError::Timeout(e.to_string()))
                } else {
                    AppError::ExternalService(ExternalServiceError::Network(e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<TwilioErrorResponse>(&body) {
                Ok(err) => match err.code {
                    Some(code) => format!("{} (code {code})", err.message),
                    None => err.message,
                },
                Err(_) => body,
            };
            error!(status = %status, message = %message, "Twilio API returned error");
            return Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: status.as_u16(),
                message,
            }));
        }

        response.json::<MessageResponse>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Twilio response");
            AppError::ExternalService(ExternalServiceError::Unavailable(e.to_string()))
        })
    }
}

#[async_trait]
impl OtpDeliveryGateway for TwilioSmsGateway {
    #[instrument(skip(self, phone, message), fields(phone = %phone.masked()))]
    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), AppError> {
        let Some(config) = &self.config else {
            warn!("Running in mock SMS mode - no Twilio credentials configured");
            debug!(to = %phone, body = %message, "Mock SMS");
            return Ok(());
        };

        let accepted = self.post_message(config, phone.as_str(), message).await?;
        info!(
            sid = %accepted.sid,
            status = accepted.status.as_deref().unwrap_or("unknown"),
            "SMS accepted by Twilio"
        );
        Ok(())
    }
}
