//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    AppError, Clock, CodeGenerator, DatabaseError, ExternalServiceError, NewUser, OtpChallenge,
    OtpDeliveryGateway, OtpStore, PhoneNumber, User, UserStore,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

/// In-memory store implementing both [`OtpStore`] and [`UserStore`].
///
/// Each map sits behind one mutex, so every trait method is atomic the same
/// way the single-statement SQL is.
pub struct MockDatabaseClient {
    challenges: Arc<Mutex<HashMap<String, OtpChallenge>>>,
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            challenges: Arc::new(Mutex::new(HashMap::new())),
            users: Arc::new(Mutex::new(HashMap::new())),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Number of stored challenges, consumed ones included
    pub fn challenge_count(&self) -> usize {
        self.challenges.lock().unwrap().len()
    }

    /// Stored challenge for a normalized phone number
    pub fn get_challenge(&self, phone: &str) -> Option<OtpChallenge> {
        self.challenges.lock().unwrap().get(phone).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    /// Seed a user directly (for testing)
    pub fn insert_existing_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }

    fn check_health(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OtpStore for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.check_health()
    }

    async fn replace_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.challenges
            .lock()
            .unwrap()
            .insert(challenge.phone_number.clone(), challenge.clone());
        Ok(())
    }

    async fn get_live_challenge(&self, phone: &str) -> Result<Option<OtpChallenge>, AppError> {
        self.check_should_fail()?;
        let challenges = self.challenges.lock().unwrap();
        Ok(challenges.get(phone).filter(|c| !c.consumed).cloned())
    }

    async fn record_failed_attempt(
        &self,
        phone: &str,
        challenge_id: Uuid,
    ) -> Result<Option<i32>, AppError> {
        self.check_should_fail()?;
        let mut challenges = self.challenges.lock().unwrap();
        match challenges.get_mut(phone) {
            Some(c) if c.id == challenge_id && !c.consumed && c.attempts_remaining > 0 => {
                c.attempts_remaining -= 1;
                Ok(Some(c.attempts_remaining))
            }
            _ => Ok(None),
        }
    }

    async fn consume_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut challenges = self.challenges.lock().unwrap();
        match challenges.get_mut(phone) {
            Some(c) if c.id == challenge_id && !c.consumed && c.attempts_remaining > 0 => {
                c.consumed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut challenges = self.challenges.lock().unwrap();
        if challenges.get(phone).is_some_and(|c| c.id == challenge_id) {
            challenges.remove(phone);
            return Ok(true);
        }
        Ok(false)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let mut challenges = self.challenges.lock().unwrap();
        let before = challenges.len();
        challenges.retain(|_, c| !c.consumed && c.expires_at >= now);
        Ok((before - challenges.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.check_health()
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        self.check_should_fail()?;
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.phone_number == phone).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.check_should_fail()?;
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, AppError> {
        self.check_should_fail()?;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.phone_number == user.phone_number) {
            return Err(AppError::Database(DatabaseError::Duplicate(
                "users_phone_number_key".to_string(),
            )));
        }
        let created = user.clone().into_user();
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn complete_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        modified_at: DateTime<Utc>,
        modified_by: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        self.check_should_fail()?;
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.first_name = Some(first_name.to_string());
        user.last_name = Some(last_name.to_string());
        user.email = email.map(str::to_string);
        user.is_profile_completed = true;
        user.audit.modified_at = Some(modified_at);
        user.audit.modified_by = modified_by.map(str::to_string);
        Ok(Some(user.clone()))
    }
}

/// Recording SMS gateway
pub struct MockSmsGateway {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    config: MockConfig,
    delay: Option<Duration>,
    is_healthy: AtomicBool,
}

impl MockSmsGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            config,
            delay: None,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Sleep before every send
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// `(to, body)` pairs in send order
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Trailing token of the latest message sent to `phone`
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == phone)
            .and_then(|(_, body)| body.split_whitespace().last().map(str::to_string))
    }
}

impl Default for MockSmsGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OtpDeliveryGateway for MockSmsGateway {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                "Unhealthy".to_string(),
            )));
        }
        Ok(())
    }

    async fn send(&self, phone: &PhoneNumber, message: &str) -> Result<(), AppError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                self.config.message(),
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone.as_str().to_string(), message.to_string()));
        Ok(())
    }
}

/// Manually driven clock
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Hands out a scripted sequence of codes, repeating the last one
pub struct FixedCodeGenerator {
    codes: Vec<String>,
    next: AtomicUsize,
}

impl FixedCodeGenerator {
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self, length: usize, charset: &[char]) -> String {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        match self.codes.get(idx).or_else(|| self.codes.last()) {
            Some(code) => code.clone(),
            None => charset.first().map_or_else(String::new, |c| c.to_string().repeat(length)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_rejects_duplicate_phone() {
        let db = MockDatabaseClient::new();
        let phone = PhoneNumber::parse("+1", "5550100", &["1"]).unwrap();

        db.insert_user(&NewUser::for_phone(&phone, Utc::now(), None))
            .await
            .unwrap();
        let err = db
            .insert_user(&NewUser::for_phone(&phone, Utc::now(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Duplicate(_))));
        assert_eq!(db.user_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_conditional_updates_check_id() {
        let db = MockDatabaseClient::new();
        let phone = PhoneNumber::parse("+1", "5550100", &["1"]).unwrap();
        let challenge =
            OtpChallenge::issue(&phone, "123456", Utc::now(), chrono::Duration::minutes(5), 1);
        db.replace_challenge(&challenge).await.unwrap();

        let stale = Uuid::new_v4();
        assert_eq!(db.record_failed_attempt(phone.as_str(), stale).await.unwrap(), None);
        assert!(!db.consume_challenge(phone.as_str(), stale).await.unwrap());
        assert!(!db.remove_challenge(phone.as_str(), stale).await.unwrap());

        assert_eq!(
            db.record_failed_attempt(phone.as_str(), challenge.id).await.unwrap(),
            Some(0)
        );
        // Exhausted challenges can be neither decremented nor consumed
        assert_eq!(
            db.record_failed_attempt(phone.as_str(), challenge.id).await.unwrap(),
            None
        );
        assert!(!db.consume_challenge(phone.as_str(), challenge.id).await.unwrap());
    }

    #[test]
    fn test_fixed_code_generator_repeats_last() {
        let codes = FixedCodeGenerator::new(["111111", "222222"]);
        let digits: Vec<char> = "0123456789".chars().collect();
        assert_eq!(codes.generate(6, &digits), "111111");
        assert_eq!(codes.generate(6, &digits), "222222");
        assert_eq!(codes.generate(6, &digits), "222222");

        let empty = FixedCodeGenerator::new(Vec::<String>::new());
        assert_eq!(empty.generate(4, &digits), "0000");
    }

    #[test]
    fn test_mock_clock_advances() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
    }
}
