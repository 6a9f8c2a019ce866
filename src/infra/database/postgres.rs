//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    AppError, AuditFields, DatabaseError, NewUser, OtpChallenge, OtpStore, User, UserStore,
};

const USER_COLUMNS: &str = "id, phone_number, first_name, last_name, email, \
     is_profile_completed, created_at, created_by, modified_at, modified_by";

const CHALLENGE_COLUMNS: &str =
    "id, phone_number, code_hash, created_at, expires_at, attempts_remaining, consumed";

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL client backing both the user and challenge stores
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("id"),
            phone_number: row.get("phone_number"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            is_profile_completed: row.get("is_profile_completed"),
            audit: AuditFields {
                created_at: row.get("created_at"),
                created_by: row.get("created_by"),
                modified_at: row.get("modified_at"),
                modified_by: row.get("modified_by"),
            },
        }
    }

    fn row_to_challenge(row: &sqlx::postgres::PgRow) -> OtpChallenge {
        OtpChallenge {
            id: row.get("id"),
            phone_number: row.get("phone_number"),
            code_hash: row.get("code_hash"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            attempts_remaining: row.get("attempts_remaining"),
            consumed: row.get("consumed"),
        }
    }
}

#[async_trait]
impl OtpStore for PostgresClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.ping().await
    }

    #[instrument(skip(self, challenge), fields(challenge_id = %challenge.id))]
    async fn replace_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (
                phone_number, id, code_hash, created_at, expires_at,
                attempts_remaining, consumed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (phone_number) DO UPDATE
            SET id = EXCLUDED.id,
                code_hash = EXCLUDED.code_hash,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                attempts_remaining = EXCLUDED.attempts_remaining,
                consumed = EXCLUDED.consumed
            "#,
        )
        .bind(&challenge.phone_number)
        .bind(challenge.id)
        .bind(&challenge.code_hash)
        .bind(challenge.created_at)
        .bind(challenge.expires_at)
        .bind(challenge.attempts_remaining)
        .bind(challenge.consumed)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;
        Ok(())
    }

    #[instrument(skip(self, phone))]
    async fn get_live_challenge(&self, phone: &str) -> Result<Option<OtpChallenge>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM otp_challenges \
             WHERE phone_number = $1 AND consumed = FALSE"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(row.as_ref().map(Self::row_to_challenge))
    }

    #[instrument(skip(self, phone))]
    async fn record_failed_attempt(
        &self,
        phone: &str,
        challenge_id: Uuid,
    ) -> Result<Option<i32>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE otp_challenges
            SET attempts_remaining = attempts_remaining - 1
            WHERE phone_number = $1 AND id = $2
              AND consumed = FALSE AND attempts_remaining > 0
            RETURNING attempts_remaining
            "#,
        )
        .bind(phone)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(row.map(|r| r.get("attempts_remaining")))
    }

    #[instrument(skip(self, phone))]
    async fn consume_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE otp_challenges
            SET consumed = TRUE
            WHERE phone_number = $1 AND id = $2
              AND consumed = FALSE AND attempts_remaining > 0
            "#,
        )
        .bind(phone)
        .bind(challenge_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, phone))]
    async fn remove_challenge(&self, phone: &str, challenge_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM otp_challenges WHERE phone_number = $1 AND id = $2")
            .bind(phone)
            .bind(challenge_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM otp_challenges WHERE consumed = TRUE OR expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        self.ping().await
    }

    #[instrument(skip(self, phone))]
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert_user(&self, user: &NewUser) -> Result<User, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (id, phone_number, is_profile_completed, created_at, created_by) \
             VALUES ($1, $2, FALSE, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.phone_number)
        .bind(user.created_at)
        .bind(&user.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(Self::row_to_user(&row))
    }

    #[instrument(skip(self, first_name, last_name, email))]
    async fn complete_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        modified_at: DateTime<Utc>,
        modified_by: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE users \
             SET first_name = $2, last_name = $3, email = $4, \
                 is_profile_completed = TRUE, modified_at = $5, modified_by = $6 \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(modified_at)
        .bind(modified_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(row.as_ref().map(Self::row_to_user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.max_lifetime, Duration::from_secs(1800));
    }

    #[test]
    fn test_column_lists_match_row_mappers() {
        for column in [
            "phone_number",
            "is_profile_completed",
            "created_by",
            "modified_by",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing {column}");
        }
        for column in ["code_hash", "expires_at", "attempts_remaining", "consumed"] {
            assert!(CHALLENGE_COLUMNS.contains(column), "missing {column}");
        }
    }
}
