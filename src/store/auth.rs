//! Access code and token storage.
//!
//! The access code is stored as `sha256(code + salt)`; tokens are random
//! hex strings with an expiry, checked lazily.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::error::GatewayError;

/// Reads and writes `verification_config` and `valid_tokens`.
#[derive(Clone)]
pub struct AuthStore {
    pool: SqlitePool,
    token_ttl: chrono::Duration,
}

impl AuthStore {
    /// Wrap an open pool; issued tokens live for `ttl_days`.
    #[must_use]
    pub fn new(pool: SqlitePool, ttl_days: i64) -> Self {
        Self { pool, token_ttl: chrono::Duration::days(ttl_days) }
    }

    /// Store `default_code` as the access code unless one is already stored.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup or insert fails.
    pub async fn ensure_code(&self, default_code: &str) -> Result<(), GatewayError> {
        let existing = sqlx::query("SELECT salt FROM verification_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let salt = random_hex::<16>();
        sqlx::query("INSERT OR REPLACE INTO verification_config (id, code_hash, salt) VALUES (1, ?, ?)")
            .bind(hash_code(default_code, &salt))
            .bind(salt)
            .execute(&self.pool)
            .await?;
        log::info!("initialized default access code");
        Ok(())
    }

    /// Whether `code` matches the stored access code.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn verify_code(&self, code: &str) -> Result<bool, GatewayError> {
        let Some(row) = sqlx::query("SELECT code_hash, salt FROM verification_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
        else {
            log::warn!("no access code configured");
            return Ok(false);
        };
        let stored: String = row.try_get("code_hash")?;
        let salt: String = row.try_get("salt")?;
        Ok(hash_code(code, &salt) == stored)
    }

    /// Create and persist a fresh token.
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails.
    pub async fn issue_token(&self) -> Result<String, GatewayError> {
        let token = random_hex::<32>();
        let now = chrono::Utc::now();
        sqlx::query("INSERT OR REPLACE INTO valid_tokens (token, created_at, expires_at) VALUES (?, ?, ?)")
            .bind(token.as_str())
            .bind(now.timestamp())
            .bind((now + self.token_ttl).timestamp())
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    /// Whether `token` exists and has not expired. Expired tokens are deleted.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup or delete fails.
    pub async fn check_token(&self, token: &str) -> Result<bool, GatewayError> {
        if token.is_empty() {
            return Ok(false);
        }
        let Some(row) = sqlx::query("SELECT expires_at FROM valid_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(false);
        };

        let expires_at: i64 = row.try_get("expires_at")?;
        if expires_at > chrono::Utc::now().timestamp() {
            return Ok(true);
        }
        sqlx::query("DELETE FROM valid_tokens WHERE token = ?").bind(token).execute(&self.pool).await?;
        log::debug!("removed expired token");
        Ok(false)
    }
}

fn hash_code(code: &str, salt: &str) -> String {
    hex::encode(Sha256::digest(format!("{code}{salt}").as_bytes()))
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
