//! Auth token repository
//!
//! Each user owns at most one token; the `user_id` column is unique.

use crate::db::DynDatabasePool;
use crate::models::AuthToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Auth token repository trait
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    /// Store a new token
    async fn create(&self, token: &AuthToken) -> Result<AuthToken>;

    /// Look a token up by its key
    async fn get_by_key(&self, key: &str) -> Result<Option<AuthToken>>;

    /// The token belonging to a user
    async fn get_by_user(&self, user_id: &str) -> Result<Option<AuthToken>>;
}

/// SQLx-based auth token repository implementation
pub struct SqlxAuthTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthTokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct AuthTokenRow {
    token_key: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

impl From<AuthTokenRow> for AuthToken {
    fn from(row: AuthTokenRow) -> Self {
        Self {
            key: row.token_key,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuthTokenRepository for SqlxAuthTokenRepository {
    async fn create(&self, token: &AuthToken) -> Result<AuthToken> {
        with_pool!(self.pool, |pool| {
            sqlx::query("INSERT INTO auth_tokens (token_key, user_id, created_at) VALUES (?, ?, ?)")
                .bind(&token.key)
                .bind(&token.user_id)
                .bind(token.created_at)
                .execute(pool)
                .await
                .context("Failed to create auth token")?;
        });

        Ok(token.clone())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<AuthToken>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, AuthTokenRow>(
                "SELECT token_key, user_id, created_at FROM auth_tokens WHERE token_key = ?",
            )
            .bind(key)
            .fetch_optional(pool)
            .await
            .context("Failed to get auth token")?
        });

        Ok(row.map(AuthToken::from))
    }

    async fn get_by_user(&self, user_id: &str) -> Result<Option<AuthToken>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, AuthTokenRow>(
                "SELECT token_key, user_id, created_at FROM auth_tokens WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get auth token for user")?
        });

        Ok(row.map(AuthToken::from))
    }
}
