//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::DynDatabasePool;
use crate::models::{extras_from_json, extras_to_json, BaseFields, ListParams, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID, active or not
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Get user by username, active or not
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Persist every mutable column of a user
    async fn update(&self, user: &User) -> Result<User>;

    /// Count active users
    async fn count(&self) -> Result<i64>;

    /// List active users with pagination
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct UserRow {
    id: String,
    username: String,
    email: String,
    name: String,
    company: Option<String>,
    location: Option<String>,
    password_hash: String,
    is_staff: bool,
    is_active: bool,
    extras: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(super) fn into_user(self) -> Result<User> {
        let extras = extras_from_json(&self.extras)
            .with_context(|| format!("Invalid extras for user {}", self.id))?;
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            name: self.name,
            company: self.company,
            location: self.location,
            password_hash: self.password_hash,
            is_staff: self.is_staff,
            base: BaseFields {
                created_at: self.created_at,
                updated_at: self.updated_at,
                is_active: self.is_active,
                extras,
            },
        })
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let extras = extras_to_json(&user.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO users (id, username, email, name, company, location, password_hash,
                                   is_staff, is_active, extras, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.company)
            .bind(&user.location)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .bind(user.base.is_active)
            .bind(&extras)
            .bind(user.base.created_at)
            .bind(user.base.updated_at)
            .execute(pool)
            .await
            .context("Failed to create user")?;
        });

        Ok(user.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, username, email, name, company, location, password_hash,
                       is_staff, is_active, extras, created_at, updated_at
                FROM users
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get user by ID")?
        });

        row.map(UserRow::into_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, username, email, name, company, location, password_hash,
                       is_staff, is_active, extras, created_at, updated_at
                FROM users
                WHERE username = ?
                "#,
            )
            .bind(username)
            .fetch_optional(pool)
            .await
            .context("Failed to get user by username")?
        });

        row.map(UserRow::into_user).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        let extras = extras_to_json(&user.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE users
                SET email = ?, name = ?, company = ?, location = ?, password_hash = ?,
                    is_staff = ?, is_active = ?, extras = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.company)
            .bind(&user.location)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .bind(user.base.is_active)
            .bind(&extras)
            .bind(user.base.updated_at)
            .bind(&user.id)
            .execute(pool)
            .await
            .context("Failed to update user")?;
        });

        Ok(user.clone())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = ?")
                .bind(true)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
        });
        Ok(count)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let rows = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, username, email, name, company, location, password_hash,
                       is_staff, is_active, extras, created_at, updated_at
                FROM users
                WHERE is_active = ?
                ORDER BY username
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(true)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
            .context("Failed to list users")?
        });

        let users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<Result<Vec<_>>>()?;
        let total = self.count().await?;
        Ok((users, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::Record;

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn create_test_user(username: &str) -> User {
        User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "Test User".to_string(),
            "not-a-real-hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let mut user = create_test_user("jdoe");
        user.company = Some("OCL".to_string());
        user.base.extras.insert("team".into(), serde_json::json!("core"));

        repo.create(&user).await.expect("Failed to create user");

        let found = repo
            .get_by_id(&user.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(found.username, "jdoe");
        assert_eq!(found.company.as_deref(), Some("OCL"));
        assert_eq!(found.base.extras.get("team"), Some(&serde_json::json!("core")));
        assert!(found.is_active());

        let by_name = repo
            .get_by_username("jdoe")
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(by_name.id, user.id);
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id("missing").await.expect("Query failed").is_none());
        assert!(repo
            .get_by_username("missing")
            .await
            .expect("Query failed")
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create(&create_test_user("jdoe"))
            .await
            .expect("Failed to create user");

        let err = repo.create(&create_test_user("jdoe")).await.unwrap_err();
        assert!(crate::db::repositories::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_soft_deleted_users_leave_listing() {
        let repo = setup_test_repo().await;
        let mut alice = create_test_user("alice");
        repo.create(&alice).await.expect("Failed to create user");
        repo.create(&create_test_user("bob"))
            .await
            .expect("Failed to create user");

        alice.soft_delete();
        repo.update(&alice).await.expect("Failed to update user");

        let (users, total) = repo
            .list(&ListParams::new(1, 10))
            .await
            .expect("Failed to list users");
        assert_eq!(total, 1);
        assert_eq!(users[0].username, "bob");

        let stored = repo
            .get_by_id(&alice.id)
            .await
            .expect("Failed to get user")
            .expect("Soft-deleted row should still exist");
        assert!(!stored.is_active());
    }
}
