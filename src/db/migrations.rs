//! Database migrations
//!
//! Migrations are embedded as SQL strings, one variant per backend, and
//! tracked in the `_migrations` table so each one is applied exactly once.
//!
//! ```ignore
//! use oclapi::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All schema migrations, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                username VARCHAR(255) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL DEFAULT '',
                company VARCHAR(255),
                location VARCHAR(255),
                password_hash VARCHAR(255) NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                extras TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                username VARCHAR(255) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL DEFAULT '',
                company VARCHAR(255),
                location VARCHAR(255),
                password_hash VARCHAR(255) NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                extras TEXT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_auth_tokens",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS auth_tokens (
                token_key VARCHAR(40) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS auth_tokens (
                token_key VARCHAR(40) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL UNIQUE,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_organizations",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                company VARCHAR(255),
                website VARCHAR(255),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                extras TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS organization_members (
                organization_id VARCHAR(36) NOT NULL,
                user_id VARCHAR(36) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (organization_id, user_id),
                FOREIGN KEY (organization_id) REFERENCES organizations(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_organization_members_user ON organization_members(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                company VARCHAR(255),
                website VARCHAR(255),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                extras TEXT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            );
            CREATE TABLE IF NOT EXISTS organization_members (
                organization_id VARCHAR(36) NOT NULL,
                user_id VARCHAR(36) NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                PRIMARY KEY (organization_id, user_id),
                FOREIGN KEY (organization_id) REFERENCES organizations(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_organization_members_user ON organization_members(user_id);
        "#,
    },
    // parent_id has no foreign key: it points at either organizations or users.
    Migration {
        version: 4,
        name: "create_sources",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sources (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                parent_type VARCHAR(32) NOT NULL,
                parent_id VARCHAR(36) NOT NULL,
                owner_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                full_name VARCHAR(255),
                source_type VARCHAR(64),
                public_access VARCHAR(16) NOT NULL DEFAULT 'View',
                default_locale VARCHAR(20),
                website VARCHAR(255),
                description TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                extras TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (parent_id, mnemonic),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sources (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                parent_type VARCHAR(32) NOT NULL,
                parent_id VARCHAR(36) NOT NULL,
                owner_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                full_name VARCHAR(255),
                source_type VARCHAR(64),
                public_access VARCHAR(16) NOT NULL DEFAULT 'View',
                default_locale VARCHAR(20),
                website VARCHAR(255),
                description TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                extras TEXT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                UNIQUE (parent_id, mnemonic),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_collections",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                parent_type VARCHAR(32) NOT NULL,
                parent_id VARCHAR(36) NOT NULL,
                owner_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                full_name VARCHAR(255),
                collection_type VARCHAR(64),
                public_access VARCHAR(16) NOT NULL DEFAULT 'View',
                default_locale VARCHAR(20),
                website VARCHAR(255),
                description TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                extras TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (parent_id, mnemonic),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                parent_type VARCHAR(32) NOT NULL,
                parent_id VARCHAR(36) NOT NULL,
                owner_id VARCHAR(36) NOT NULL,
                name VARCHAR(255) NOT NULL,
                full_name VARCHAR(255),
                collection_type VARCHAR(64),
                public_access VARCHAR(16) NOT NULL DEFAULT 'View',
                default_locale VARCHAR(20),
                website VARCHAR(255),
                description TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                extras TEXT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                UNIQUE (parent_id, mnemonic),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );
        "#,
    },
    // The self-parent rule is enforced in application code, not here.
    Migration {
        version: 6,
        name: "create_resource_versions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS resource_versions (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                versioned_object_type VARCHAR(32) NOT NULL,
                versioned_object_id VARCHAR(36) NOT NULL,
                released BOOLEAN NOT NULL DEFAULT 0,
                description TEXT,
                previous_version_id VARCHAR(36),
                parent_version_id VARCHAR(36),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                extras TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (versioned_object_id, mnemonic),
                FOREIGN KEY (previous_version_id) REFERENCES resource_versions(id) ON DELETE SET NULL,
                FOREIGN KEY (parent_version_id) REFERENCES resource_versions(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_resource_versions_latest
                ON resource_versions(versioned_object_id, is_active, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS resource_versions (
                id VARCHAR(36) PRIMARY KEY,
                mnemonic VARCHAR(255) NOT NULL,
                versioned_object_type VARCHAR(32) NOT NULL,
                versioned_object_id VARCHAR(36) NOT NULL,
                released BOOLEAN NOT NULL DEFAULT FALSE,
                description TEXT,
                previous_version_id VARCHAR(36),
                parent_version_id VARCHAR(36),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                extras TEXT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                UNIQUE (versioned_object_id, mnemonic),
                FOREIGN KEY (previous_version_id) REFERENCES resource_versions(id) ON DELETE SET NULL,
                FOREIGN KEY (parent_version_id) REFERENCES resource_versions(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_resource_versions_latest
                ON resource_versions(versioned_object_id, is_active, created_at);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied_versions.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.name
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    rows.iter()
        .map(|row| {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    rows.iter()
        .map(|row| {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

// MySQL DDL commits implicitly, so no transaction here.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
