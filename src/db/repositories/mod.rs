//! Database repositories
//!
//! One repository per entity: a trait describing the data access the
//! services need, and an `Sqlx*Repository` implementing it for SQLite and
//! MySQL.
//!
//! Both backends accept `?` placeholders and the row structs derive
//! `sqlx::FromRow` generically, so each query is written once and
//! [`with_pool!`] runs it against whichever pool is configured.

/// Evaluate `$body` with `$pool` bound to the concrete pool of the
/// configured driver.
macro_rules! with_pool {
    ($db:expr, |$pool:ident| $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db.sqlite()?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db.mysql()?;
                $body
            }
        }
    };
}

pub mod auth_token;
pub mod collection;
pub mod organization;
pub mod source;
pub mod user;
pub mod version;

pub use auth_token::{AuthTokenRepository, SqlxAuthTokenRepository};
pub use collection::{CollectionRepository, SqlxCollectionRepository};
pub use organization::{OrganizationRepository, SqlxOrganizationRepository};
pub use source::{SourceRepository, SqlxSourceRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use version::{SqlxVersionRepository, VersionRepository};

/// Whether an error (anywhere in its chain) is a unique-constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, DatabasePool};
    use anyhow::Context;

    #[tokio::test]
    async fn test_is_unique_violation_detects_constraint() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        pool.execute("CREATE TABLE probe (name TEXT NOT NULL UNIQUE)")
            .await
            .expect("Failed to create table");
        let sqlite = pool.sqlite().expect("SQLite pool");

        sqlx::query("INSERT INTO probe (name) VALUES ('a')")
            .execute(sqlite)
            .await
            .expect("Failed to insert");
        let err = sqlx::query("INSERT INTO probe (name) VALUES ('a')")
            .execute(sqlite)
            .await
            .context("Failed to insert duplicate")
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow::anyhow!("something else")));
    }
}
