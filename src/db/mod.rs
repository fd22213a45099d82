//! Database layer
//!
//! Storage for the registry, on either of two backends:
//! - SQLite (default, single file or in-memory)
//! - MySQL
//!
//! The driver comes from `DatabaseConfig::driver`. Everything above this
//! layer talks to the `DatabasePool` trait and the repository traits, never
//! to a concrete backend.
//!
//! # Usage
//!
//! ```ignore
//! use oclapi::config::DatabaseConfig;
//! use oclapi::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
