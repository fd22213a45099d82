//! Resource version repository
//!
//! Versions are keyed by their versioned object. "Latest" is the active
//! version with the greatest `created_at`.

use crate::db::DynDatabasePool;
use crate::models::{
    extras_from_json, extras_to_json, BaseFields, ListParams, ResourceRef, ResourceVersion,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Version repository trait
#[async_trait]
pub trait VersionRepository: Send + Sync {
    async fn create(&self, version: &ResourceVersion) -> Result<ResourceVersion>;

    /// Get by ID, active or not
    async fn get_by_id(&self, id: &str) -> Result<Option<ResourceVersion>>;

    /// Get by mnemonic within a versioned object, active or not
    async fn get_by_object_and_mnemonic(
        &self,
        object: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<ResourceVersion>>;

    /// Persist every mutable column
    async fn update(&self, version: &ResourceVersion) -> Result<ResourceVersion>;

    /// Active versions of an object, newest first
    async fn list_by_object(
        &self,
        object: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<ResourceVersion>, i64)>;

    /// The newest active version of an object
    async fn get_latest_active(&self, object: &ResourceRef) -> Result<Option<ResourceVersion>>;
}

/// SQLx-based version repository implementation
pub struct SqlxVersionRepository {
    pool: DynDatabasePool,
}

impl SqlxVersionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VersionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: String,
    mnemonic: String,
    versioned_object_type: String,
    versioned_object_id: String,
    released: bool,
    description: Option<String>,
    previous_version_id: Option<String>,
    parent_version_id: Option<String>,
    is_active: bool,
    extras: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VersionRow {
    fn into_version(self) -> Result<ResourceVersion> {
        let versioned_object =
            ResourceRef::from_columns(&self.versioned_object_type, self.versioned_object_id)
                .with_context(|| format!("Invalid versioned object for version {}", self.id))?;
        let extras = extras_from_json(&self.extras)
            .with_context(|| format!("Invalid extras for version {}", self.id))?;

        Ok(ResourceVersion {
            id: self.id,
            mnemonic: self.mnemonic,
            versioned_object,
            released: self.released,
            description: self.description,
            previous_version_id: self.previous_version_id,
            parent_version_id: self.parent_version_id,
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
impl VersionRepository for SqlxVersionRepository {
    async fn create(&self, version: &ResourceVersion) -> Result<ResourceVersion> {
        let extras = extras_to_json(&version.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO resource_versions (id, mnemonic, versioned_object_type, versioned_object_id,
                                               released, description, previous_version_id,
                                               parent_version_id, is_active, extras, created_at,
                                               updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&version.id)
            .bind(&version.mnemonic)
            .bind(version.versioned_object.resource_type.as_str())
            .bind(&version.versioned_object.id)
            .bind(version.released)
            .bind(&version.description)
            .bind(&version.previous_version_id)
            .bind(&version.parent_version_id)
            .bind(version.base.is_active)
            .bind(&extras)
            .bind(version.base.created_at)
            .bind(version.base.updated_at)
            .execute(pool)
            .await
            .context("Failed to create version")?;
        });

        Ok(version.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ResourceVersion>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, VersionRow>(
                r#"
                SELECT id, mnemonic, versioned_object_type, versioned_object_id, released, description,
                       previous_version_id, parent_version_id, is_active, extras, created_at, updated_at
                FROM resource_versions
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get version by ID")?
        });

        row.map(VersionRow::into_version).transpose()
    }

    async fn get_by_object_and_mnemonic(
        &self,
        object: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<ResourceVersion>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, VersionRow>(
                r#"
                SELECT id, mnemonic, versioned_object_type, versioned_object_id, released, description,
                       previous_version_id, parent_version_id, is_active, extras, created_at, updated_at
                FROM resource_versions
                WHERE versioned_object_type = ? AND versioned_object_id = ? AND mnemonic = ?
                "#,
            )
            .bind(object.resource_type.as_str())
            .bind(&object.id)
            .bind(mnemonic)
            .fetch_optional(pool)
            .await
            .context("Failed to get version by mnemonic")?
        });

        row.map(VersionRow::into_version).transpose()
    }

    async fn update(&self, version: &ResourceVersion) -> Result<ResourceVersion> {
        let extras = extras_to_json(&version.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE resource_versions
                SET released = ?, description = ?, previous_version_id = ?, parent_version_id = ?,
                    is_active = ?, extras = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(version.released)
            .bind(&version.description)
            .bind(&version.previous_version_id)
            .bind(&version.parent_version_id)
            .bind(version.base.is_active)
            .bind(&extras)
            .bind(version.base.updated_at)
            .bind(&version.id)
            .execute(pool)
            .await
            .context("Failed to update version")?;
        });

        Ok(version.clone())
    }

    async fn list_by_object(
        &self,
        object: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<ResourceVersion>, i64)> {
        let (rows, total) = with_pool!(self.pool, |pool| {
            let rows = sqlx::query_as::<_, VersionRow>(
                r#"
                SELECT id, mnemonic, versioned_object_type, versioned_object_id, released, description,
                       previous_version_id, parent_version_id, is_active, extras, created_at, updated_at
                FROM resource_versions
                WHERE versioned_object_type = ? AND versioned_object_id = ? AND is_active = ?
                ORDER BY created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(object.resource_type.as_str())
            .bind(&object.id)
            .bind(true)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
            .context("Failed to list versions")?;

            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM resource_versions
                WHERE versioned_object_type = ? AND versioned_object_id = ? AND is_active = ?
                "#,
            )
            .bind(object.resource_type.as_str())
            .bind(&object.id)
            .bind(true)
            .fetch_one(pool)
            .await
            .context("Failed to count versions")?;

            (rows, total)
        });

        let versions = rows
            .into_iter()
            .map(VersionRow::into_version)
            .collect::<Result<Vec<_>>>()?;
        Ok((versions, total))
    }

    async fn get_latest_active(&self, object: &ResourceRef) -> Result<Option<ResourceVersion>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, VersionRow>(
                r#"
                SELECT id, mnemonic, versioned_object_type, versioned_object_id, released, description,
                       previous_version_id, parent_version_id, is_active, extras, created_at, updated_at
                FROM resource_versions
                WHERE versioned_object_type = ? AND versioned_object_id = ? AND is_active = ?
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(object.resource_type.as_str())
            .bind(&object.id)
            .bind(true)
            .fetch_optional(pool)
            .await
            .context("Failed to get latest version")?
        });

        row.map(VersionRow::into_version).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::is_unique_violation;
    use crate::db::{create_test_pool, migrations};
    use crate::models::Record;
    use chrono::TimeZone;

    async fn setup_test_repo() -> SqlxVersionRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxVersionRepository::new(pool)
    }

    fn version_at(mnemonic: &str, object: &ResourceRef, hour: u32) -> ResourceVersion {
        let mut version = ResourceVersion::new(mnemonic.to_string(), object.clone());
        version.base = BaseFields::at(
            Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0)
                .single()
                .expect("valid timestamp"),
        );
        version
    }

    #[tokio::test]
    async fn test_latest_is_newest_created() {
        let repo = setup_test_repo().await;
        let object = ResourceRef::source("source-1");

        for (mnemonic, hour) in [("v2", 2), ("v3", 3), ("v1", 1)] {
            repo.create(&version_at(mnemonic, &object, hour))
                .await
                .expect("Failed to create version");
        }

        let latest = repo
            .get_latest_active(&object)
            .await
            .expect("Failed to get latest")
            .expect("Expected a latest version");
        assert_eq!(latest.mnemonic, "v3");
    }

    #[tokio::test]
    async fn test_latest_none_without_versions() {
        let repo = setup_test_repo().await;
        let latest = repo
            .get_latest_active(&ResourceRef::source("empty"))
            .await
            .expect("Failed to get latest");
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn test_latest_skips_inactive_newest() {
        let repo = setup_test_repo().await;
        let object = ResourceRef::source("source-1");
        repo.create(&version_at("v1", &object, 1))
            .await
            .expect("Failed to create version");
        let mut newest = version_at("v2", &object, 2);
        newest.soft_delete();
        repo.create(&newest).await.expect("Failed to create version");

        let latest = repo
            .get_latest_active(&object)
            .await
            .expect("Failed to get latest")
            .expect("Expected a latest version");
        assert_eq!(latest.mnemonic, "v1");
    }

    #[tokio::test]
    async fn test_latest_scoped_to_object() {
        let repo = setup_test_repo().await;
        let first = ResourceRef::source("source-1");
        let second = ResourceRef::collection("collection-1");
        repo.create(&version_at("v1", &first, 1))
            .await
            .expect("Failed to create version");
        repo.create(&version_at("v9", &second, 9))
            .await
            .expect("Failed to create version");

        let latest = repo
            .get_latest_active(&first)
            .await
            .expect("Failed to get latest")
            .expect("Expected a latest version");
        assert_eq!(latest.mnemonic, "v1");
    }

    #[tokio::test]
    async fn test_lineage_roundtrip_and_mnemonic_scope() {
        let repo = setup_test_repo().await;
        let object = ResourceRef::source("source-1");
        let base = version_at("v1", &object, 1);
        repo.create(&base).await.expect("Failed to create version");

        let mut next = version_at("v2", &object, 2);
        next.previous_version_id = Some(base.id.clone());
        next.parent_version_id = Some(base.id.clone());
        next.released = true;
        repo.create(&next).await.expect("Failed to create version");

        let stored = repo
            .get_by_object_and_mnemonic(&object, "v2")
            .await
            .expect("Failed to get version")
            .expect("Version not found");
        assert_eq!(stored.previous_version_id.as_deref(), Some(base.id.as_str()));
        assert_eq!(stored.parent_version_id.as_deref(), Some(base.id.as_str()));
        assert!(stored.released);

        let duplicate = version_at("v1", &object, 5);
        assert!(is_unique_violation(&repo.create(&duplicate).await.unwrap_err()));
        repo.create(&version_at("v1", &ResourceRef::source("source-2"), 5))
            .await
            .expect("Same mnemonic on another object is allowed");

        let (versions, total) = repo
            .list_by_object(&object, &ListParams::default())
            .await
            .expect("Failed to list versions");
        assert_eq!(total, 2);
        assert_eq!(versions[0].mnemonic, "v2");
    }
}
