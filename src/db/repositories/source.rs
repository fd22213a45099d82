//! Source repository
//!
//! Sources are looked up through their parent: the mnemonic is only unique
//! within one organization or user.

use crate::db::DynDatabasePool;
use crate::models::{
    extras_from_json, extras_to_json, BaseFields, ContainerDetails, ListParams, PublicAccess,
    ResourceRef, Source, SubResourceFields,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source repository trait
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn create(&self, source: &Source) -> Result<Source>;

    /// Get by ID, active or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Source>>;

    /// Get by mnemonic within a parent, active or not
    async fn get_by_parent_and_mnemonic(
        &self,
        parent: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<Source>>;

    /// Persist every mutable column
    async fn update(&self, source: &Source) -> Result<Source>;

    /// List the active sources of a parent ordered by mnemonic
    async fn list_by_parent(
        &self,
        parent: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<Source>, i64)>;
}

/// SQLx-based source repository implementation
pub struct SqlxSourceRepository {
    pool: DynDatabasePool,
}

impl SqlxSourceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SourceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: String,
    mnemonic: String,
    parent_type: String,
    parent_id: String,
    owner_id: String,
    name: String,
    full_name: Option<String>,
    source_type: Option<String>,
    public_access: String,
    default_locale: Option<String>,
    website: Option<String>,
    description: Option<String>,
    is_active: bool,
    extras: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SourceRow {
    fn into_source(self) -> Result<Source> {
        let parent = ResourceRef::from_columns(&self.parent_type, self.parent_id)
            .with_context(|| format!("Invalid parent for source {}", self.id))?;
        let public_access = self
            .public_access
            .parse::<PublicAccess>()
            .with_context(|| format!("Invalid public_access for source {}", self.id))?;
        let extras = extras_from_json(&self.extras)
            .with_context(|| format!("Invalid extras for source {}", self.id))?;

        Ok(Source {
            id: self.id,
            sub: SubResourceFields {
                mnemonic: self.mnemonic,
                owner_id: self.owner_id,
                parent,
            },
            details: ContainerDetails {
                name: self.name,
                full_name: self.full_name,
                public_access,
                default_locale: self.default_locale,
                website: self.website,
                description: self.description,
            },
            source_type: self.source_type,
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
impl SourceRepository for SqlxSourceRepository {
    async fn create(&self, source: &Source) -> Result<Source> {
        let extras = extras_to_json(&source.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO sources (id, mnemonic, parent_type, parent_id, owner_id, name, full_name,
                                     source_type, public_access, default_locale, website, description,
                                     is_active, extras, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&source.id)
            .bind(&source.sub.mnemonic)
            .bind(source.sub.parent.resource_type.as_str())
            .bind(&source.sub.parent.id)
            .bind(&source.sub.owner_id)
            .bind(&source.details.name)
            .bind(&source.details.full_name)
            .bind(&source.source_type)
            .bind(source.details.public_access.as_str())
            .bind(&source.details.default_locale)
            .bind(&source.details.website)
            .bind(&source.details.description)
            .bind(source.base.is_active)
            .bind(&extras)
            .bind(source.base.created_at)
            .bind(source.base.updated_at)
            .execute(pool)
            .await
            .context("Failed to create source")?;
        });

        Ok(source.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Source>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, SourceRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, source_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM sources
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get source by ID")?
        });

        row.map(SourceRow::into_source).transpose()
    }

    async fn get_by_parent_and_mnemonic(
        &self,
        parent: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<Source>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, SourceRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, source_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM sources
                WHERE parent_type = ? AND parent_id = ? AND mnemonic = ?
                "#,
            )
            .bind(parent.resource_type.as_str())
            .bind(&parent.id)
            .bind(mnemonic)
            .fetch_optional(pool)
            .await
            .context("Failed to get source by mnemonic")?
        });

        row.map(SourceRow::into_source).transpose()
    }

    async fn update(&self, source: &Source) -> Result<Source> {
        let extras = extras_to_json(&source.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE sources
                SET name = ?, full_name = ?, source_type = ?, public_access = ?, default_locale = ?,
                    website = ?, description = ?, is_active = ?, extras = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&source.details.name)
            .bind(&source.details.full_name)
            .bind(&source.source_type)
            .bind(source.details.public_access.as_str())
            .bind(&source.details.default_locale)
            .bind(&source.details.website)
            .bind(&source.details.description)
            .bind(source.base.is_active)
            .bind(&extras)
            .bind(source.base.updated_at)
            .bind(&source.id)
            .execute(pool)
            .await
            .context("Failed to update source")?;
        });

        Ok(source.clone())
    }

    async fn list_by_parent(
        &self,
        parent: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<Source>, i64)> {
        let (rows, total) = with_pool!(self.pool, |pool| {
            let rows = sqlx::query_as::<_, SourceRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, source_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM sources
                WHERE parent_type = ? AND parent_id = ? AND is_active = ?
                ORDER BY mnemonic
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(parent.resource_type.as_str())
            .bind(&parent.id)
            .bind(true)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
            .context("Failed to list sources")?;

            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sources WHERE parent_type = ? AND parent_id = ? AND is_active = ?",
            )
            .bind(parent.resource_type.as_str())
            .bind(&parent.id)
            .bind(true)
            .fetch_one(pool)
            .await
            .context("Failed to count sources")?;

            (rows, total)
        });

        let sources = rows
            .into_iter()
            .map(SourceRow::into_source)
            .collect::<Result<Vec<_>>>()?;
        Ok((sources, total))
    }
}
