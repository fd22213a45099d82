//! Collection repository
//!
//! Collections are scoped to their parent exactly like sources.

use crate::db::DynDatabasePool;
use crate::models::{
    extras_from_json, extras_to_json, BaseFields, Collection, ContainerDetails, ListParams,
    PublicAccess, ResourceRef, SubResourceFields,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Collection repository trait
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn create(&self, collection: &Collection) -> Result<Collection>;

    /// Get by ID, active or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Collection>>;

    /// Get by mnemonic within a parent, active or not
    async fn get_by_parent_and_mnemonic(
        &self,
        parent: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<Collection>>;

    /// Persist every mutable column
    async fn update(&self, collection: &Collection) -> Result<Collection>;

    /// List the active collections of a parent ordered by mnemonic
    async fn list_by_parent(
        &self,
        parent: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<Collection>, i64)>;
}

/// SQLx-based collection repository implementation
pub struct SqlxCollectionRepository {
    pool: DynDatabasePool,
}

impl SqlxCollectionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CollectionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: String,
    mnemonic: String,
    parent_type: String,
    parent_id: String,
    owner_id: String,
    name: String,
    full_name: Option<String>,
    collection_type: Option<String>,
    public_access: String,
    default_locale: Option<String>,
    website: Option<String>,
    description: Option<String>,
    is_active: bool,
    extras: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CollectionRow {
    fn into_collection(self) -> Result<Collection> {
        let parent = ResourceRef::from_columns(&self.parent_type, self.parent_id)
            .with_context(|| format!("Invalid parent for collection {}", self.id))?;
        let public_access = self
            .public_access
            .parse::<PublicAccess>()
            .with_context(|| format!("Invalid public_access for collection {}", self.id))?;
        let extras = extras_from_json(&self.extras)
            .with_context(|| format!("Invalid extras for collection {}", self.id))?;

        Ok(Collection {
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
            collection_type: self.collection_type,
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
impl CollectionRepository for SqlxCollectionRepository {
    async fn create(&self, collection: &Collection) -> Result<Collection> {
        let extras = extras_to_json(&collection.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO collections (id, mnemonic, parent_type, parent_id, owner_id, name,
                                         full_name, collection_type, public_access, default_locale,
                                         website, description, is_active, extras, created_at,
                                         updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&collection.id)
            .bind(&collection.sub.mnemonic)
            .bind(collection.sub.parent.resource_type.as_str())
            .bind(&collection.sub.parent.id)
            .bind(&collection.sub.owner_id)
            .bind(&collection.details.name)
            .bind(&collection.details.full_name)
            .bind(&collection.collection_type)
            .bind(collection.details.public_access.as_str())
            .bind(&collection.details.default_locale)
            .bind(&collection.details.website)
            .bind(&collection.details.description)
            .bind(collection.base.is_active)
            .bind(&extras)
            .bind(collection.base.created_at)
            .bind(collection.base.updated_at)
            .execute(pool)
            .await
            .context("Failed to create collection")?;
        });

        Ok(collection.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Collection>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, CollectionRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, collection_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM collections
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get collection by ID")?
        });

        row.map(CollectionRow::into_collection).transpose()
    }

    async fn get_by_parent_and_mnemonic(
        &self,
        parent: &ResourceRef,
        mnemonic: &str,
    ) -> Result<Option<Collection>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, CollectionRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, collection_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM collections
                WHERE parent_type = ? AND parent_id = ? AND mnemonic = ?
                "#,
            )
            .bind(parent.resource_type.as_str())
            .bind(&parent.id)
            .bind(mnemonic)
            .fetch_optional(pool)
            .await
            .context("Failed to get collection by mnemonic")?
        });

        row.map(CollectionRow::into_collection).transpose()
    }

    async fn update(&self, collection: &Collection) -> Result<Collection> {
        let extras = extras_to_json(&collection.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE collections
                SET name = ?, full_name = ?, collection_type = ?, public_access = ?, default_locale = ?,
                    website = ?, description = ?, is_active = ?, extras = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&collection.details.name)
            .bind(&collection.details.full_name)
            .bind(&collection.collection_type)
            .bind(collection.details.public_access.as_str())
            .bind(&collection.details.default_locale)
            .bind(&collection.details.website)
            .bind(&collection.details.description)
            .bind(collection.base.is_active)
            .bind(&extras)
            .bind(collection.base.updated_at)
            .bind(&collection.id)
            .execute(pool)
            .await
            .context("Failed to update collection")?;
        });

        Ok(collection.clone())
    }

    async fn list_by_parent(
        &self,
        parent: &ResourceRef,
        params: &ListParams,
    ) -> Result<(Vec<Collection>, i64)> {
        let (rows, total) = with_pool!(self.pool, |pool| {
            let rows = sqlx::query_as::<_, CollectionRow>(
                r#"
                SELECT id, mnemonic, parent_type, parent_id, owner_id, name, full_name, collection_type,
                       public_access, default_locale, website, description, is_active, extras,
                       created_at, updated_at
                FROM collections
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
            .context("Failed to list collections")?;

            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM collections WHERE parent_type = ? AND parent_id = ? AND is_active = ?",
            )
            .bind(parent.resource_type.as_str())
            .bind(&parent.id)
            .bind(true)
            .fetch_one(pool)
            .await
            .context("Failed to count collections")?;

            (rows, total)
        });

        let collections = rows
            .into_iter()
            .map(CollectionRow::into_collection)
            .collect::<Result<Vec<_>>>()?;
        Ok((collections, total))
    }
}
