//! Organization repository
//!
//! Organizations, their membership table and the aggregate counts shown on
//! the detail view.

use super::user::UserRow;
use crate::db::DynDatabasePool;
use crate::models::{
    extras_from_json, extras_to_json, BaseFields, ListParams, Organization, OrganizationCounts,
    PublicAccess, ResourceType, User,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Organization repository trait
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Insert the organization and its creator as first member in one
    /// transaction
    async fn create(&self, org: &Organization, creator_id: &str) -> Result<Organization>;

    /// Get by ID, active or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Organization>>;

    /// Get by mnemonic, active or not
    async fn get_by_mnemonic(&self, mnemonic: &str) -> Result<Option<Organization>>;

    /// Persist every mutable column
    async fn update(&self, org: &Organization) -> Result<Organization>;

    /// List active organizations ordered by mnemonic
    async fn list(&self, params: &ListParams) -> Result<(Vec<Organization>, i64)>;

    /// Add a member; adding an existing member is a no-op
    async fn add_member(&self, org_id: &str, user_id: &str) -> Result<()>;

    /// Remove a member, returning whether a row was removed
    async fn remove_member(&self, org_id: &str, user_id: &str) -> Result<bool>;

    async fn is_member(&self, org_id: &str, user_id: &str) -> Result<bool>;

    /// Active users belonging to the organization
    async fn list_members(&self, org_id: &str) -> Result<Vec<User>>;

    /// Member and public sub-resource counts
    async fn counts(&self, org_id: &str) -> Result<OrganizationCounts>;
}

/// SQLx-based organization repository implementation
pub struct SqlxOrganizationRepository {
    pool: DynDatabasePool,
}

impl SqlxOrganizationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrganizationRepository> {
        Arc::new(Self::new(pool))
    }

    /// Active, publicly visible rows of `table` owned by the organization
    async fn count_public(&self, table: &str, org_id: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE parent_type = ? AND parent_id = ? AND is_active = ? AND public_access <> ?",
            table
        );
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(ResourceType::Organization.as_str())
                .bind(org_id)
                .bind(true)
                .bind(PublicAccess::None.as_str())
                .fetch_one(pool)
                .await
                .with_context(|| format!("Failed to count public {}", table))?
        });
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    mnemonic: String,
    name: String,
    company: Option<String>,
    website: Option<String>,
    is_active: bool,
    extras: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrganizationRow {
    fn into_organization(self) -> Result<Organization> {
        let extras = extras_from_json(&self.extras)
            .with_context(|| format!("Invalid extras for organization {}", self.id))?;
        Ok(Organization {
            id: self.id,
            mnemonic: self.mnemonic,
            name: self.name,
            company: self.company,
            website: self.website,
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
impl OrganizationRepository for SqlxOrganizationRepository {
    async fn create(&self, org: &Organization, creator_id: &str) -> Result<Organization> {
        let extras = extras_to_json(&org.base.extras);
        with_pool!(self.pool, |pool| {
            let mut tx = pool
                .begin()
                .await
                .context("Failed to start organization transaction")?;
            sqlx::query(
                r#"
                INSERT INTO organizations (id, mnemonic, name, company, website, is_active, extras,
                                           created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&org.id)
            .bind(&org.mnemonic)
            .bind(&org.name)
            .bind(&org.company)
            .bind(&org.website)
            .bind(org.base.is_active)
            .bind(&extras)
            .bind(org.base.created_at)
            .bind(org.base.updated_at)
            .execute(&mut *tx)
            .await
            .context("Failed to create organization")?;
            sqlx::query(
                "INSERT INTO organization_members (organization_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(&org.id)
            .bind(creator_id)
            .bind(org.base.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to add organization creator")?;
            tx.commit()
                .await
                .context("Failed to commit organization")?;
        });

        Ok(org.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Organization>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, OrganizationRow>(
                r#"
                SELECT id, mnemonic, name, company, website, is_active, extras, created_at, updated_at
                FROM organizations
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get organization by ID")?
        });

        row.map(OrganizationRow::into_organization).transpose()
    }

    async fn get_by_mnemonic(&self, mnemonic: &str) -> Result<Option<Organization>> {
        let row = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, OrganizationRow>(
                r#"
                SELECT id, mnemonic, name, company, website, is_active, extras, created_at, updated_at
                FROM organizations
                WHERE mnemonic = ?
                "#,
            )
            .bind(mnemonic)
            .fetch_optional(pool)
            .await
            .context("Failed to get organization by mnemonic")?
        });

        row.map(OrganizationRow::into_organization).transpose()
    }

    async fn update(&self, org: &Organization) -> Result<Organization> {
        let extras = extras_to_json(&org.base.extras);
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE organizations
                SET name = ?, company = ?, website = ?, is_active = ?, extras = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&org.name)
            .bind(&org.company)
            .bind(&org.website)
            .bind(org.base.is_active)
            .bind(&extras)
            .bind(org.base.updated_at)
            .bind(&org.id)
            .execute(pool)
            .await
            .context("Failed to update organization")?;
        });

        Ok(org.clone())
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Organization>, i64)> {
        let (rows, total) = with_pool!(self.pool, |pool| {
            let rows = sqlx::query_as::<_, OrganizationRow>(
                r#"
                SELECT id, mnemonic, name, company, website, is_active, extras, created_at, updated_at
                FROM organizations
                WHERE is_active = ?
                ORDER BY mnemonic
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(true)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
            .context("Failed to list organizations")?;

            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM organizations WHERE is_active = ?",
            )
            .bind(true)
            .fetch_one(pool)
            .await
            .context("Failed to count organizations")?;

            (rows, total)
        });

        let orgs = rows
            .into_iter()
            .map(OrganizationRow::into_organization)
            .collect::<Result<Vec<_>>>()?;
        Ok((orgs, total))
    }

    async fn add_member(&self, org_id: &str, user_id: &str) -> Result<()> {
        if self.is_member(org_id, user_id).await? {
            return Ok(());
        }
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO organization_members (organization_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(org_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .context("Failed to add organization member")?;
        });
        Ok(())
    }

    async fn remove_member(&self, org_id: &str, user_id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM organization_members WHERE organization_id = ? AND user_id = ?")
                .bind(org_id)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to remove organization member")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn is_member(&self, org_id: &str, user_id: &str) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM organization_members WHERE organization_id = ? AND user_id = ?",
            )
            .bind(org_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to check organization membership")?
        });
        Ok(count > 0)
    }

    async fn list_members(&self, org_id: &str) -> Result<Vec<User>> {
        let rows = with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT u.id, u.username, u.email, u.name, u.company, u.location, u.password_hash,
                       u.is_staff, u.is_active, u.extras, u.created_at, u.updated_at
                FROM users u
                INNER JOIN organization_members m ON m.user_id = u.id
                WHERE m.organization_id = ? AND u.is_active = ?
                ORDER BY u.username
                "#,
            )
            .bind(org_id)
            .bind(true)
            .fetch_all(pool)
            .await
            .context("Failed to list organization members")?
        });

        rows.into_iter().map(UserRow::into_user).collect()
    }

    async fn counts(&self, org_id: &str) -> Result<OrganizationCounts> {
        let members = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM organization_members m
                INNER JOIN users u ON u.id = m.user_id
                WHERE m.organization_id = ? AND u.is_active = ?
                "#,
            )
            .bind(org_id)
            .bind(true)
            .fetch_one(pool)
            .await
            .context("Failed to count organization members")?
        });

        Ok(OrganizationCounts {
            members,
            public_collections: self.count_public("collections", org_id).await?,
            public_sources: self.count_public("sources", org_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        is_unique_violation, CollectionRepository, SourceRepository, SqlxCollectionRepository,
        SqlxSourceRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Collection, Record, Source};

    async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn create_user(pool: &DynDatabasePool, username: &str) -> User {
        let user = User::new(
            username.into(),
            format!("{}@example.com", username),
            username.into(),
            "hash".into(),
        );
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_create_and_get_organization() {
        let pool = setup_pool().await;
        let repo = SqlxOrganizationRepository::new(pool.clone());
        let creator = create_user(&pool, "jdoe").await;
        let mut org = Organization::new("OCL".into(), "Open Concept Lab".into());
        org.website = Some("https://openconceptlab.org".into());

        repo.create(&org, &creator.id)
            .await
            .expect("Failed to create organization");
        assert!(repo.is_member(&org.id, &creator.id).await.expect("Query failed"));

        let found = repo
            .get_by_mnemonic("OCL")
            .await
            .expect("Failed to get organization")
            .expect("Organization not found");
        assert_eq!(found.id, org.id);
        assert_eq!(found.website, org.website);
        assert!(repo
            .get_by_id(&org.id)
            .await
            .expect("Failed to get organization")
            .is_some());
    }

    #[tokio::test]
    async fn test_create_rolls_back_without_creator() {
        let repo = SqlxOrganizationRepository::new(setup_pool().await);

        // the member insert fails on the missing user, so the org row rolls back
        let orphan = Organization::new("Orphan".into(), "Orphan".into());
        assert!(repo.create(&orphan, "no-such-user").await.is_err());
        assert!(repo
            .get_by_mnemonic("Orphan")
            .await
            .expect("Query failed")
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_mnemonic_rejected_by_storage() {
        let pool = setup_pool().await;
        let repo = SqlxOrganizationRepository::new(pool.clone());
        let creator = create_user(&pool, "jdoe").await;
        repo.create(&Organization::new("OCL".into(), "First".into()), &creator.id)
            .await
            .expect("Failed to create organization");

        let err = repo
            .create(&Organization::new("OCL".into(), "Second".into()), &creator.id)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_list_skips_inactive() {
        let pool = setup_pool().await;
        let repo = SqlxOrganizationRepository::new(pool.clone());
        let creator = create_user(&pool, "jdoe").await;
        let mut gone = Organization::new("Gone".into(), "Gone".into());
        repo.create(&gone, &creator.id)
            .await
            .expect("Failed to create organization");
        repo.create(&Organization::new("Kept".into(), "Kept".into()), &creator.id)
            .await
            .expect("Failed to create organization");

        gone.soft_delete();
        repo.update(&gone).await.expect("Failed to update organization");

        let (orgs, total) = repo
            .list(&ListParams::new(1, 10))
            .await
            .expect("Failed to list organizations");
        assert_eq!(total, 1);
        assert_eq!(orgs[0].mnemonic, "Kept");
    }

    #[tokio::test]
    async fn test_membership() {
        let pool = setup_pool().await;
        let repo = SqlxOrganizationRepository::new(pool.clone());
        let founder = create_user(&pool, "founder").await;
        let org = Organization::new("OCL".into(), "OCL".into());
        repo.create(&org, &founder.id)
            .await
            .expect("Failed to create organization");
        let alice = create_user(&pool, "alice").await;

        repo.add_member(&org.id, &alice.id).await.expect("Failed to add member");
        repo.add_member(&org.id, &alice.id)
            .await
            .expect("Adding twice should be a no-op");

        assert!(repo.is_member(&org.id, &alice.id).await.expect("Query failed"));
        let members = repo.list_members(&org.id).await.expect("Failed to list members");
        let mut names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "founder"]);

        assert!(repo
            .remove_member(&org.id, &alice.id)
            .await
            .expect("Failed to remove member"));
        assert!(!repo
            .remove_member(&org.id, &alice.id)
            .await
            .expect("Failed to remove member"));
    }

    #[tokio::test]
    async fn test_counts_only_active_public_sub_resources() {
        let pool = setup_pool().await;
        let repo = SqlxOrganizationRepository::new(pool.clone());
        let sources = SqlxSourceRepository::new(pool.clone());
        let collections = SqlxCollectionRepository::new(pool.clone());

        let owner = create_user(&pool, "owner").await;
        let org = Organization::new("OCL".into(), "OCL".into());
        repo.create(&org, &owner.id)
            .await
            .expect("Failed to create organization");
        create_user(&pool, "outsider").await;

        let public = Source::new("A".into(), "A".into(), owner.id.clone(), org.resource_ref());
        let mut private = Source::new("B".into(), "B".into(), owner.id.clone(), org.resource_ref());
        private.details.public_access = PublicAccess::None;
        let mut retired = Source::new("C".into(), "C".into(), owner.id.clone(), org.resource_ref());
        retired.soft_delete();
        let mut editable =
            Collection::new("D".into(), "D".into(), owner.id.clone(), org.resource_ref());
        editable.details.public_access = PublicAccess::Edit;

        for source in [&public, &private, &retired] {
            sources.create(source).await.expect("Failed to create source");
        }
        collections
            .create(&editable)
            .await
            .expect("Failed to create collection");

        let counts = repo.counts(&org.id).await.expect("Failed to count");
        assert_eq!(
            counts,
            OrganizationCounts {
                members: 1,
                public_collections: 1,
                public_sources: 1,
            }
        );
    }
}
