//! Organization service
//!
//! Creation with mnemonic uniqueness, partial updates, soft deletion and
//! membership. Writes are limited to members and staff.

use super::{apply, duplicate_or_internal, ResourceServiceError};
use crate::db::repositories::{OrganizationRepository, UserRepository};
use crate::models::{
    require_text, validate_mnemonic, Extras, FieldErrors, ListParams, Organization,
    OrganizationCounts, PagedResult, Record, User,
};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Input for creating an organization. `id` on the wire is the mnemonic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrganizationInput {
    #[serde(rename = "id", default)]
    pub mnemonic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrganizationInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

pub struct OrganizationService {
    org_repo: Arc<dyn OrganizationRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl OrganizationService {
    pub fn new(
        org_repo: Arc<dyn OrganizationRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            org_repo,
            user_repo,
        }
    }

    /// Create an organization; the creator becomes its first member.
    ///
    /// A taken mnemonic is reported as a field error on `mnemonic` and
    /// nothing is written.
    pub async fn create(
        &self,
        input: CreateOrganizationInput,
        creator: &User,
    ) -> Result<Organization, ResourceServiceError> {
        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "mnemonic", &input.mnemonic);
        require_text(&mut errors, "name", &input.name);
        errors.into_result()?;

        if self
            .org_repo
            .get_by_mnemonic(&input.mnemonic)
            .await
            .context("Failed to check organization mnemonic")?
            .is_some()
        {
            return Err(duplicate_mnemonic(&input.mnemonic).into());
        }

        let mut org = Organization::new(input.mnemonic, input.name);
        org.company = input.company;
        org.website = input.website;
        if let Some(extras) = input.extras {
            org.base.extras = extras;
        }

        let org = self
            .org_repo
            .create(&org, &creator.id)
            .await
            .map_err(|e| {
                duplicate_or_internal(
                    e,
                    "mnemonic",
                    format!("Organization with mnemonic {} already exists.", org.mnemonic),
                )
            })?;

        tracing::info!("Organization {} created by {}", org.mnemonic, creator.username);
        Ok(org)
    }

    /// Active organization by mnemonic
    pub async fn get(&self, mnemonic: &str) -> Result<Organization, ResourceServiceError> {
        self.org_repo
            .get_by_mnemonic(mnemonic)
            .await
            .context("Failed to get organization")?
            .filter(|org| org.is_active())
            .ok_or_else(|| ResourceServiceError::NotFound(format!("Organization {}", mnemonic)))
    }

    pub async fn list(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<Organization>, ResourceServiceError> {
        let (orgs, total) = self.org_repo.list(params).await?;
        Ok(PagedResult::new(orgs, total, params))
    }

    pub async fn counts(&self, org: &Organization) -> Result<OrganizationCounts, ResourceServiceError> {
        Ok(self.org_repo.counts(&org.id).await?)
    }

    /// Apply the supplied fields; everything else keeps its stored value
    pub async fn update(
        &self,
        mnemonic: &str,
        input: UpdateOrganizationInput,
        actor: &User,
    ) -> Result<Organization, ResourceServiceError> {
        let mut org = self.get(mnemonic).await?;
        self.ensure_can_write(&org, actor).await?;

        if let Some(name) = &input.name {
            let mut errors = FieldErrors::new();
            require_text(&mut errors, "name", name);
            errors.into_result()?;
        }

        apply(&mut org.name, input.name);
        if input.company.is_some() {
            org.company = input.company;
        }
        if input.website.is_some() {
            org.website = input.website;
        }
        apply(&mut org.base.extras, input.extras);
        org.base.touch();

        Ok(self
            .org_repo
            .update(&org)
            .await
            .context("Failed to update organization")?)
    }

    /// Soft-delete; deleting an inactive organization is a no-op
    pub async fn soft_delete(&self, mnemonic: &str, actor: &User) -> Result<(), ResourceServiceError> {
        let mut org = self.get(mnemonic).await?;
        self.ensure_can_write(&org, actor).await?;

        if org.soft_delete() {
            self.org_repo
                .update(&org)
                .await
                .context("Failed to delete organization")?;
            tracing::info!("Organization {} deactivated", org.mnemonic);
        }
        Ok(())
    }

    /// Reactivate a soft-deleted organization. Staff only.
    pub async fn undelete(
        &self,
        mnemonic: &str,
        actor: &User,
    ) -> Result<Organization, ResourceServiceError> {
        if !actor.is_staff {
            return Err(ResourceServiceError::Forbidden(
                "Only staff can restore organizations".to_string(),
            ));
        }
        let mut org = self
            .org_repo
            .get_by_mnemonic(mnemonic)
            .await
            .context("Failed to get organization")?
            .ok_or_else(|| ResourceServiceError::NotFound(format!("Organization {}", mnemonic)))?;

        if org.undelete() {
            self.org_repo
                .update(&org)
                .await
                .context("Failed to restore organization")?;
        }
        Ok(org)
    }

    pub async fn members(&self, org: &Organization) -> Result<Vec<User>, ResourceServiceError> {
        Ok(self.org_repo.list_members(&org.id).await?)
    }

    pub async fn add_member(
        &self,
        mnemonic: &str,
        username: &str,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        let org = self.get(mnemonic).await?;
        self.ensure_can_write(&org, actor).await?;
        let user = self.active_user(username).await?;

        self.org_repo
            .add_member(&org.id, &user.id)
            .await
            .context("Failed to add member")?;
        Ok(())
    }

    pub async fn remove_member(
        &self,
        mnemonic: &str,
        username: &str,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        let org = self.get(mnemonic).await?;
        self.ensure_can_write(&org, actor).await?;
        let user = self.active_user(username).await?;

        if !self
            .org_repo
            .remove_member(&org.id, &user.id)
            .await
            .context("Failed to remove member")?
        {
            return Err(ResourceServiceError::NotFound(format!(
                "{} is not a member of {}",
                username, mnemonic
            )));
        }
        Ok(())
    }

    async fn active_user(&self, username: &str) -> Result<User, ResourceServiceError> {
        self.user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user")?
            .filter(|user| user.is_active())
            .ok_or_else(|| ResourceServiceError::NotFound(format!("User {}", username)))
    }

    async fn ensure_can_write(
        &self,
        org: &Organization,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        if actor.is_staff
            || self
                .org_repo
                .is_member(&org.id, &actor.id)
                .await
                .context("Failed to check membership")?
        {
            return Ok(());
        }
        Err(ResourceServiceError::Forbidden(format!(
            "{} is not a member of {}",
            actor.username, org.mnemonic
        )))
    }
}

fn duplicate_mnemonic(mnemonic: &str) -> FieldErrors {
    FieldErrors::single(
        "mnemonic",
        format!("Organization with mnemonic {} already exists.", mnemonic),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxOrganizationRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};

    struct Fixture {
        service: OrganizationService,
        org_repo: Arc<dyn OrganizationRepository>,
        user_repo: Arc<dyn UserRepository>,
        owner: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let org_repo = SqlxOrganizationRepository::boxed(pool.clone());
        let user_repo = SqlxUserRepository::boxed(pool);

        let owner = User::new("owner".into(), "o@example.com".into(), "O".into(), "h".into());
        user_repo.create(&owner).await.expect("Failed to create user");

        Fixture {
            service: OrganizationService::new(org_repo.clone(), user_repo.clone()),
            org_repo,
            user_repo,
            owner,
        }
    }

    fn input(mnemonic: &str) -> CreateOrganizationInput {
        CreateOrganizationInput {
            mnemonic: mnemonic.to_string(),
            name: "Open Concept Lab".to_string(),
            company: Some("OCL Inc".to_string()),
            website: Some("https://openconceptlab.org".to_string()),
            extras: None,
        }
    }

    async fn create_user(fx: &Fixture, username: &str) -> User {
        let user = User::new(
            username.into(),
            format!("{}@example.com", username),
            username.into(),
            "h".into(),
        );
        fx.user_repo.create(&user).await.expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_create_adds_creator_as_member() {
        let fx = setup().await;
        let org = fx
            .service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");

        assert_eq!(org.url(), "/api/v1/orgs/OCL");
        let members = fx.service.members(&org).await.expect("Failed to list members");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, fx.owner.id);
        assert_eq!(fx.service.counts(&org).await.expect("Counts failed").members, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_mnemonic_creates_nothing() {
        let fx = setup().await;
        fx.service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");

        let mut again = input("OCL");
        again.name = "Imposter".to_string();
        let err = fx.service.create(again, &fx.owner).await.unwrap_err();

        let ResourceServiceError::Validation(errors) = err else {
            panic!("Expected validation error");
        };
        assert_eq!(
            errors.get("mnemonic"),
            Some(&["Organization with mnemonic OCL already exists.".to_string()][..])
        );
        let (orgs, total) = fx
            .org_repo
            .list(&ListParams::default())
            .await
            .expect("Failed to list organizations");
        assert_eq!(total, 1);
        assert_eq!(orgs[0].name, "Open Concept Lab");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_mnemonic() {
        let fx = setup().await;
        let err = fx
            .service
            .create(input("OCL org!"), &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Validation(ref errors) if errors.contains("mnemonic")
        ));
    }

    #[tokio::test]
    async fn test_update_name_only_keeps_other_fields() {
        let fx = setup().await;
        let created = fx
            .service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");

        let update = UpdateOrganizationInput {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let updated = fx
            .service
            .update("OCL", update, &fx.owner)
            .await
            .expect("Failed to update organization");

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.company, created.company);
        assert_eq!(updated.website, created.website);
        assert_eq!(updated.mnemonic, "OCL");
        assert!(updated.base.updated_at >= created.base.updated_at);

        let stored = fx.service.get("OCL").await.expect("Failed to get organization");
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.company.as_deref(), Some("OCL Inc"));
    }

    #[tokio::test]
    async fn test_non_member_cannot_update() {
        let fx = setup().await;
        fx.service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");
        let outsider = create_user(&fx, "outsider").await;

        let err = fx
            .service
            .update("OCL", UpdateOrganizationInput::default(), &outsider)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_and_undelete() {
        let fx = setup().await;
        fx.service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");

        fx.service
            .soft_delete("OCL", &fx.owner)
            .await
            .expect("Failed to delete organization");
        assert!(matches!(
            fx.service.get("OCL").await,
            Err(ResourceServiceError::NotFound(_))
        ));
        let stored = fx
            .org_repo
            .get_by_mnemonic("OCL")
            .await
            .expect("Query failed")
            .expect("Row should remain after soft delete");
        assert!(!stored.is_active());

        assert!(matches!(
            fx.service.undelete("OCL", &fx.owner).await,
            Err(ResourceServiceError::Forbidden(_))
        ));
        let mut staff = create_user(&fx, "staff").await;
        staff.is_staff = true;
        let restored = fx
            .service
            .undelete("OCL", &staff)
            .await
            .expect("Failed to restore organization");
        assert!(restored.is_active());
        assert!(fx.service.get("OCL").await.is_ok());
    }

    #[tokio::test]
    async fn test_member_management() {
        let fx = setup().await;
        let org = fx
            .service
            .create(input("OCL"), &fx.owner)
            .await
            .expect("Failed to create organization");
        create_user(&fx, "alice").await;

        fx.service
            .add_member("OCL", "alice", &fx.owner)
            .await
            .expect("Failed to add member");
        assert_eq!(fx.service.members(&org).await.expect("List failed").len(), 2);

        fx.service
            .remove_member("OCL", "alice", &fx.owner)
            .await
            .expect("Failed to remove member");
        assert!(matches!(
            fx.service.remove_member("OCL", "alice", &fx.owner).await,
            Err(ResourceServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.add_member("OCL", "ghost", &fx.owner).await,
            Err(ResourceServiceError::NotFound(_))
        ));
    }
}
