//! Version service
//!
//! Creates and maintains versions of sources and collections, including
//! their lineage: a new version follows the current latest one unless told
//! otherwise, and may name the version it was derived from.

use super::resolver::{ResourceResolver, VersionedResource};
use super::{apply, duplicate_or_internal, ResourceServiceError};
use crate::db::repositories::VersionRepository;
use crate::models::{
    validate_mnemonic, Extras, FieldErrors, ListParams, PagedResult, Record, ResourceVersion,
    User,
};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Input for creating a version. `id` on the wire is the mnemonic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateVersionInput {
    #[serde(rename = "id", default)]
    pub mnemonic: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub released: Option<bool>,
    /// Mnemonic of the preceding version; defaults to the current latest
    #[serde(default)]
    pub previous_version: Option<String>,
    /// Mnemonic of the version this one derives from
    #[serde(default)]
    pub parent_version: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVersionInput {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub released: Option<bool>,
    #[serde(default)]
    pub parent_version: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

pub struct VersionService {
    version_repo: Arc<dyn VersionRepository>,
    resolver: Arc<dyn ResourceResolver>,
}

impl VersionService {
    pub fn new(
        version_repo: Arc<dyn VersionRepository>,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            version_repo,
            resolver,
        }
    }

    pub async fn create(
        &self,
        object: &VersionedResource,
        input: CreateVersionInput,
        actor: &User,
    ) -> Result<ResourceVersion, ResourceServiceError> {
        self.ensure_can_write(object, actor).await?;

        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "mnemonic", &input.mnemonic);
        errors.into_result()?;

        let object_ref = object.resource_ref();
        let message = format!(
            "Version with mnemonic {} already exists for {}.",
            input.mnemonic,
            object.mnemonic()
        );
        if self
            .version_repo
            .get_by_object_and_mnemonic(&object_ref, &input.mnemonic)
            .await
            .context("Failed to check version mnemonic")?
            .is_some()
        {
            return Err(FieldErrors::single("mnemonic", message).into());
        }

        let previous = match &input.previous_version {
            Some(mnemonic) => Some(self.sibling(object, "previous_version", mnemonic).await?),
            None => self.latest_version_of(object).await?,
        };
        let parent = match &input.parent_version {
            Some(mnemonic) => Some(self.sibling(object, "parent_version", mnemonic).await?),
            None => None,
        };

        let mut version = ResourceVersion::new(input.mnemonic, object_ref);
        version.description = input.description;
        version.released = input.released.unwrap_or(false);
        version.previous_version_id = previous.map(|v| v.id);
        version.parent_version_id = parent.map(|v| v.id);
        if let Some(extras) = input.extras {
            version.base.extras = extras;
        }
        version.clean()?;

        let version = self
            .version_repo
            .create(&version)
            .await
            .map_err(|e| duplicate_or_internal(e, "mnemonic", message))?;

        tracing::info!(
            "Version {} of {} {} created",
            version.mnemonic,
            object.resource_type(),
            object.mnemonic()
        );
        Ok(version)
    }

    /// Active version by mnemonic
    pub async fn get(
        &self,
        object: &VersionedResource,
        mnemonic: &str,
    ) -> Result<ResourceVersion, ResourceServiceError> {
        self.version_repo
            .get_by_object_and_mnemonic(&object.resource_ref(), mnemonic)
            .await
            .context("Failed to get version")?
            .filter(|version| version.is_active())
            .ok_or_else(|| {
                ResourceServiceError::NotFound(format!(
                    "Version {} of {}",
                    mnemonic,
                    object.mnemonic()
                ))
            })
    }

    pub async fn list(
        &self,
        object: &VersionedResource,
        params: &ListParams,
    ) -> Result<PagedResult<ResourceVersion>, ResourceServiceError> {
        let (versions, total) = self
            .version_repo
            .list_by_object(&object.resource_ref(), params)
            .await?;
        Ok(PagedResult::new(versions, total, params))
    }

    /// The active version of `object` with the newest `created_at`
    pub async fn latest_version_of(
        &self,
        object: &VersionedResource,
    ) -> Result<Option<ResourceVersion>, ResourceServiceError> {
        Ok(self
            .version_repo
            .get_latest_active(&object.resource_ref())
            .await?)
    }

    pub async fn update(
        &self,
        object: &VersionedResource,
        mnemonic: &str,
        input: UpdateVersionInput,
        actor: &User,
    ) -> Result<ResourceVersion, ResourceServiceError> {
        self.ensure_can_write(object, actor).await?;
        let mut version = self.get(object, mnemonic).await?;

        if let Some(parent_mnemonic) = &input.parent_version {
            let parent = self.sibling(object, "parent_version", parent_mnemonic).await?;
            version.parent_version_id = Some(parent.id);
        }
        if input.description.is_some() {
            version.description = input.description;
        }
        apply(&mut version.released, input.released);
        apply(&mut version.base.extras, input.extras);
        version.clean()?;
        version.base.touch();

        Ok(self
            .version_repo
            .update(&version)
            .await
            .context("Failed to update version")?)
    }

    pub async fn soft_delete(
        &self,
        object: &VersionedResource,
        mnemonic: &str,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        self.ensure_can_write(object, actor).await?;
        let mut version = self.get(object, mnemonic).await?;

        if version.soft_delete() {
            self.version_repo
                .update(&version)
                .await
                .context("Failed to delete version")?;
            tracing::info!("Version {} deactivated", version.mnemonic);
        }
        Ok(())
    }

    /// Mnemonic of a lineage pointer, for display
    pub async fn mnemonic_of(
        &self,
        version_id: Option<&str>,
    ) -> Result<Option<String>, ResourceServiceError> {
        let Some(id) = version_id else {
            return Ok(None);
        };
        Ok(self
            .version_repo
            .get_by_id(id)
            .await
            .context("Failed to resolve lineage")?
            .map(|version| version.mnemonic))
    }

    /// Another active version of the same object, named in `field`
    async fn sibling(
        &self,
        object: &VersionedResource,
        field: &str,
        mnemonic: &str,
    ) -> Result<ResourceVersion, ResourceServiceError> {
        self.version_repo
            .get_by_object_and_mnemonic(&object.resource_ref(), mnemonic)
            .await
            .context("Failed to look up version")?
            .filter(|version| version.is_active())
            .ok_or_else(|| {
                FieldErrors::single(field, format!("Version {} does not exist.", mnemonic)).into()
            })
    }

    async fn ensure_can_write(
        &self,
        object: &VersionedResource,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        let parent = self
            .resolver
            .resolve_parent(object.parent())
            .await?
            .ok_or_else(|| {
                ResourceServiceError::NotFound(format!("Owner of {}", object.mnemonic()))
            })?;
        if self.resolver.can_write(&parent, actor).await? {
            Ok(())
        } else {
            Err(ResourceServiceError::Forbidden(format!(
                "{} cannot write under {}",
                actor.username,
                parent.mnemonic()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SourceRepository, SqlxOrganizationRepository, SqlxSourceRepository, SqlxUserRepository,
        SqlxVersionRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ResourceRef, Source, PARENT_VERSION_FIELD};
    use crate::services::RepositoryResolver;
    use std::time::Duration;

    struct Fixture {
        service: VersionService,
        object: VersionedResource,
        owner: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let source_repo = SqlxSourceRepository::boxed(pool.clone());
        let resolver = Arc::new(RepositoryResolver::new(
            SqlxOrganizationRepository::boxed(pool.clone()),
            user_repo.clone(),
        ));

        let owner = User::new("owner".into(), "o@example.com".into(), "O".into(), "h".into());
        user_repo.create(&owner).await.expect("Failed to create user");
        let source = Source::new(
            "CIEL".into(),
            "CIEL".into(),
            owner.id.clone(),
            ResourceRef::user(owner.id.clone()),
        );
        source_repo.create(&source).await.expect("Failed to create source");

        Fixture {
            service: VersionService::new(SqlxVersionRepository::boxed(pool), resolver),
            object: VersionedResource::Source(source),
            owner,
        }
    }

    fn input(mnemonic: &str) -> CreateVersionInput {
        CreateVersionInput {
            mnemonic: mnemonic.to_string(),
            ..Default::default()
        }
    }

    async fn create(fx: &Fixture, input: CreateVersionInput) -> ResourceVersion {
        let version = fx
            .service
            .create(&fx.object, input, &fx.owner)
            .await
            .expect("Failed to create version");
        // keep created_at strictly increasing between versions
        tokio::time::sleep(Duration::from_millis(5)).await;
        version
    }

    #[tokio::test]
    async fn test_new_version_follows_latest() {
        let fx = setup().await;
        assert!(fx
            .service
            .latest_version_of(&fx.object)
            .await
            .expect("Query failed")
            .is_none());

        let v1 = create(&fx, input("v1")).await;
        assert!(v1.previous_version_id.is_none());
        let v2 = create(&fx, input("v2")).await;
        assert_eq!(v2.previous_version_id.as_deref(), Some(v1.id.as_str()));

        let latest = fx
            .service
            .latest_version_of(&fx.object)
            .await
            .expect("Query failed")
            .expect("Expected a latest version");
        assert_eq!(latest.id, v2.id);
        assert_eq!(
            fx.service
                .mnemonic_of(v2.previous_version_id.as_deref())
                .await
                .expect("Lookup failed")
                .as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn test_latest_skips_soft_deleted() {
        let fx = setup().await;
        create(&fx, input("v1")).await;
        create(&fx, input("v2")).await;

        fx.service
            .soft_delete(&fx.object, "v2", &fx.owner)
            .await
            .expect("Failed to delete version");

        let latest = fx
            .service
            .latest_version_of(&fx.object)
            .await
            .expect("Query failed")
            .expect("Expected a latest version");
        assert_eq!(latest.mnemonic, "v1");
    }

    #[tokio::test]
    async fn test_parent_version_by_mnemonic() {
        let fx = setup().await;
        let v1 = create(&fx, input("v1")).await;
        let branch = create(
            &fx,
            CreateVersionInput {
                parent_version: Some("v1".into()),
                ..input("v1-fix")
            },
        )
        .await;
        assert_eq!(branch.parent_version_id.as_deref(), Some(v1.id.as_str()));

        let err = fx
            .service
            .create(
                &fx.object,
                CreateVersionInput {
                    parent_version: Some("missing".into()),
                    ..input("v3")
                },
                &fx.owner,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Validation(ref e) if e.contains("parent_version")
        ));
    }

    #[tokio::test]
    async fn test_lineage_ignores_deleted_versions() {
        let fx = setup().await;
        create(&fx, input("v1")).await;
        fx.service
            .soft_delete(&fx.object, "v1", &fx.owner)
            .await
            .expect("Failed to delete version");

        for lineage in [
            CreateVersionInput {
                previous_version: Some("v1".into()),
                ..input("v2")
            },
            CreateVersionInput {
                parent_version: Some("v1".into()),
                ..input("v2")
            },
        ] {
            let err = fx
                .service
                .create(&fx.object, lineage, &fx.owner)
                .await
                .unwrap_err();
            assert!(matches!(err, ResourceServiceError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_reserved_mnemonic_rejected() {
        let fx = setup().await;
        let err = fx
            .service
            .create(&fx.object, input("latest"), &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Validation(ref e) if e.contains("mnemonic")
        ));
        assert!(fx
            .service
            .latest_version_of(&fx.object)
            .await
            .expect("Query failed")
            .is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_self_parent() {
        let fx = setup().await;
        create(&fx, input("v1")).await;

        let err = fx
            .service
            .update(
                &fx.object,
                "v1",
                UpdateVersionInput {
                    parent_version: Some("v1".into()),
                    ..Default::default()
                },
                &fx.owner,
            )
            .await
            .unwrap_err();
        let ResourceServiceError::Validation(errors) = err else {
            panic!("Expected validation error");
        };
        assert_eq!(
            errors.get(PARENT_VERSION_FIELD),
            Some(&["version cannot be its own parent".to_string()][..])
        );

        let stored = fx.service.get(&fx.object, "v1").await.expect("Get failed");
        assert!(stored.parent_version_id.is_none());
    }

    #[tokio::test]
    async fn test_update_released_and_duplicate_mnemonic() {
        let fx = setup().await;
        create(&fx, input("v1")).await;

        let updated = fx
            .service
            .update(
                &fx.object,
                "v1",
                UpdateVersionInput {
                    released: Some(true),
                    ..Default::default()
                },
                &fx.owner,
            )
            .await
            .expect("Failed to update version");
        assert!(updated.released);

        let err = fx
            .service
            .create(&fx.object, input("v1"), &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Validation(ref e) if e.contains("mnemonic")
        ));
    }

    #[tokio::test]
    async fn test_only_owner_writes() {
        let fx = setup().await;
        let stranger = User::new("x".into(), "x@example.com".into(), "X".into(), "h".into());
        let err = fx
            .service
            .create(&fx.object, input("v1"), &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceServiceError::Forbidden(_)));
    }
}
