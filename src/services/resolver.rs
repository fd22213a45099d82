//! Polymorphic reference resolution
//!
//! Sources and collections point at their parent through a [`ResourceRef`].
//! The resolver turns that reference into a typed enum and answers the one
//! question every write path asks: may this user change things under that
//! parent?

use crate::db::repositories::{OrganizationRepository, UserRepository};
use crate::models::{
    Collection, Organization, Record, ResourceRef, ResourceType, Source, SubResource, User,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Something that can own sources and collections.
#[derive(Debug, Clone, PartialEq)]
pub enum ParentResource {
    Organization(Organization),
    User(User),
}

impl ParentResource {
    pub fn id(&self) -> &str {
        match self {
            ParentResource::Organization(org) => &org.id,
            ParentResource::User(user) => &user.id,
        }
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            ParentResource::Organization(org) => &org.mnemonic,
            ParentResource::User(user) => user.mnemonic(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            ParentResource::Organization(_) => ResourceType::Organization,
            ParentResource::User(_) => ResourceType::User,
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.resource_type(), self.id())
    }

    pub fn url(&self) -> String {
        match self {
            ParentResource::Organization(org) => org.url(),
            ParentResource::User(user) => user.url(),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            ParentResource::Organization(org) => org.is_active(),
            ParentResource::User(user) => user.is_active(),
        }
    }
}

/// Something that can be versioned.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionedResource {
    Source(Source),
    Collection(Collection),
}

impl VersionedResource {
    fn inner(&self) -> &dyn SubResource {
        match self {
            VersionedResource::Source(source) => source,
            VersionedResource::Collection(collection) => collection,
        }
    }

    pub fn id(&self) -> &str {
        self.inner().id()
    }

    pub fn mnemonic(&self) -> &str {
        self.inner().mnemonic()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.inner().resource_type()
    }

    pub fn resource_ref(&self) -> ResourceRef {
        self.inner().resource_ref()
    }

    /// Reference to the organization or user owning the object
    pub fn parent(&self) -> &ResourceRef {
        self.inner().parent()
    }

    pub fn url_under(&self, parent_url: &str) -> String {
        self.inner().url_under(parent_url)
    }
}

impl From<Source> for VersionedResource {
    fn from(source: Source) -> Self {
        VersionedResource::Source(source)
    }
}

impl From<Collection> for VersionedResource {
    fn from(collection: Collection) -> Self {
        VersionedResource::Collection(collection)
    }
}

/// Resolves polymorphic references and parent-level write permissions.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Load the parent a reference points at; `None` if missing or not a parent kind
    async fn resolve_parent(&self, parent: &ResourceRef) -> Result<Option<ParentResource>>;

    /// Staff may write anywhere; otherwise organization members write under
    /// their organization and users under themselves.
    async fn can_write(&self, parent: &ParentResource, actor: &User) -> Result<bool>;
}

/// Resolver backed by the repositories
pub struct RepositoryResolver {
    orgs: Arc<dyn OrganizationRepository>,
    users: Arc<dyn UserRepository>,
}

impl RepositoryResolver {
    pub fn new(orgs: Arc<dyn OrganizationRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { orgs, users }
    }
}

#[async_trait]
impl ResourceResolver for RepositoryResolver {
    async fn resolve_parent(&self, parent: &ResourceRef) -> Result<Option<ParentResource>> {
        Ok(match parent.resource_type {
            ResourceType::Organization => self
                .orgs
                .get_by_id(&parent.id)
                .await?
                .map(ParentResource::Organization),
            ResourceType::User => self
                .users
                .get_by_id(&parent.id)
                .await?
                .map(ParentResource::User),
            _ => None,
        })
    }

    async fn can_write(&self, parent: &ParentResource, actor: &User) -> Result<bool> {
        if actor.is_staff {
            return Ok(true);
        }
        match parent {
            ParentResource::Organization(org) => self.orgs.is_member(&org.id, &actor.id).await,
            ParentResource::User(user) => Ok(user.id == actor.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxOrganizationRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup() -> (DynDatabasePool, RepositoryResolver) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let resolver = RepositoryResolver::new(
            SqlxOrganizationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
        );
        (pool, resolver)
    }

    async fn create_user(pool: &DynDatabasePool, username: &str, is_staff: bool) -> User {
        let mut user = User::new(
            username.into(),
            format!("{}@example.com", username),
            username.into(),
            "hash".into(),
        );
        user.is_staff = is_staff;
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_resolve_parent_kinds() {
        let (pool, resolver) = setup().await;
        let user = create_user(&pool, "jdoe", false).await;
        let org = Organization::new("OCL".into(), "OCL".into());
        SqlxOrganizationRepository::new(pool.clone())
            .create(&org, &user.id)
            .await
            .expect("Failed to create organization");

        let parent = resolver
            .resolve_parent(&org.resource_ref())
            .await
            .expect("Resolve failed")
            .expect("Organization not resolved");
        assert_eq!(parent.mnemonic(), "OCL");
        assert_eq!(parent.url(), "/api/v1/orgs/OCL");

        let parent = resolver
            .resolve_parent(&ResourceRef::user(user.id.clone()))
            .await
            .expect("Resolve failed")
            .expect("User not resolved");
        assert_eq!(parent.resource_type(), ResourceType::User);
        assert_eq!(parent.url(), "/api/v1/users/jdoe");

        assert!(resolver
            .resolve_parent(&ResourceRef::source("anything"))
            .await
            .expect("Resolve failed")
            .is_none());
    }

    #[tokio::test]
    async fn test_can_write_rules() {
        let (pool, resolver) = setup().await;
        let member = create_user(&pool, "member", false).await;
        let outsider = create_user(&pool, "outsider", false).await;
        let staff = create_user(&pool, "staff", true).await;

        let org = Organization::new("OCL".into(), "OCL".into());
        SqlxOrganizationRepository::new(pool.clone())
            .create(&org, &member.id)
            .await
            .expect("Failed to create organization");
        let org_parent = ParentResource::Organization(org);
        let user_parent = ParentResource::User(member.clone());

        assert!(resolver.can_write(&org_parent, &member).await.expect("Check failed"));
        assert!(!resolver.can_write(&org_parent, &outsider).await.expect("Check failed"));
        assert!(resolver.can_write(&org_parent, &staff).await.expect("Check failed"));
        assert!(resolver.can_write(&user_parent, &member).await.expect("Check failed"));
        assert!(!resolver.can_write(&user_parent, &outsider).await.expect("Check failed"));
    }
}
