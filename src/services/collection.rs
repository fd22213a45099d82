//! Collection service
//!
//! Same ownership and uniqueness rules as sources.

use super::resolver::{ParentResource, ResourceResolver};
use super::{duplicate_or_internal, ResourceServiceError};
use crate::db::repositories::CollectionRepository;
use crate::models::{
    require_text, validate_mnemonic, Collection, Extras, FieldErrors, ListParams, PagedResult,
    PublicAccess, Record, User,
};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Input for creating a collection. `id` on the wire is the mnemonic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCollectionInput {
    #[serde(rename = "id", default)]
    pub mnemonic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub public_access: Option<PublicAccess>,
    #[serde(default)]
    pub default_locale: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

pub struct CollectionService {
    collection_repo: Arc<dyn CollectionRepository>,
    resolver: Arc<dyn ResourceResolver>,
}

impl CollectionService {
    pub fn new(
        collection_repo: Arc<dyn CollectionRepository>,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            collection_repo,
            resolver,
        }
    }

    pub async fn create(
        &self,
        parent: &ParentResource,
        input: CreateCollectionInput,
        actor: &User,
    ) -> Result<Collection, ResourceServiceError> {
        if !self.resolver.can_write(parent, actor).await? {
            return Err(ResourceServiceError::Forbidden(format!(
                "{} cannot write under {}",
                actor.username,
                parent.mnemonic()
            )));
        }

        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "mnemonic", &input.mnemonic);
        require_text(&mut errors, "name", &input.name);
        errors.into_result()?;

        let parent_ref = parent.resource_ref();
        let message = format!(
            "Collection with mnemonic {} already exists for {}.",
            input.mnemonic,
            parent.mnemonic()
        );
        if self
            .collection_repo
            .get_by_parent_and_mnemonic(&parent_ref, &input.mnemonic)
            .await
            .context("Failed to check collection mnemonic")?
            .is_some()
        {
            return Err(FieldErrors::single("mnemonic", message).into());
        }

        let mut collection =
            Collection::new(input.mnemonic, input.name, actor.id.clone(), parent_ref);
        collection.details.full_name = input.full_name;
        collection.collection_type = input.collection_type;
        collection.details.public_access = input.public_access.unwrap_or_default();
        collection.details.default_locale = input.default_locale;
        collection.details.website = input.website;
        collection.details.description = input.description;
        if let Some(extras) = input.extras {
            collection.base.extras = extras;
        }

        let collection = self
            .collection_repo
            .create(&collection)
            .await
            .map_err(|e| duplicate_or_internal(e, "mnemonic", message))?;

        tracing::info!(
            "Collection {} created under {}",
            collection.sub.mnemonic,
            parent.mnemonic()
        );
        Ok(collection)
    }

    /// Active collection by mnemonic within its parent
    pub async fn get(
        &self,
        parent: &ParentResource,
        mnemonic: &str,
    ) -> Result<Collection, ResourceServiceError> {
        self.collection_repo
            .get_by_parent_and_mnemonic(&parent.resource_ref(), mnemonic)
            .await
            .context("Failed to get collection")?
            .filter(|collection| collection.is_active())
            .ok_or_else(|| {
                ResourceServiceError::NotFound(format!(
                    "Collection {} in {}",
                    mnemonic,
                    parent.mnemonic()
                ))
            })
    }

    pub async fn list(
        &self,
        parent: &ParentResource,
        params: &ListParams,
    ) -> Result<PagedResult<Collection>, ResourceServiceError> {
        let (collections, total) = self
            .collection_repo
            .list_by_parent(&parent.resource_ref(), params)
            .await?;
        Ok(PagedResult::new(collections, total, params))
    }
}
