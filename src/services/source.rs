//! Source service
//!
//! Sources live under an organization or a user. The mnemonic must be
//! unique among that parent's sources only.

use super::resolver::{ParentResource, ResourceResolver};
use super::{apply, duplicate_or_internal, ResourceServiceError};
use crate::db::repositories::SourceRepository;
use crate::models::{
    require_text, validate_mnemonic, Extras, FieldErrors, ListParams, PagedResult, PublicAccess,
    Record, Source, User,
};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Input for creating a source. `id` on the wire is the mnemonic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSourceInput {
    #[serde(rename = "id", default)]
    pub mnemonic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
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

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSourceInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
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

pub struct SourceService {
    source_repo: Arc<dyn SourceRepository>,
    resolver: Arc<dyn ResourceResolver>,
}

impl SourceService {
    pub fn new(source_repo: Arc<dyn SourceRepository>, resolver: Arc<dyn ResourceResolver>) -> Self {
        Self {
            source_repo,
            resolver,
        }
    }

    pub async fn create(
        &self,
        parent: &ParentResource,
        input: CreateSourceInput,
        actor: &User,
    ) -> Result<Source, ResourceServiceError> {
        self.ensure_can_write(parent, actor).await?;

        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "mnemonic", &input.mnemonic);
        require_text(&mut errors, "name", &input.name);
        errors.into_result()?;

        let parent_ref = parent.resource_ref();
        if self
            .source_repo
            .get_by_parent_and_mnemonic(&parent_ref, &input.mnemonic)
            .await
            .context("Failed to check source mnemonic")?
            .is_some()
        {
            return Err(duplicate_mnemonic(&input.mnemonic, parent).into());
        }

        let mut source = Source::new(input.mnemonic, input.name, actor.id.clone(), parent_ref);
        source.details.full_name = input.full_name;
        source.source_type = input.source_type;
        source.details.public_access = input.public_access.unwrap_or_default();
        source.details.default_locale = input.default_locale;
        source.details.website = input.website;
        source.details.description = input.description;
        if let Some(extras) = input.extras {
            source.base.extras = extras;
        }

        let source = self.source_repo.create(&source).await.map_err(|e| {
            duplicate_or_internal(e, "mnemonic", duplicate_message(&source.sub.mnemonic, parent))
        })?;

        tracing::info!(
            "Source {} created under {} {}",
            source.sub.mnemonic,
            parent.resource_type(),
            parent.mnemonic()
        );
        Ok(source)
    }

    /// Active source by mnemonic within its parent
    pub async fn get(
        &self,
        parent: &ParentResource,
        mnemonic: &str,
    ) -> Result<Source, ResourceServiceError> {
        self.source_repo
            .get_by_parent_and_mnemonic(&parent.resource_ref(), mnemonic)
            .await
            .context("Failed to get source")?
            .filter(|source| source.is_active())
            .ok_or_else(|| {
                ResourceServiceError::NotFound(format!(
                    "Source {} in {}",
                    mnemonic,
                    parent.mnemonic()
                ))
            })
    }

    pub async fn list(
        &self,
        parent: &ParentResource,
        params: &ListParams,
    ) -> Result<PagedResult<Source>, ResourceServiceError> {
        let (sources, total) = self
            .source_repo
            .list_by_parent(&parent.resource_ref(), params)
            .await?;
        Ok(PagedResult::new(sources, total, params))
    }

    pub async fn update(
        &self,
        parent: &ParentResource,
        mnemonic: &str,
        input: UpdateSourceInput,
        actor: &User,
    ) -> Result<Source, ResourceServiceError> {
        self.ensure_can_write(parent, actor).await?;
        let mut source = self.get(parent, mnemonic).await?;

        if let Some(name) = &input.name {
            let mut errors = FieldErrors::new();
            require_text(&mut errors, "name", name);
            errors.into_result()?;
        }

        apply(&mut source.details.name, input.name);
        apply(&mut source.details.public_access, input.public_access);
        if input.full_name.is_some() {
            source.details.full_name = input.full_name;
        }
        if input.source_type.is_some() {
            source.source_type = input.source_type;
        }
        if input.default_locale.is_some() {
            source.details.default_locale = input.default_locale;
        }
        if input.website.is_some() {
            source.details.website = input.website;
        }
        if input.description.is_some() {
            source.details.description = input.description;
        }
        apply(&mut source.base.extras, input.extras);
        source.base.touch();

        Ok(self
            .source_repo
            .update(&source)
            .await
            .context("Failed to update source")?)
    }

    pub async fn soft_delete(
        &self,
        parent: &ParentResource,
        mnemonic: &str,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        self.ensure_can_write(parent, actor).await?;
        let mut source = self.get(parent, mnemonic).await?;

        if source.soft_delete() {
            self.source_repo
                .update(&source)
                .await
                .context("Failed to delete source")?;
            tracing::info!("Source {} deactivated", source.sub.mnemonic);
        }
        Ok(())
    }

    async fn ensure_can_write(
        &self,
        parent: &ParentResource,
        actor: &User,
    ) -> Result<(), ResourceServiceError> {
        if self.resolver.can_write(parent, actor).await? {
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

fn duplicate_message(mnemonic: &str, parent: &ParentResource) -> String {
    format!(
        "Source with mnemonic {} already exists for {}.",
        mnemonic,
        parent.mnemonic()
    )
}

fn duplicate_mnemonic(mnemonic: &str, parent: &ParentResource) -> FieldErrors {
    FieldErrors::single("mnemonic", duplicate_message(mnemonic, parent))
}
