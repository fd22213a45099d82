//! User service
//!
//! Account creation, login and token authentication. Every user gets
//! exactly one API token, created right after the user row as part of
//! [`UserService::create_user`]. The first account becomes staff.

use crate::db::repositories::{is_unique_violation, AuthTokenRepository, UserRepository};
use crate::models::{
    validate_mnemonic, AuthToken, Extras, FieldErrors, ListParams, PagedResult, Record, User,
};
use crate::services::apply;
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Field-level validation failure
    #[error("Validation failed: {0}")]
    Validation(#[from] FieldErrors),

    /// Bad credentials or unknown token
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

/// Profile changes for the authenticated user; `None` keeps the stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extras: Option<Extras>,
}

/// User service for accounts and API tokens
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn AuthTokenRepository>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        token_repo: Arc<dyn AuthTokenRepository>,
    ) -> Self {
        Self {
            user_repo,
            token_repo,
        }
    }

    /// Create a user and provision its API token.
    ///
    /// Either write failing is returned to the caller. A user row whose
    /// token insert failed is left in place; [`UserService::login`] issues
    /// the missing token later.
    pub async fn create_user(
        &self,
        input: CreateUserInput,
    ) -> Result<(User, AuthToken), UserServiceError> {
        self.validate_create_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(duplicate_username(&input.username).into());
        }

        let is_first = self.is_first_user().await?;
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let mut user = User::new(
            input.username,
            input.email,
            input.name.unwrap_or_default(),
            password_hash,
        );
        user.company = input.company;
        user.location = input.location;
        user.is_staff = is_first;
        if let Some(extras) = input.extras {
            user.base.extras = extras;
        }

        let user = match self.user_repo.create(&user).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(duplicate_username(&user.username).into())
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        let token = self.provision_token(&user).await?;
        if user.is_staff {
            tracing::info!("Created user {} as staff", user.username);
        } else {
            tracing::info!("Created user {}", user.username);
        }

        Ok((user, token))
    }

    async fn provision_token(&self, user: &User) -> Result<AuthToken, UserServiceError> {
        let token = AuthToken::generate(user.id.clone());
        let token = self
            .token_repo
            .create(&token)
            .await
            .with_context(|| format!("Failed to create auth token for {}", user.username))?;
        Ok(token)
    }

    /// Whether no active account exists yet
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    fn validate_create_input(&self, input: &CreateUserInput) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "username", &input.username);
        validate_email(&mut errors, &input.email);
        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!(
                    "Ensure this field has at least {} characters.",
                    MIN_PASSWORD_LENGTH
                ),
            );
        }
        errors.into_result()
    }

    /// Exchange credentials for the user's token
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthToken, UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?
            .filter(|user| user.is_active())
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash).context("Failed to verify password")? {
            tracing::debug!("Rejected login for {}", username);
            return Err(invalid());
        }

        match self
            .token_repo
            .get_by_user(&user.id)
            .await
            .context("Failed to look up auth token")?
        {
            Some(token) => Ok(token),
            None => self.provision_token(&user).await,
        }
    }

    /// Apply profile changes to `user` and persist them
    pub async fn update_profile(
        &self,
        mut user: User,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        if let Some(email) = &input.email {
            let mut errors = FieldErrors::new();
            validate_email(&mut errors, email);
            errors.into_result()?;
        }

        apply(&mut user.name, input.name);
        apply(&mut user.email, input.email.map(|email| email.trim().to_string()));
        if input.company.is_some() {
            user.company = input.company;
        }
        if input.location.is_some() {
            user.location = input.location;
        }
        apply(&mut user.base.extras, input.extras);
        user.base.touch();

        Ok(self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?)
    }

    /// Resolve a token key to its active owner
    pub async fn authenticate(&self, key: &str) -> Result<User, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid token".to_string());

        let token = self
            .token_repo
            .get_by_key(key)
            .await
            .context("Failed to look up auth token")?
            .ok_or_else(invalid)?;

        self.user_repo
            .get_by_id(&token.user_id)
            .await
            .context("Failed to load token owner")?
            .filter(|user| user.is_active())
            .ok_or_else(invalid)
    }

    /// Active user by username
    pub async fn get_by_username(&self, username: &str) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user")?
            .filter(|user| user.is_active())
            .ok_or_else(|| UserServiceError::NotFound(username.to_string()))
    }

    /// Any user by ID, used to render owner links
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self.user_repo.list(params).await?;
        Ok(PagedResult::new(users, total, params))
    }
}

fn validate_email(errors: &mut FieldErrors, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.add("email", "This field is required.");
    } else if !email.contains('@') {
        errors.add("email", "Enter a valid email address.");
    }
}

fn duplicate_username(username: &str) -> FieldErrors {
    FieldErrors::single(
        "username",
        format!("User with username {} already exists.", username),
    )
}
