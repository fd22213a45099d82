//! User model
//!
//! A user is a top-level resource: its username doubles as the mnemonic and
//! is unique across all users. Users own sub-resources and hold one API
//! token each.

use serde::{Deserialize, Serialize};

use super::base::{BaseFields, Record};
use super::resource::ResourceType;
use super::API_BASE;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID string)
    pub id: String,
    /// Login name, also the user's mnemonic
    pub username: String,
    pub email: String,
    /// Display name
    pub name: String,
    pub company: Option<String>,
    pub location: Option<String>,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Staff users may administer any organization
    pub is_staff: bool,
    #[serde(flatten)]
    pub base: BaseFields,
}

impl User {
    /// Build a new, unsaved user. The password must already be hashed.
    pub fn new(username: String, email: String, name: String, password_hash: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            email,
            name,
            company: None,
            location: None,
            password_hash,
            is_staff: false,
            base: BaseFields::new(),
        }
    }

    pub fn mnemonic(&self) -> &str {
        &self.username
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::User
    }

    /// Path of the user's detail endpoint
    pub fn url(&self) -> String {
        format!("{}/users/{}", API_BASE, self.username)
    }
}

impl Record for User {
    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "jdoe".to_string(),
            "jdoe@example.org".to_string(),
            "Jane Doe".to_string(),
            "$argon2id$stub".to_string(),
        );

        assert_eq!(user.id.len(), 36);
        assert_eq!(user.mnemonic(), "jdoe");
        assert_eq!(user.url(), "/api/v1/users/jdoe");
        assert!(!user.is_staff);
        assert!(user.is_active());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a".into(), "a@x.org".into(), "A".into(), "secret-hash".into());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["is_active"], serde_json::json!(true));
    }
}
