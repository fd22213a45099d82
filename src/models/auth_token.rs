//! API token model

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a token key (hex doubles it to 40 chars)
const TOKEN_BYTES: usize = 20;

/// The single API token belonging to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    /// 40 lowercase hex characters
    pub key: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuthToken {
    /// Generate a fresh random token for a user
    pub fn generate(user_id: impl Into<String>) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            key: HEXLOWER.encode(&bytes),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_shape() {
        let token = AuthToken::generate("user-1");
        assert_eq!(token.key.len(), 40);
        assert!(token
            .key
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(token.user_id, "user-1");
    }

    #[test]
    fn test_generate_keys_differ() {
        assert_ne!(AuthToken::generate("u").key, AuthToken::generate("u").key);
    }
}
