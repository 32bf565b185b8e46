//! Products: the builder-side tenant that owns campaigns and holds the
//! conversion API credential.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ProductId, UserId};

/// SHA-256 hex digest of a token. Only digests of credentials and end-user
/// identifiers are ever persisted.
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of a product's conversion API key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyHash(String);

impl ApiKeyHash {
    /// Hash a raw API key token.
    #[must_use]
    pub fn of_token(token: &str) -> Self {
        Self(sha256_hex(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A builder's product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub owner_user_id: UserId,
    pub name: String,
    pub url: String,
    pub api_key_hash: Option<ApiKeyHash>,
}

impl Product {
    #[must_use]
    pub fn new(owner_user_id: UserId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(),
            owner_user_id,
            name: name.into(),
            url: url.into(),
            api_key_hash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let digest = sha256_hex("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn api_key_hash_never_contains_token() {
        let hash = ApiKeyHash::of_token("sm_secret");
        assert!(!hash.as_str().contains("secret"));
        assert_eq!(hash, ApiKeyHash::of_token("sm_secret"));
        assert_ne!(hash, ApiKeyHash::of_token("sm_other"));
    }
}
