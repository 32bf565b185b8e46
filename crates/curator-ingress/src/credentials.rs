//! API key issuance and one-way hashing of caller-supplied identifiers.
//!
//! Raw API keys are returned exactly once, at issuance. The store only ever
//! sees [`ApiKeyHash`]. External user ids, client IPs, and user agents are
//! reduced to SHA-256 hex before they reach any row.

use curator_types::{ApiKeyHash, constants, sha256_hex};
use rand::RngCore;

/// A freshly generated API key. `token` must be shown to the builder once
/// and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedApiKey {
    pub token: String,
    pub hash: ApiKeyHash,
}

/// Generate `<prefix>_<48 hex chars>` from 24 random bytes.
#[must_use]
pub fn new_api_key(prefix: &str) -> IssuedApiKey {
    let mut raw = [0u8; constants::API_KEY_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = format!("{prefix}_{}", hex::encode(raw));
    let hash = ApiKeyHash::of_token(&token);
    IssuedApiKey { token, hash }
}

#[must_use]
pub fn hash_external_user(external_user_id: &str) -> String {
    sha256_hex(external_user_id)
}

/// Hash an optional client attribute (IP, user agent) for click logging.
#[must_use]
pub fn hash_client_value(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(sha256_hex)
}
