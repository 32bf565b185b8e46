//! Identifiers used throughout the ledger.
//!
//! Entity IDs use UUIDv7 for time-ordered lexicographic sorting. Tokens that
//! arrive from outside (ref codes, idempotency keys, processor ids) are
//! string newtypes so they cannot be mixed up at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user (creator, builder, or admin) as issued by
    /// the identity provider and mapped into the ledger.
    UserId,
    "user"
);

uuid_id!(
    /// Unique identifier for a builder's product.
    ProductId,
    "product"
);

uuid_id!(
    /// Unique identifier for a campaign.
    CampaignId,
    "campaign"
);

uuid_id!(
    /// Unique identifier for a creator/campaign partnership.
    PartnershipId,
    "partnership"
);

uuid_id!(
    /// Unique identifier for a recorded conversion event.
    ConversionId,
    "conversion"
);

uuid_id!(
    /// Unique identifier for a payout owed to a creator.
    PayoutId,
    "payout"
);

string_id!(
    /// Short token identifying a partnership. Used to attribute conversions
    /// and click redirects.
    RefCode
);

string_id!(
    /// Caller-supplied token that collapses retried submissions into one
    /// logical conversion.
    IdempotencyKey
);

string_id!(
    /// Identifier of a completed checkout session at the payment processor.
    /// One funding event per session.
    CheckoutSessionId
);

string_id!(
    /// Identifier the payment processor returns for a completed transfer.
    TransferId
);

string_id!(
    /// A creator's connected payout account at the payment processor.
    DestinationAccount
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique_and_ordered() {
        let a = ConversionId::new();
        let b = ConversionId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn display_carries_entity_prefix() {
        let id = PayoutId::new();
        assert!(id.to_string().starts_with("payout:"));
        let id = CampaignId::new();
        assert!(id.to_string().starts_with("campaign:"));
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let code = RefCode::new("k3x9abcdef");
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"k3x9abcdef\"");
        assert_eq!(code.as_str(), "k3x9abcdef");
    }

    #[test]
    fn uuid_ids_serialize_as_bare_uuid() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert!(!json.contains("user:"));
    }
}
