//! Inbound conversion event shape.

use curator_types::{ConversionType, IdempotencyKey, LedgerError, RefCode, Result, constants};

use crate::credentials::hash_external_user;

/// Raw conversion event as received from a builder's backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversionRequest {
    pub ref_code: String,
    pub event_type: String,
    pub external_user_id: Option<String>,
    pub idempotency_key: Option<String>,
}

/// A request that passed [`ConversionRequest::validate`].
///
/// The external user id is already hashed; the raw value goes no further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConversion {
    pub ref_code: RefCode,
    pub event_type: ConversionType,
    pub external_user_hash: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ConversionRequest {
    pub fn new(ref_code: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            ref_code: ref_code.into(),
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_external_user(mut self, id: impl Into<String>) -> Self {
        self.external_user_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Check field bounds and parse the event type.
    ///
    /// # Errors
    /// [`LedgerError::InvalidRequest`] naming the first offending field.
    pub fn validate(&self) -> Result<ValidatedConversion> {
        let ref_code = self.ref_code.trim();
        if ref_code.chars().count() < constants::MIN_REF_CODE_LEN {
            return Err(invalid(format!(
                "ref_code must be at least {} characters",
                constants::MIN_REF_CODE_LEN
            )));
        }
        let event_type: ConversionType = self.event_type.parse()?;

        if let Some(id) = &self.external_user_id {
            if id.chars().count() > constants::MAX_EXTERNAL_USER_ID_LEN {
                return Err(invalid(format!(
                    "external_user_id exceeds {} characters",
                    constants::MAX_EXTERNAL_USER_ID_LEN
                )));
            }
        }
        let idempotency_key = match &self.idempotency_key {
            Some(key) if key.is_empty() => {
                return Err(invalid("idempotency_key must not be empty".to_owned()));
            }
            Some(key) if key.chars().count() > constants::MAX_IDEMPOTENCY_KEY_LEN => {
                return Err(invalid(format!(
                    "idempotency_key exceeds {} characters",
                    constants::MAX_IDEMPOTENCY_KEY_LEN
                )));
            }
            Some(key) => Some(IdempotencyKey::new(key.clone())),
            None => None,
        };

        Ok(ValidatedConversion {
            ref_code: RefCode::new(ref_code),
            event_type,
            external_user_hash: self.external_user_id.as_deref().map(hash_external_user),
            idempotency_key,
        })
    }
}

fn invalid(reason: String) -> LedgerError {
    LedgerError::InvalidRequest { reason }
}
