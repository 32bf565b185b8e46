//! Error types for the Curator settlement ledger.
//!
//! All errors use the `CL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Authentication / authorization errors
//! - 2xx: Not-found errors
//! - 3xx: Validation errors
//! - 4xx: Conflict errors
//! - 5xx: Budget errors
//! - 6xx: Settlement errors
//! - 7xx: Storage errors
//! - 8xx: Throttling errors
//! - 9xx: General / internal errors

use serde::Serialize;
use thiserror::Error;

use crate::{CampaignId, CampaignStatus, Cents, ConversionId, ConversionType, PayoutId, RefCode};

/// Coarse error category, mirroring how callers are expected to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing credential, or insufficient role.
    Auth,
    /// Unknown ref code, campaign, conversion, or payout.
    NotFound,
    /// Schema violation, event-type mismatch, cross-tenant ref code.
    Validation,
    /// Uniqueness conflict. Conversion submission recovers these locally.
    Conflict,
    /// Budget exhausted or campaign frozen.
    Budget,
    /// Payment processor rejected or timed out.
    ExternalTransfer,
    /// Transaction could not complete (lock timeout, connection loss).
    Storage,
    /// Request rate exceeded.
    RateLimited,
    /// Anything else.
    Internal,
}

/// Central error enum for all ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =================================================================
    // Auth Errors (1xx)
    // =================================================================
    /// No API key or session was presented.
    #[error("CL_ERR_100: Missing credential")]
    MissingCredential,

    /// The presented API key matches no product.
    #[error("CL_ERR_101: Invalid credential")]
    InvalidCredential,

    /// No authenticated user.
    #[error("CL_ERR_102: Unauthorized")]
    Unauthorized,

    /// Authenticated, but the role is not permitted for this operation.
    #[error("CL_ERR_103: Forbidden")]
    Forbidden,

    // =================================================================
    // Not Found Errors (2xx)
    // =================================================================
    /// The ref code does not identify any partnership.
    #[error("CL_ERR_200: Unknown ref code: {0}")]
    RefCodeNotFound(RefCode),

    /// The campaign does not exist.
    #[error("CL_ERR_201: Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// The conversion does not exist or is not visible to the caller.
    #[error("CL_ERR_202: Conversion not found: {0}")]
    ConversionNotFound(ConversionId),

    /// The payout does not exist.
    #[error("CL_ERR_203: Payout not found: {0}")]
    PayoutNotFound(PayoutId),

    /// The partnership does not exist or is not visible to the caller.
    #[error("CL_ERR_204: Partnership not found")]
    PartnershipNotFound,

    /// The product does not exist or is not visible to the caller.
    #[error("CL_ERR_205: Product not found")]
    ProductNotFound,

    // =================================================================
    // Validation Errors (3xx)
    // =================================================================
    /// The request failed schema validation.
    #[error("CL_ERR_300: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The ref code belongs to a campaign of another product.
    #[error("CL_ERR_301: ref_code does not belong to this product")]
    CrossTenant,

    /// The event type differs from the campaign's declared conversion type.
    #[error("CL_ERR_302: event_type mismatch for campaign: expected {expected}, got {actual}")]
    EventTypeMismatch {
        expected: ConversionType,
        actual: ConversionType,
    },

    /// A money amount was zero where a positive amount is required, or
    /// arithmetic on it would overflow.
    #[error("CL_ERR_303: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // Conflict Errors (4xx)
    // =================================================================
    /// An insert violated a uniqueness constraint.
    #[error("CL_ERR_400: Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: &'static str },

    /// A bounded retry loop gave up.
    #[error("CL_ERR_401: {operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: String,
    },

    /// A state transition was requested that the state machine forbids.
    #[error("CL_ERR_402: Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // =================================================================
    // Budget Errors (5xx)
    // =================================================================
    /// Not enough available budget for the debit.
    #[error("CL_ERR_500: Insufficient budget: need {needed}, have {available}")]
    InsufficientBudget { needed: Cents, available: Cents },

    /// The campaign is paused or ended and issues no payouts.
    #[error("CL_ERR_501: Campaign {campaign} is {status}; payouts are frozen")]
    CampaignFrozen {
        campaign: CampaignId,
        status: CampaignStatus,
    },

    /// Budget conservation invariant violated. Critical.
    #[error("CL_ERR_502: Budget invariant violation: {reason}")]
    BudgetInvariantViolation { reason: String },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// The payment processor rejected or timed out on a transfer.
    #[error("CL_ERR_600: External transfer failed: {reason}")]
    ExternalTransfer { reason: String },

    // =================================================================
    // Storage Errors (7xx)
    // =================================================================
    /// Waiting for a campaign row lock exceeded the configured timeout.
    #[error("CL_ERR_700: Lock timeout on {0}")]
    LockTimeout(CampaignId),

    /// The transaction was aborted before commit.
    #[error("CL_ERR_701: Transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    /// The store cannot be reached.
    #[error("CL_ERR_702: Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    // =================================================================
    // Throttling Errors (8xx)
    // =================================================================
    /// The client exceeded the request rate.
    #[error("CL_ERR_800: Rate limited: {key}")]
    RateLimited { key: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, bad values).
    #[error("CL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("CL_ERR_903: I/O error: {0}")]
    Io(String),
}

impl LedgerError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential | Self::InvalidCredential | Self::Unauthorized | Self::Forbidden => {
                ErrorKind::Auth
            }
            Self::RefCodeNotFound(_)
            | Self::CampaignNotFound(_)
            | Self::ConversionNotFound(_)
            | Self::PayoutNotFound(_)
            | Self::PartnershipNotFound
            | Self::ProductNotFound => ErrorKind::NotFound,
            Self::InvalidRequest { .. }
            | Self::CrossTenant
            | Self::EventTypeMismatch { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidTransition { .. } => ErrorKind::Validation,
            Self::UniqueViolation { .. } | Self::RetriesExhausted { .. } => ErrorKind::Conflict,
            Self::InsufficientBudget { .. } | Self::CampaignFrozen { .. } => ErrorKind::Budget,
            Self::ExternalTransfer { .. } => ErrorKind::ExternalTransfer,
            Self::LockTimeout(_) | Self::TransactionAborted { .. } | Self::StorageUnavailable { .. } => {
                ErrorKind::Storage
            }
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::BudgetInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the whole operation may be retried as-is.
    ///
    /// Every mutating ledger operation is re-entrant under its own dedup
    /// key, so storage failures and insert conflicts are retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout(_)
                | Self::TransactionAborted { .. }
                | Self::StorageUnavailable { .. }
                | Self::UniqueViolation { .. }
        )
    }

    /// Stable code (e.g. `CL_ERR_302`) for wire responses.
    #[must_use]
    pub fn code(&self) -> String {
        let rendered = self.to_string();
        rendered
            .split_once(':')
            .map_or_else(|| rendered.clone(), |(code, _)| code.to_owned())
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
