//! # Conversion: one attributed user action
//!
//! ## State Machine
//!
//! ```text
//!                 approve (funds)     ┌──────────┐
//!   ┌─────────┐ ─────────────────────▶│ APPROVED │
//!   │ PENDING │                       └──────────┘
//!   └──┬───┬──┘  approve (no funds)        ▲
//!      │   └──────────────┐                │ reconcile (funds arrive)
//!      │ reject           ▼                │
//!      ▼          ┌───────────────────┐    │
//!  ┌──────────┐   │ APPROVED_UNFUNDED ├────┘
//!  │ REJECTED │   └───────────────────┘
//!  └──────────┘
//! ```
//!
//! Auto-approving campaigns skip `PENDING` and land directly in `APPROVED`
//! or `APPROVED_UNFUNDED`. Approval is a quality judgement; funding only
//! gates whether a payout exists. A conversion is never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CampaignId, Cents, ConversionId, ConversionType, IdempotencyKey, LedgerError, PartnershipId,
    Result, UserId,
};

/// Lifecycle state of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Awaiting a manual decision from the builder.
    Pending,
    /// Approved and backed by a payout.
    Approved,
    /// Approved, but no payout could be issued at decision time.
    ApprovedUnfunded,
    /// Rejected by the builder. Terminal.
    Rejected,
}

impl ConversionStatus {
    /// Can a conversion move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Pending,
                Self::Approved | Self::ApprovedUnfunded | Self::Rejected
            ) | (Self::ApprovedUnfunded, Self::Approved)
        )
    }

    /// Approved, funded or not.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedUnfunded)
    }
}

impl std::fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::ApprovedUnfunded => write!(f, "approved_unfunded"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Why an approved conversion has no payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithheldReason {
    InsufficientBudget,
    CampaignFrozen,
}

impl std::fmt::Display for WithheldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientBudget => write!(f, "insufficient_budget"),
            Self::CampaignFrozen => write!(f, "campaign_frozen"),
        }
    }
}

/// A recorded conversion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: ConversionId,
    pub partnership_id: PartnershipId,
    /// Denormalized from the partnership; every write to this row happens
    /// under this campaign's lock.
    pub campaign_id: CampaignId,
    pub creator_user_id: UserId,
    pub event_type: ConversionType,
    /// SHA-256 hex of the product's end-user id. The raw id is never stored.
    pub external_user_hash: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub status: ConversionStatus,
    /// CPA captured at event time. Never recomputed.
    pub payout_amount_cents: Cents,
    /// Set exactly when `status == ApprovedUnfunded`.
    pub withheld: Option<WithheldReason>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Conversion {
    /// Move to `target`, enforcing the state machine.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidTransition`] for forbidden moves.
    pub fn transition(&mut self, target: ConversionStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.decided_at = Some(Utc::now());
        if target != ConversionStatus::ApprovedUnfunded {
            self.withheld = None;
        }
        Ok(())
    }

    /// Record approval without a payout.
    pub fn withhold(&mut self, reason: WithheldReason) -> Result<()> {
        if self.status != ConversionStatus::ApprovedUnfunded {
            self.transition(ConversionStatus::ApprovedUnfunded)?;
        }
        self.withheld = Some(reason);
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Conversion {
    /// A conversion in the given status for unit tests.
    pub fn dummy(campaign_id: CampaignId, status: ConversionStatus, amount: Cents) -> Self {
        Self {
            id: ConversionId::new(),
            partnership_id: PartnershipId::new(),
            campaign_id,
            creator_user_id: UserId::new(),
            event_type: ConversionType::Signup,
            external_user_hash: None,
            idempotency_key: None,
            status,
            payout_amount_cents: amount,
            withheld: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}
