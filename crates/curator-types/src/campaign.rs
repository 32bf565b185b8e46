//! Campaign model: what a builder pays for, and the budget it pays from.
//!
//! ## Budget invariant
//!
//! ```text
//! 0 ≤ budget_available_cents ≤ budget_total_cents
//! ```
//!
//! `budget_total_cents` only grows (funding). `budget_available_cents` grows
//! with funding and shrinks by exactly one CPA per issued payout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, Cents, LedgerError, ProductId, Result};

/// The single event type a campaign pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    Signup,
    Activation,
}

impl std::fmt::Display for ConversionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signup => write!(f, "signup"),
            Self::Activation => write!(f, "activation"),
        }
    }
}

impl std::str::FromStr for ConversionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "signup" => Ok(Self::Signup),
            "activation" => Ok(Self::Activation),
            other => Err(LedgerError::InvalidRequest {
                reason: format!("unknown event_type {other:?}"),
            }),
        }
    }
}

/// Whether conversions are approved on arrival or wait for the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Auto,
    Manual,
}

/// Campaign lifecycle. The first funding moves `draft` to `active`; an
/// administrator freeze moves `draft` or `active` to `paused`.
///
/// ```text
///   DRAFT ──▶ ACTIVE ◀──▶ PAUSED
///     │         │           │
///     └─────────┴─────┬─────┘
///                     ▼
///                   ENDED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    /// Frozen by an administrator. Conversions are still recorded, but no
    /// new payouts are issued.
    Paused,
    Ended,
}

impl CampaignStatus {
    /// Whether a campaign in this status may debit budget for a payout.
    #[must_use]
    pub fn issues_payouts(self) -> bool {
        matches!(self, Self::Draft | Self::Active)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// A CPA campaign owned by a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub product_id: ProductId,
    pub title: String,
    pub conversion_type: ConversionType,
    pub approval_mode: ApprovalMode,
    /// Fixed payout per approved conversion, as offered to newly invited
    /// creators. Existing partnerships keep their own snapshot.
    pub cpa_amount_cents: Cents,
    pub budget_total_cents: Cents,
    pub budget_available_cents: Cents,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a draft campaign with zero budget.
    #[must_use]
    pub fn draft(
        product_id: ProductId,
        title: impl Into<String>,
        conversion_type: ConversionType,
        approval_mode: ApprovalMode,
        cpa_amount_cents: Cents,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::new(),
            product_id,
            title: title.into(),
            conversion_type,
            approval_mode,
            cpa_amount_cents,
            budget_total_cents: 0,
            budget_available_cents: 0,
            status: CampaignStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check `0 ≤ available ≤ total`. The lower bound is guaranteed by the
    /// unsigned type.
    pub fn check_budget_bounds(&self) -> Result<()> {
        if self.budget_available_cents > self.budget_total_cents {
            return Err(LedgerError::BudgetInvariantViolation {
                reason: format!(
                    "{}: available {} exceeds total {}",
                    self.id, self.budget_available_cents, self.budget_total_cents
                ),
            });
        }
        Ok(())
    }

    /// Budget already committed to payouts.
    #[must_use]
    pub fn budget_spent_cents(&self) -> Cents {
        self.budget_total_cents
            .saturating_sub(self.budget_available_cents)
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Campaign {
    /// An active, auto-approving signup campaign with the given funding.
    pub fn dummy_funded(cpa_amount_cents: Cents, budget_cents: Cents) -> Self {
        let mut campaign = Self::draft(
            ProductId::new(),
            "dummy campaign",
            ConversionType::Signup,
            ApprovalMode::Auto,
            cpa_amount_cents,
        );
        campaign.status = CampaignStatus::Active;
        campaign.budget_total_cents = budget_cents;
        campaign.budget_available_cents = budget_cents;
        campaign
    }
}
