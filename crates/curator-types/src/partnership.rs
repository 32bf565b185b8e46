//! Partnership model: one creator promoting one campaign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ApprovalMode, Campaign, CampaignId, Cents, ConversionType, PartnershipId, RefCode, UserId};

/// Partnership lifecycle: `INVITED → ACTIVE → ENDED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnershipStatus {
    Invited,
    Active,
    Ended,
}

impl PartnershipStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Invited, Self::Active | Self::Ended) | (Self::Active, Self::Ended)
        )
    }
}

/// Immutable copy of the campaign terms at invite time.
///
/// Conversions snapshot their payout from here, so a later CPA change on the
/// campaign never alters what an existing partnership earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsSnapshot {
    pub cpa_amount_cents: Cents,
    pub conversion_type: ConversionType,
    pub approval_mode: ApprovalMode,
}

impl From<&Campaign> for TermsSnapshot {
    fn from(campaign: &Campaign) -> Self {
        Self {
            cpa_amount_cents: campaign.cpa_amount_cents,
            conversion_type: campaign.conversion_type,
            approval_mode: campaign.approval_mode,
        }
    }
}

/// Binding of a creator to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partnership {
    pub id: PartnershipId,
    pub campaign_id: CampaignId,
    pub creator_user_id: UserId,
    pub ref_code: RefCode,
    pub status: PartnershipStatus,
    pub terms: TermsSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partnership {
    /// A fresh invitation carrying the campaign's current terms.
    #[must_use]
    pub fn invite(campaign: &Campaign, creator_user_id: UserId, ref_code: RefCode) -> Self {
        let now = Utc::now();
        Self {
            id: PartnershipId::new(),
            campaign_id: campaign.id,
            creator_user_id,
            ref_code,
            status: PartnershipStatus::Invited,
            terms: TermsSnapshot::from(campaign),
            created_at: now,
            updated_at: now,
        }
    }
}
