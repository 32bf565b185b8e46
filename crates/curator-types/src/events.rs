//! Inbound events that are not conversions: campaign funding and referral
//! clicks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, Cents, CheckoutSessionId, RefCode};

/// Money collected by the processor's checkout for a campaign, delivered
/// through a verified webhook. Applied at most once per checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingEvent {
    pub checkout_session_id: CheckoutSessionId,
    pub campaign_id: CampaignId,
    pub amount_cents: Cents,
    pub received_at: DateTime<Utc>,
}

impl FundingEvent {
    #[must_use]
    pub fn new(
        checkout_session_id: CheckoutSessionId,
        campaign_id: CampaignId,
        amount_cents: Cents,
    ) -> Self {
        Self {
            checkout_session_id,
            campaign_id,
            amount_cents,
            received_at: Utc::now(),
        }
    }
}

/// A referral link visit. Client details are stored hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub ref_code: RefCode,
    pub ip_hash: Option<String>,
    pub user_agent_hash: Option<String>,
    pub at: DateTime<Utc>,
}
