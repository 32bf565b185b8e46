//! Partnership onboarding and click attribution.

use std::sync::Arc;

use chrono::Utc;
use curator_store::{LedgerStore, constraints, with_bounded_retry};
use curator_types::{
    CampaignId, ClickEvent, CredentialConfig, LedgerError, Partnership, PartnershipId,
    PartnershipStatus, RefCode, Result, RetryPolicy, UserId,
};

use crate::credentials::hash_client_value;
use crate::ref_code::generate_ref_code;

/// Where a referral click should be redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRedirect {
    pub campaign_id: CampaignId,
    pub ref_code: RefCode,
    /// Product URL tagged with attribution query parameters.
    pub target_url: String,
}

pub struct Partnerships {
    store: Arc<LedgerStore>,
    retry: RetryPolicy,
    ref_code_length: usize,
}

impl Partnerships {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, retry: RetryPolicy, credentials: &CredentialConfig) -> Self {
        Self {
            store,
            retry,
            ref_code_length: credentials.ref_code_length,
        }
    }

    /// Invite a creator to a campaign.
    ///
    /// Terms are snapshotted from the campaign at invite time. Re-inviting
    /// returns the existing partnership unchanged. Ref code collisions are
    /// retried with a fresh code up to the retry policy's attempt count.
    pub async fn invite(&self, campaign_id: CampaignId, creator: UserId) -> Result<Partnership> {
        let partnership = with_bounded_retry(&self.retry, "invite_creator", |attempt| async move {
            if let Some(existing) = self.store.partnership_for(campaign_id, creator) {
                return Ok(existing);
            }
            let campaign = self.store.campaign(campaign_id).await?;
            let partnership =
                Partnership::invite(&campaign, creator, generate_ref_code(self.ref_code_length));
            match self.store.insert_partnership(partnership.clone()) {
                Ok(()) => Ok(partnership),
                Err(LedgerError::UniqueViolation { constraint })
                    if constraint == constraints::PARTNERSHIP_MEMBER =>
                {
                    // Lost an invite race for the same creator.
                    self.store
                        .partnership_for(campaign_id, creator)
                        .ok_or(LedgerError::PartnershipNotFound)
                }
                Err(err) => {
                    tracing::debug!(campaign = %campaign_id, attempt, error = %err, "invite insert failed");
                    Err(err)
                }
            }
        })
        .await?;

        tracing::info!(
            campaign = %campaign_id,
            creator = %creator,
            partnership = %partnership.id,
            ref_code = %partnership.ref_code,
            "creator invited"
        );
        Ok(partnership)
    }

    /// Creator accepts their own invitation.
    pub fn accept(&self, partnership: PartnershipId, creator: UserId) -> Result<Partnership> {
        let accepted =
            self.store
                .set_partnership_status(partnership, creator, PartnershipStatus::Active)?;
        tracing::info!(partnership = %accepted.id, creator = %creator, "partnership accepted");
        Ok(accepted)
    }

    /// Log a click on a referral link and build the redirect target.
    ///
    /// IP and user agent are stored hashed only.
    pub fn record_click(
        &self,
        ref_code: &RefCode,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<ClickRedirect> {
        let partnership = self
            .store
            .partnership_by_ref(ref_code)
            .ok_or_else(|| LedgerError::RefCodeNotFound(ref_code.clone()))?;
        let campaign_product = self.campaign_product_url(partnership.campaign_id)?;

        self.store.record_click(ClickEvent {
            ref_code: ref_code.clone(),
            ip_hash: hash_client_value(ip),
            user_agent_hash: hash_client_value(user_agent),
            at: Utc::now(),
        });

        Ok(ClickRedirect {
            campaign_id: partnership.campaign_id,
            ref_code: ref_code.clone(),
            target_url: attribution_url(&campaign_product, partnership.campaign_id, ref_code),
        })
    }

    fn campaign_product_url(&self, campaign: CampaignId) -> Result<String> {
        let product = self
            .store
            .product_for_campaign(campaign)
            .ok_or(LedgerError::CampaignNotFound(campaign))?;
        Ok(product.url)
    }
}

fn attribution_url(base: &str, campaign: CampaignId, ref_code: &RefCode) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{sep}utm_source=curatormarket&utm_medium=creator&utm_campaign={}&ref={ref_code}",
        campaign.0
    )
}
