//! Freeze and resume of campaign payout issuance.
//!
//! A frozen (`paused`) campaign keeps accepting conversions but debits
//! nothing: approvals land in `approved_unfunded`. Resuming reactivates the
//! campaign and reconciles what accumulated in the meantime.

use std::sync::Arc;

use curator_store::LedgerStore;
use curator_types::{Campaign, CampaignId, CampaignStatus, LedgerError, Result};

use crate::reconciliation::{ReconcileReport, Reconciler};

pub struct CampaignControl {
    store: Arc<LedgerStore>,
}

impl CampaignControl {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Stop payout issuance. Freezing a paused or ended campaign changes
    /// nothing.
    pub async fn freeze(&self, campaign: CampaignId) -> Result<Campaign> {
        let mut txn = self.store.begin(campaign).await?;
        let before = txn.campaign().status;
        if before.issues_payouts() {
            txn.campaign_mut().status = CampaignStatus::Paused;
        }
        let snapshot = txn.campaign().clone();
        txn.commit()?;
        tracing::info!(campaign = %campaign, from = %before, to = %snapshot.status, "campaign frozen");
        Ok(snapshot)
    }

    /// Lift a freeze and fund waiting approvals in the same transaction.
    pub async fn resume(&self, campaign: CampaignId) -> Result<(Campaign, ReconcileReport)> {
        let mut txn = self.store.begin(campaign).await?;
        match txn.campaign().status {
            CampaignStatus::Paused => txn.campaign_mut().status = CampaignStatus::Active,
            CampaignStatus::Ended => {
                return Err(LedgerError::InvalidTransition {
                    from: CampaignStatus::Ended.to_string(),
                    to: CampaignStatus::Active.to_string(),
                });
            }
            CampaignStatus::Draft | CampaignStatus::Active => {}
        }
        let report = Reconciler::reconcile_in(&mut txn)?;
        let snapshot = txn.campaign().clone();
        txn.commit()?;
        tracing::info!(
            campaign = %campaign,
            status = %snapshot.status,
            funded = report.funded.len(),
            "campaign resumed"
        );
        Ok((snapshot, report))
    }
}
