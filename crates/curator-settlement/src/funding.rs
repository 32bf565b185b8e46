//! Campaign funding.
//!
//! A completed checkout adds its amount to both total and available budget,
//! once per checkout session, and reconciles waiting approvals in the same
//! transaction. The first funding moves a draft campaign to `active`.

use std::sync::Arc;

use curator_ingress::BudgetGuard;
use curator_store::{LedgerStore, constraints, with_bounded_retry};
use curator_types::{
    Campaign, CampaignId, CampaignStatus, Cents, CheckoutSessionId, FundingEvent, LedgerError,
    Result, RetryPolicy,
};

use crate::reconciliation::{ReconcileReport, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOutcome {
    /// `false` when the session had already been applied.
    pub applied: bool,
    /// Campaign state after this call.
    pub campaign: Campaign,
    pub reconciled: ReconcileReport,
}

pub struct FundingLedger {
    store: Arc<LedgerStore>,
    retry: RetryPolicy,
}

impl FundingLedger {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Apply a processor funding notification.
    ///
    /// Redelivery of the same `session` is acknowledged without a second
    /// credit.
    pub async fn apply_funding(
        &self,
        session: &CheckoutSessionId,
        campaign: CampaignId,
        amount: Cents,
    ) -> Result<FundingOutcome> {
        with_bounded_retry(&self.retry, "apply_funding", |_| async move {
            match self.apply_once(session, campaign, amount).await {
                Err(LedgerError::UniqueViolation { constraint })
                    if constraint == constraints::FUNDING_SESSION =>
                {
                    Ok(FundingOutcome {
                        applied: false,
                        campaign: self.store.campaign(campaign).await?,
                        reconciled: empty_report(campaign),
                    })
                }
                other => other,
            }
        })
        .await
    }

    async fn apply_once(
        &self,
        session: &CheckoutSessionId,
        campaign: CampaignId,
        amount: Cents,
    ) -> Result<FundingOutcome> {
        let mut txn = self.store.begin(campaign).await?;
        if txn.funding_seen(session) {
            let snapshot = txn.campaign().clone();
            txn.rollback();
            tracing::info!(campaign = %campaign, session = %session, "funding redelivery ignored");
            return Ok(FundingOutcome {
                applied: false,
                campaign: snapshot,
                reconciled: empty_report(campaign),
            });
        }

        BudgetGuard::credit_in(&mut txn, amount)?;
        if txn.campaign().status == CampaignStatus::Draft {
            txn.campaign_mut().status = CampaignStatus::Active;
            tracing::info!(campaign = %campaign, "campaign activated by first funding");
        }
        txn.record_funding(FundingEvent::new(session.clone(), campaign, amount))?;
        let reconciled = Reconciler::reconcile_in(&mut txn)?;
        let snapshot = txn.campaign().clone();
        txn.commit()?;

        tracing::info!(
            campaign = %campaign,
            session = %session,
            amount,
            total = snapshot.budget_total_cents,
            available = snapshot.budget_available_cents,
            "campaign funded"
        );
        Ok(FundingOutcome {
            applied: true,
            campaign: snapshot,
            reconciled,
        })
    }
}

fn empty_report(campaign: CampaignId) -> ReconcileReport {
    ReconcileReport {
        campaign_id: campaign,
        funded: Vec::new(),
        still_unfunded: 0,
    }
}

#[cfg(test)]
mod tests {
    use curator_types::{
        ApprovalMode, ConversionStatus, ConversionType, Conversion, Product, UserId, WithheldReason,
    };

    use super::*;

    async fn draft_campaign() -> (Arc<LedgerStore>, CampaignId) {
        let store = Arc::new(LedgerStore::default());
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let campaign = Campaign::draft(
            product.id,
            "Launch",
            ConversionType::Signup,
            ApprovalMode::Auto,
            2500,
        );
        let id = campaign.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign).unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn funding_is_additive_and_applied_once() {
        let (store, id) = draft_campaign().await;
        let ledger = FundingLedger::new(store.clone(), RetryPolicy::default());
        let session = CheckoutSessionId::new("cs_1");

        assert_eq!(store.campaign(id).await.unwrap().status, CampaignStatus::Draft);
        let first = ledger.apply_funding(&session, id, 10_000).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.campaign.status, CampaignStatus::Active);
        assert_eq!(first.campaign.budget_total_cents, 10_000);
        assert_eq!(first.campaign.budget_available_cents, 10_000);

        let again = ledger.apply_funding(&session, id, 10_000).await.unwrap();
        assert!(!again.applied);
        assert_eq!(again.campaign.budget_total_cents, 10_000);

        ledger
            .apply_funding(&CheckoutSessionId::new("cs_2"), id, 5_000)
            .await
            .unwrap();
        let c = store.campaign(id).await.unwrap();
        assert_eq!(c.budget_total_cents, 15_000);
        assert_eq!(c.budget_available_cents, 15_000);
        assert_eq!(store.funding_for_campaign(id).len(), 2);
    }

    #[tokio::test]
    async fn funding_reconciles_waiting_approvals() {
        let (store, id) = draft_campaign().await;
        let mut waiting = Conversion::dummy(id, ConversionStatus::Pending, 2500);
        waiting.withhold(WithheldReason::InsufficientBudget).unwrap();
        {
            let mut txn = store.begin(id).await.unwrap();
            txn.insert_conversion(waiting.clone()).unwrap();
            txn.commit().unwrap();
        }

        let ledger = FundingLedger::new(store.clone(), RetryPolicy::default());
        let out = ledger
            .apply_funding(&CheckoutSessionId::new("cs_9"), id, 3_000)
            .await
            .unwrap();
        assert_eq!(out.reconciled.funded.len(), 1);
        assert_eq!(out.campaign.budget_available_cents, 500);
        assert_eq!(out.campaign.budget_total_cents, 3_000);
        assert_eq!(store.conversion(waiting.id).unwrap().status, ConversionStatus::Approved);
        assert!(store.payout_for_conversion(waiting.id).is_some());
    }

    #[tokio::test]
    async fn funding_does_not_lift_a_freeze() {
        let (store, id) = draft_campaign().await;
        {
            let mut txn = store.begin(id).await.unwrap();
            txn.campaign_mut().status = CampaignStatus::Paused;
            txn.commit().unwrap();
        }
        let ledger = FundingLedger::new(store.clone(), RetryPolicy::default());
        let out = ledger
            .apply_funding(&CheckoutSessionId::new("cs_p"), id, 1_000)
            .await
            .unwrap();
        assert_eq!(out.campaign.status, CampaignStatus::Paused);
        assert_eq!(out.campaign.budget_available_cents, 1_000);
    }

    #[tokio::test]
    async fn zero_funding_rejected() {
        let (store, id) = draft_campaign().await;
        let ledger = FundingLedger::new(store.clone(), RetryPolicy::default());
        let err = ledger
            .apply_funding(&CheckoutSessionId::new("cs_0"), id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        assert!(store.funding_event(&CheckoutSessionId::new("cs_0")).is_none());
    }
}
