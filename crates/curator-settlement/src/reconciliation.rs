//! Reconciliation of `approved_unfunded` conversions.
//!
//! Runs when money appears or a freeze lifts: after funding is applied,
//! after a campaign resumes, or on an admin request. Walks the campaign's
//! unfunded conversions oldest first and funds each one the budget can
//! cover, stopping at the first it cannot. Order of arrival is order of
//! payment.

use std::sync::Arc;

use curator_ingress::{BudgetGuard, DebitOutcome};
use curator_store::{CampaignTxn, LedgerStore};
use curator_types::{CampaignId, ConversionStatus, Payout, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub campaign_id: CampaignId,
    /// Payouts created by this pass, oldest conversion first.
    pub funded: Vec<Payout>,
    /// Conversions still waiting for budget.
    pub still_unfunded: usize,
}

pub struct Reconciler {
    store: Arc<LedgerStore>,
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Reconcile inside a caller's transaction (funding, resume).
    pub fn reconcile_in(txn: &mut CampaignTxn<'_>) -> Result<ReconcileReport> {
        let queue = txn.unfunded_conversions();
        let mut funded = Vec::new();

        for mut conversion in queue.iter().cloned() {
            match BudgetGuard::try_debit_in(txn, conversion.payout_amount_cents) {
                DebitOutcome::Debited { .. } => {
                    conversion.transition(ConversionStatus::Approved)?;
                    let payout = Payout::due_for(&conversion);
                    txn.update_conversion(conversion)?;
                    txn.insert_payout(payout.clone())?;
                    funded.push(payout);
                }
                DebitOutcome::Insufficient { .. } | DebitOutcome::Frozen { .. } => break,
            }
        }

        let report = ReconcileReport {
            campaign_id: txn.id(),
            still_unfunded: queue.len() - funded.len(),
            funded,
        };
        if !report.funded.is_empty() {
            tracing::info!(
                campaign = %report.campaign_id,
                funded = report.funded.len(),
                still_unfunded = report.still_unfunded,
                "unfunded approvals reconciled"
            );
        }
        Ok(report)
    }

    /// Reconcile in a transaction of its own.
    pub async fn reconcile(&self, campaign: CampaignId) -> Result<ReconcileReport> {
        let mut txn = self.store.begin(campaign).await?;
        let report = Self::reconcile_in(&mut txn)?;
        txn.commit()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use curator_types::{Campaign, CampaignStatus, Conversion, Product, UserId, WithheldReason};

    use super::*;

    /// Campaign with `available` budget and unfunded conversions of the given
    /// amounts, created oldest first.
    async fn seeded(available: u64, amounts: &[u64]) -> (Arc<LedgerStore>, CampaignId, Vec<Conversion>) {
        let store = Arc::new(LedgerStore::default());
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(100, available);
        campaign.product_id = product.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign.clone()).unwrap();

        let base = chrono::Utc::now() - Duration::minutes(10);
        let mut txn = store.begin(campaign.id).await.unwrap();
        let mut rows = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            let mut c = Conversion::dummy(campaign.id, ConversionStatus::Pending, *amount);
            c.created_at = base + Duration::seconds(i64::try_from(i).unwrap());
            c.withhold(WithheldReason::InsufficientBudget).unwrap();
            txn.insert_conversion(c.clone()).unwrap();
            rows.push(c);
        }
        txn.commit().unwrap();
        (store, campaign.id, rows)
    }

    #[tokio::test]
    async fn funds_oldest_first_and_stops_at_first_gap() {
        // 100 covers the first; the 300 blocks the 50 behind it.
        let (store, id, rows) = seeded(150, &[100, 300, 50]).await;
        let report = Reconciler::new(store.clone()).reconcile(id).await.unwrap();
        assert_eq!(report.funded.len(), 1);
        assert_eq!(report.funded[0].conversion_id, rows[0].id);
        assert_eq!(report.still_unfunded, 2);

        let c = store.campaign(id).await.unwrap();
        assert_eq!(c.budget_available_cents, 50);
        assert_eq!(store.conversion(rows[0].id).unwrap().status, ConversionStatus::Approved);
        assert_eq!(
            store.conversion(rows[2].id).unwrap().status,
            ConversionStatus::ApprovedUnfunded
        );
    }

    #[tokio::test]
    async fn frozen_campaign_reconciles_nothing() {
        let (store, id, _) = seeded(1_000, &[100]).await;
        {
            let mut txn = store.begin(id).await.unwrap();
            txn.campaign_mut().status = CampaignStatus::Paused;
            txn.commit().unwrap();
        }
        let report = Reconciler::new(store.clone()).reconcile(id).await.unwrap();
        assert!(report.funded.is_empty());
        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 1_000);
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let (store, id, _) = seeded(1_000, &[100, 100]).await;
        let r = Reconciler::new(store.clone());
        assert_eq!(r.reconcile(id).await.unwrap().funded.len(), 2);
        let again = r.reconcile(id).await.unwrap();
        assert!(again.funded.is_empty());
        assert_eq!(again.still_unfunded, 0);
        assert_eq!(store.payouts_for_campaign(id).len(), 2);
    }
}
