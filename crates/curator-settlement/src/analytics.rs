//! Per-campaign counters for builder and admin dashboards.

use curator_store::LedgerStore;
use curator_types::{CampaignId, Cents, ConversionStatus, PayoutStatus, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignAnalytics {
    pub campaign_id: CampaignId,
    pub clicks: usize,
    pub pending: usize,
    pub approved: usize,
    pub approved_unfunded: usize,
    pub rejected: usize,
    pub payouts_due: usize,
    pub payouts_paid: usize,
    pub due_cents: Cents,
    pub paid_cents: Cents,
    pub budget_total_cents: Cents,
    pub budget_available_cents: Cents,
}

pub async fn campaign_analytics(
    store: &LedgerStore,
    campaign: CampaignId,
) -> Result<CampaignAnalytics> {
    let row = store.campaign(campaign).await?;
    let mut stats = CampaignAnalytics {
        campaign_id: campaign,
        clicks: store.clicks_for_campaign(campaign),
        pending: 0,
        approved: 0,
        approved_unfunded: 0,
        rejected: 0,
        payouts_due: 0,
        payouts_paid: 0,
        due_cents: 0,
        paid_cents: 0,
        budget_total_cents: row.budget_total_cents,
        budget_available_cents: row.budget_available_cents,
    };

    for conversion in store.conversions_for_campaign(campaign) {
        match conversion.status {
            ConversionStatus::Pending => stats.pending += 1,
            ConversionStatus::Approved => stats.approved += 1,
            ConversionStatus::ApprovedUnfunded => stats.approved_unfunded += 1,
            ConversionStatus::Rejected => stats.rejected += 1,
        }
    }
    for payout in store.payouts_for_campaign(campaign) {
        match payout.status {
            PayoutStatus::Due => {
                stats.payouts_due += 1;
                stats.due_cents = stats.due_cents.saturating_add(payout.amount_cents);
            }
            PayoutStatus::Paid => {
                stats.payouts_paid += 1;
                stats.paid_cents = stats.paid_cents.saturating_add(payout.amount_cents);
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use curator_types::{
        Campaign, ClickEvent, Conversion, Partnership, Payout, Product, RefCode, TransferId, UserId,
    };

    use super::*;

    #[tokio::test]
    async fn counts_every_bucket() {
        let store = LedgerStore::default();
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(100, 1_000);
        campaign.product_id = product.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign.clone()).unwrap();
        let partnership = Partnership::invite(&campaign, UserId::new(), RefCode::new("abcd234567"));
        store.insert_partnership(partnership.clone()).unwrap();
        for _ in 0..2 {
            store.record_click(ClickEvent {
                ref_code: partnership.ref_code.clone(),
                ip_hash: None,
                user_agent_hash: None,
                at: Utc::now(),
            });
        }

        let paid_conv = Conversion::dummy(campaign.id, ConversionStatus::Approved, 100);
        let due_conv = Conversion::dummy(campaign.id, ConversionStatus::Approved, 100);
        let paid = Payout::due_for(&paid_conv);
        let mut txn = store.begin(campaign.id).await.unwrap();
        txn.campaign_mut().budget_available_cents = 800;
        txn.insert_payout(paid.clone()).unwrap();
        txn.insert_payout(Payout::due_for(&due_conv)).unwrap();
        txn.insert_conversion(paid_conv).unwrap();
        txn.insert_conversion(due_conv).unwrap();
        txn.insert_conversion(Conversion::dummy(campaign.id, ConversionStatus::Pending, 100))
            .unwrap();
        txn.insert_conversion(Conversion::dummy(campaign.id, ConversionStatus::Rejected, 100))
            .unwrap();
        txn.insert_conversion(Conversion::dummy(
            campaign.id,
            ConversionStatus::ApprovedUnfunded,
            100,
        ))
        .unwrap();
        txn.commit().unwrap();
        store.mark_payout_paid(paid.id, TransferId::new("tr_1")).unwrap();

        let stats = campaign_analytics(&store, campaign.id).await.unwrap();
        assert_eq!(stats.clicks, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.approved_unfunded, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.payouts_due, 1);
        assert_eq!(stats.payouts_paid, 1);
        assert_eq!(stats.paid_cents, 100);
        assert_eq!(stats.budget_available_cents, 800);
    }
}
