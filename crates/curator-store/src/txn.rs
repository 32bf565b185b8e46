//! Campaign-scoped transactions.
//!
//! A [`CampaignTxn`] holds the campaign's row lock from `begin` until it is
//! committed or dropped. Reads see committed rows overlaid with the
//! transaction's own staged writes.

use std::collections::HashMap;

use chrono::Utc;
use curator_types::{
    Campaign, CampaignId, CheckoutSessionId, Conversion, ConversionId, ConversionStatus,
    FundingEvent, IdempotencyKey, LedgerError, PartnershipId, Payout, Result,
};
use tokio::sync::OwnedMutexGuard;

use crate::store::{LedgerStore, Tables, constraints};

/// Exclusive unit of work on one campaign and the rows that hang off it.
pub struct CampaignTxn<'s> {
    store: &'s LedgerStore,
    row: OwnedMutexGuard<Campaign>,
    working: Campaign,
    new_conversions: Vec<Conversion>,
    changed_conversions: HashMap<ConversionId, Conversion>,
    new_payouts: Vec<Payout>,
    new_funding: Vec<FundingEvent>,
}

impl std::fmt::Debug for CampaignTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignTxn")
            .field("working", &self.working)
            .finish_non_exhaustive()
    }
}

impl<'s> CampaignTxn<'s> {
    pub(crate) fn new(store: &'s LedgerStore, row: OwnedMutexGuard<Campaign>) -> Self {
        let working = row.clone();
        Self {
            store,
            row,
            working,
            new_conversions: Vec::new(),
            changed_conversions: HashMap::new(),
            new_payouts: Vec::new(),
            new_funding: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> CampaignId {
        self.working.id
    }

    /// The campaign as this transaction sees it.
    #[must_use]
    pub fn campaign(&self) -> &Campaign {
        &self.working
    }

    pub fn campaign_mut(&mut self) -> &mut Campaign {
        &mut self.working
    }

    // -----------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------

    /// A conversion of this campaign.
    pub fn conversion(&self, id: ConversionId) -> Result<Conversion> {
        if let Some(c) = self.new_conversions.iter().find(|c| c.id == id) {
            return Ok(c.clone());
        }
        if let Some(c) = self.changed_conversions.get(&id) {
            return Ok(c.clone());
        }
        self.store
            .tables
            .lock()
            .conversions
            .get(&id)
            .filter(|c| c.campaign_id == self.working.id)
            .cloned()
            .ok_or(LedgerError::ConversionNotFound(id))
    }

    #[must_use]
    pub fn conversion_by_key(
        &self,
        partnership: PartnershipId,
        key: &IdempotencyKey,
    ) -> Option<Conversion> {
        let staged = self.new_conversions.iter().find(|c| {
            c.partnership_id == partnership && c.idempotency_key.as_ref() == Some(key)
        });
        if let Some(c) = staged {
            return Some(c.clone());
        }
        let id = {
            let tables = self.store.tables.lock();
            *tables.conversions_by_key.get(&(partnership, key.clone()))?
        };
        self.conversion(id).ok()
    }

    /// Stage a new conversion.
    ///
    /// # Errors
    /// [`LedgerError::UniqueViolation`] if the (partnership, idempotency key)
    /// pair is already taken.
    pub fn insert_conversion(&mut self, conversion: Conversion) -> Result<()> {
        self.ensure_own(conversion.campaign_id)?;
        if let Some(key) = &conversion.idempotency_key {
            if self.conversion_by_key(conversion.partnership_id, key).is_some() {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::CONVERSION_IDEMPOTENCY,
                });
            }
        }
        self.new_conversions.push(conversion);
        Ok(())
    }

    /// Stage an update to an existing conversion of this campaign.
    pub fn update_conversion(&mut self, conversion: Conversion) -> Result<()> {
        self.ensure_own(conversion.campaign_id)?;
        if let Some(slot) = self
            .new_conversions
            .iter_mut()
            .find(|c| c.id == conversion.id)
        {
            *slot = conversion;
            return Ok(());
        }
        // Must already exist.
        self.conversion(conversion.id)?;
        self.changed_conversions.insert(conversion.id, conversion);
        Ok(())
    }

    /// `approved_unfunded` conversions of this campaign, oldest first.
    #[must_use]
    pub fn unfunded_conversions(&self) -> Vec<Conversion> {
        let committed: Vec<Conversion> = self
            .store
            .tables
            .lock()
            .conversions
            .values()
            .filter(|c| c.campaign_id == self.working.id)
            .cloned()
            .collect();
        let mut rows: Vec<Conversion> = committed
            .into_iter()
            .map(|c| self.changed_conversions.get(&c.id).cloned().unwrap_or(c))
            .chain(self.new_conversions.iter().cloned())
            .filter(|c| c.status == ConversionStatus::ApprovedUnfunded)
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        rows
    }

    // -----------------------------------------------------------------
    // Payouts
    // -----------------------------------------------------------------

    #[must_use]
    pub fn payout_for_conversion(&self, conversion: ConversionId) -> Option<Payout> {
        if let Some(p) = self
            .new_payouts
            .iter()
            .find(|p| p.conversion_id == conversion)
        {
            return Some(p.clone());
        }
        self.store.payout_for_conversion(conversion)
    }

    /// Stage a due payout. At most one per conversion.
    pub fn insert_payout(&mut self, payout: Payout) -> Result<()> {
        self.ensure_own(payout.campaign_id)?;
        if self.payout_for_conversion(payout.conversion_id).is_some() {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::PAYOUT_CONVERSION,
            });
        }
        self.new_payouts.push(payout);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Funding
    // -----------------------------------------------------------------

    #[must_use]
    pub fn funding_seen(&self, session: &CheckoutSessionId) -> bool {
        self.new_funding
            .iter()
            .any(|f| &f.checkout_session_id == session)
            || self.store.funding_event(session).is_some()
    }

    /// Stage a funding event. One per checkout session.
    pub fn record_funding(&mut self, event: FundingEvent) -> Result<()> {
        self.ensure_own(event.campaign_id)?;
        if self.funding_seen(&event.checkout_session_id) {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::FUNDING_SESSION,
            });
        }
        self.new_funding.push(event);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------

    /// Apply every staged write and release the row lock.
    ///
    /// Constraints are re-checked against committed state; on any failure
    /// nothing is applied.
    pub fn commit(self) -> Result<()> {
        let Self {
            store,
            mut row,
            mut working,
            new_conversions,
            changed_conversions,
            new_payouts,
            new_funding,
        } = self;

        working.check_budget_bounds()?;

        let mut tables = store.tables.lock();
        verify_constraints(&tables, &new_conversions, &new_payouts, &new_funding)?;

        let staged = new_conversions.len() + changed_conversions.len() + new_payouts.len();
        for c in new_conversions {
            if let Some(key) = &c.idempotency_key {
                tables
                    .conversions_by_key
                    .insert((c.partnership_id, key.clone()), c.id);
            }
            tables.conversions.insert(c.id, c);
        }
        for (id, c) in changed_conversions {
            tables.conversions.insert(id, c);
        }
        for p in new_payouts {
            tables.payouts_by_conversion.insert(p.conversion_id, p.id);
            tables.payouts.insert(p.id, p);
        }
        for f in new_funding {
            tables.funding.insert(f.checkout_session_id.clone(), f);
        }
        drop(tables);

        if working != *row {
            working.updated_at = Utc::now();
            *row = working;
        }
        tracing::debug!(
            campaign = %row.id,
            available = row.budget_available_cents,
            total = row.budget_total_cents,
            rows = staged,
            "campaign txn committed"
        );
        Ok(())
    }

    /// Discard staged writes. Equivalent to dropping the transaction.
    pub fn rollback(self) {
        tracing::debug!(campaign = %self.working.id, "campaign txn rolled back");
    }

    fn ensure_own(&self, campaign: CampaignId) -> Result<()> {
        if campaign == self.working.id {
            Ok(())
        } else {
            Err(LedgerError::Internal(format!(
                "row of {campaign} staged in txn for {}",
                self.working.id
            )))
        }
    }
}

fn verify_constraints(
    tables: &Tables,
    conversions: &[Conversion],
    payouts: &[Payout],
    funding: &[FundingEvent],
) -> Result<()> {
    for c in conversions {
        if let Some(key) = &c.idempotency_key {
            if tables
                .conversions_by_key
                .contains_key(&(c.partnership_id, key.clone()))
            {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::CONVERSION_IDEMPOTENCY,
                });
            }
        }
    }
    if payouts
        .iter()
        .any(|p| tables.payouts_by_conversion.contains_key(&p.conversion_id))
    {
        return Err(LedgerError::UniqueViolation {
            constraint: constraints::PAYOUT_CONVERSION,
        });
    }
    if funding
        .iter()
        .any(|f| tables.funding.contains_key(&f.checkout_session_id))
    {
        return Err(LedgerError::UniqueViolation {
            constraint: constraints::FUNDING_SESSION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use curator_types::{Product, UserId};

    use super::*;

    async fn seeded(budget: u64) -> (Arc<LedgerStore>, CampaignId) {
        let store = Arc::new(LedgerStore::default());
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(100, budget);
        campaign.product_id = product.id;
        let id = campaign.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign).unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn dropped_txn_leaves_no_trace() {
        let (store, id) = seeded(1_000).await;
        {
            let mut txn = store.begin(id).await.unwrap();
            txn.campaign_mut().budget_available_cents -= 100;
            let conv = Conversion::dummy(id, ConversionStatus::Approved, 100);
            txn.insert_payout(Payout::due_for(&conv)).unwrap();
            txn.insert_conversion(conv).unwrap();
        }
        let campaign = store.campaign(id).await.unwrap();
        assert_eq!(campaign.budget_available_cents, 1_000);
        assert!(store.conversions_for_campaign(id).is_empty());
        assert!(store.payouts_for_campaign(id).is_empty());
    }

    #[tokio::test]
    async fn commit_publishes_all_staged_rows() {
        let (store, id) = seeded(1_000).await;
        let conv = Conversion::dummy(id, ConversionStatus::Approved, 100);
        let conv_id = conv.id;

        let mut txn = store.begin(id).await.unwrap();
        txn.campaign_mut().budget_available_cents -= 100;
        txn.insert_payout(Payout::due_for(&conv)).unwrap();
        txn.insert_conversion(conv).unwrap();
        // Staged but not yet visible outside.
        assert!(store.conversion(conv_id).is_err());
        txn.commit().unwrap();

        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 900);
        assert!(store.conversion(conv_id).is_ok());
        assert!(store.payout_for_conversion(conv_id).is_some());
    }

    #[tokio::test]
    async fn commit_refuses_available_above_total() {
        let (store, id) = seeded(1_000).await;
        let mut txn = store.begin(id).await.unwrap();
        txn.campaign_mut().budget_available_cents = 1_001;
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, LedgerError::BudgetInvariantViolation { .. }));
        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 1_000);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_in_same_txn() {
        let (store, id) = seeded(1_000).await;
        let mut first = Conversion::dummy(id, ConversionStatus::Pending, 100);
        first.idempotency_key = Some(IdempotencyKey::new("k1"));
        let mut second = Conversion::dummy(id, ConversionStatus::Pending, 100);
        second.partnership_id = first.partnership_id;
        second.idempotency_key = Some(IdempotencyKey::new("k1"));

        let mut txn = store.begin(id).await.unwrap();
        txn.insert_conversion(first).unwrap();
        let err = txn.insert_conversion(second).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UniqueViolation { constraint } if constraint == constraints::CONVERSION_IDEMPOTENCY
        ));
    }

    #[tokio::test]
    async fn second_payout_for_conversion_rejected() {
        let (store, id) = seeded(1_000).await;
        let conv = Conversion::dummy(id, ConversionStatus::Approved, 100);
        let mut txn = store.begin(id).await.unwrap();
        txn.insert_payout(Payout::due_for(&conv)).unwrap();
        txn.insert_conversion(conv.clone()).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin(id).await.unwrap();
        let err = txn.insert_payout(Payout::due_for(&conv)).unwrap_err();
        assert!(matches!(err, LedgerError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn foreign_rows_cannot_be_staged() {
        let (store, id) = seeded(1_000).await;
        let mut txn = store.begin(id).await.unwrap();
        let foreign = Conversion::dummy(CampaignId::new(), ConversionStatus::Pending, 1);
        assert!(txn.insert_conversion(foreign).is_err());
    }

    #[tokio::test]
    async fn unfunded_overlay_sees_staged_updates() {
        let (store, id) = seeded(1_000).await;
        let mut older = Conversion::dummy(id, ConversionStatus::Pending, 100);
        older.withhold(curator_types::WithheldReason::InsufficientBudget).unwrap();
        let mut newer = Conversion::dummy(id, ConversionStatus::Pending, 100);
        newer.withhold(curator_types::WithheldReason::InsufficientBudget).unwrap();
        let mut txn = store.begin(id).await.unwrap();
        txn.insert_conversion(older.clone()).unwrap();
        txn.insert_conversion(newer.clone()).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin(id).await.unwrap();
        let queue = txn.unfunded_conversions();
        assert_eq!(
            queue.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );
        older.transition(ConversionStatus::Approved).unwrap();
        txn.update_conversion(older).unwrap();
        assert_eq!(txn.unfunded_conversions().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_are_serialized() {
        let (store, id) = seeded(1_000).await;
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.spawn(async move {
                let mut txn = store.begin(id).await.unwrap();
                let available = txn.campaign().budget_available_cents;
                tokio::task::yield_now().await;
                if available >= 100 {
                    txn.campaign_mut().budget_available_cents = available - 100;
                    txn.commit().unwrap();
                    true
                } else {
                    false
                }
            });
        }
        let mut debited = 0;
        while let Some(res) = tasks.join_next().await {
            if res.unwrap() {
                debited += 1;
            }
        }
        assert_eq!(debited, 10);
        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 0);
    }
}
