//! Budget Guard.
//!
//! Serializes spend against one campaign budget. The check and the write
//! happen under the campaign's row lock, so two debits can never both read
//! the same `budget_available_cents`.

use curator_store::{CampaignTxn, LedgerStore};
use curator_types::{CampaignId, CampaignStatus, Cents, LedgerError, Result};

/// Result of a debit attempt. Only `Debited` mutates the campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining: Cents },
    Insufficient { needed: Cents, available: Cents },
    /// Paused or ended campaigns never debit.
    Frozen { status: CampaignStatus },
}

impl DebitOutcome {
    #[must_use]
    pub fn is_debited(&self) -> bool {
        matches!(self, Self::Debited { .. })
    }
}

/// Check-then-debit on a campaign row.
pub struct BudgetGuard;

impl BudgetGuard {
    /// Debit inside a caller's transaction so the debit commits together
    /// with whatever else the caller stages (typically the payout row).
    pub fn try_debit_in(txn: &mut CampaignTxn<'_>, amount: Cents) -> DebitOutcome {
        let campaign = txn.campaign_mut();
        if !campaign.status.issues_payouts() {
            return DebitOutcome::Frozen {
                status: campaign.status,
            };
        }
        if campaign.budget_available_cents < amount {
            return DebitOutcome::Insufficient {
                needed: amount,
                available: campaign.budget_available_cents,
            };
        }
        campaign.budget_available_cents -= amount;
        tracing::debug!(
            campaign = %campaign.id,
            amount,
            remaining = campaign.budget_available_cents,
            "budget debited"
        );
        DebitOutcome::Debited {
            remaining: campaign.budget_available_cents,
        }
    }

    /// Standalone debit in its own transaction.
    ///
    /// Commits only when the debit happened; otherwise the transaction is
    /// rolled back and the campaign is untouched.
    pub async fn try_debit(
        store: &LedgerStore,
        campaign: CampaignId,
        amount: Cents,
    ) -> Result<DebitOutcome> {
        let mut txn = store.begin(campaign).await?;
        let outcome = Self::try_debit_in(&mut txn, amount);
        if outcome.is_debited() {
            txn.commit()?;
        } else {
            txn.rollback();
        }
        Ok(outcome)
    }

    /// Add funds to both total and available budget.
    ///
    /// # Errors
    /// [`LedgerError::InvalidAmount`] for zero or overflowing amounts.
    pub fn credit_in(txn: &mut CampaignTxn<'_>, amount: Cents) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                reason: "funding amount must be positive".into(),
            });
        }
        let campaign = txn.campaign_mut();
        let id = campaign.id;
        let overflow = || LedgerError::InvalidAmount {
            reason: format!("funding {amount} overflows budget of {id}"),
        };
        let total = campaign
            .budget_total_cents
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let available = campaign
            .budget_available_cents
            .checked_add(amount)
            .ok_or_else(overflow)?;
        campaign.budget_total_cents = total;
        campaign.budget_available_cents = available;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use curator_types::{Campaign, Product, UserId};

    use super::*;

    fn seeded(cpa: Cents, budget: Cents) -> (Arc<LedgerStore>, CampaignId) {
        let store = Arc::new(LedgerStore::default());
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(cpa, budget);
        campaign.product_id = product.id;
        let id = campaign.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign).unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn exact_budget_debits_to_zero() {
        let (store, id) = seeded(2500, 2500);
        let out = BudgetGuard::try_debit(&store, id, 2500).await.unwrap();
        assert_eq!(out, DebitOutcome::Debited { remaining: 0 });

        let out = BudgetGuard::try_debit(&store, id, 2500).await.unwrap();
        assert_eq!(
            out,
            DebitOutcome::Insufficient {
                needed: 2500,
                available: 0
            }
        );
        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 0);
    }

    #[tokio::test]
    async fn frozen_campaign_never_debits() {
        let (store, id) = seeded(100, 1000);
        {
            let mut txn = store.begin(id).await.unwrap();
            txn.campaign_mut().status = CampaignStatus::Paused;
            txn.commit().unwrap();
        }
        let out = BudgetGuard::try_debit(&store, id, 100).await.unwrap();
        assert_eq!(
            out,
            DebitOutcome::Frozen {
                status: CampaignStatus::Paused
            }
        );
        assert_eq!(store.campaign(id).await.unwrap().budget_available_cents, 1000);
    }

    #[tokio::test]
    async fn credit_adds_to_total_and_available() {
        let (store, id) = seeded(100, 1000);
        let mut txn = store.begin(id).await.unwrap();
        BudgetGuard::credit_in(&mut txn, 500).unwrap();
        txn.commit().unwrap();
        let c = store.campaign(id).await.unwrap();
        assert_eq!(c.budget_total_cents, 1500);
        assert_eq!(c.budget_available_cents, 1500);
    }

    #[tokio::test]
    async fn credit_rejects_zero_and_overflow() {
        let (store, id) = seeded(100, 1000);
        let mut txn = store.begin(id).await.unwrap();
        assert!(matches!(
            BudgetGuard::credit_in(&mut txn, 0),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            BudgetGuard::credit_in(&mut txn, Cents::MAX),
            Err(LedgerError::InvalidAmount { .. })
        ));
        // Neither attempt touched the working copy.
        assert_eq!(txn.campaign().budget_total_cents, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overspend() {
        let (store, id) = seeded(300, 1000);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.spawn(async move { BudgetGuard::try_debit(&store, id, 300).await.unwrap() });
        }
        let mut debited = 0;
        while let Some(out) = tasks.join_next().await {
            if out.unwrap().is_debited() {
                debited += 1;
            }
        }
        assert_eq!(debited, 3);
        let c = store.campaign(id).await.unwrap();
        assert_eq!(c.budget_available_cents, 100);
        assert!(c.budget_available_cents <= c.budget_total_cents);
    }
}
