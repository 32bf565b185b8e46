//! Budget conservation audit.
//!
//! For every campaign:
//! ```text
//! Σ funding == budget_total
//! budget_total == budget_available + Σ payout.amount
//! budget_available <= budget_total
//! ```
//!
//! A violation means money was created or lost by the ledger itself.

use std::sync::Arc;

use curator_store::LedgerStore;
use curator_types::{CampaignId, Cents, LedgerError, PayoutStatus, Result};
use serde::Serialize;

/// Snapshot of a campaign's money, taken under its row lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetAudit {
    pub campaign_id: CampaignId,
    pub total_cents: Cents,
    pub available_cents: Cents,
    pub funded_cents: Cents,
    pub due_cents: Cents,
    pub paid_cents: Cents,
}

impl BudgetAudit {
    /// Σ payout amounts, due and paid.
    #[must_use]
    pub fn committed_cents(&self) -> Cents {
        self.due_cents.saturating_add(self.paid_cents)
    }

    pub fn verify(&self) -> Result<()> {
        let violation = |reason: String| LedgerError::BudgetInvariantViolation {
            reason: format!("{}: {reason}", self.campaign_id),
        };
        if self.available_cents > self.total_cents {
            return Err(violation(format!(
                "available {} exceeds total {}",
                self.available_cents, self.total_cents
            )));
        }
        if self.funded_cents != self.total_cents {
            return Err(violation(format!(
                "funding {} != total {}",
                self.funded_cents, self.total_cents
            )));
        }
        if self.available_cents.checked_add(self.committed_cents()) != Some(self.total_cents) {
            return Err(violation(format!(
                "available {} + payouts {} != total {}",
                self.available_cents,
                self.committed_cents(),
                self.total_cents
            )));
        }
        Ok(())
    }
}

pub struct BudgetConservation {
    store: Arc<LedgerStore>,
}

impl BudgetConservation {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Take a consistent snapshot of one campaign.
    pub async fn snapshot(&self, campaign: CampaignId) -> Result<BudgetAudit> {
        // Hold the row lock so no debit lands between the reads.
        let txn = self.store.begin(campaign).await?;
        let row = txn.campaign().clone();
        let payouts = self.store.payouts_for_campaign(campaign);
        let funding = self.store.funding_for_campaign(campaign);
        txn.rollback();

        let sum = |status: PayoutStatus| -> Cents {
            payouts
                .iter()
                .filter(|p| p.status == status)
                .map(|p| p.amount_cents)
                .fold(0, Cents::saturating_add)
        };
        Ok(BudgetAudit {
            campaign_id: campaign,
            total_cents: row.budget_total_cents,
            available_cents: row.budget_available_cents,
            funded_cents: funding
                .iter()
                .map(|f| f.amount_cents)
                .fold(0, Cents::saturating_add),
            due_cents: sum(PayoutStatus::Due),
            paid_cents: sum(PayoutStatus::Paid),
        })
    }

    /// Snapshot and verify. Violations are logged at `error`.
    pub async fn audit(&self, campaign: CampaignId) -> Result<BudgetAudit> {
        let audit = self.snapshot(campaign).await?;
        if let Err(err) = audit.verify() {
            tracing::error!(campaign = %campaign, error = %err, "budget conservation violated");
            return Err(err);
        }
        Ok(audit)
    }
}
