//! Conversion Intake.
//!
//! Authenticates the calling product, resolves the referral, and records the
//! conversion together with its budget decision in one campaign transaction:
//!
//! ```text
//! lock campaign → dedup (partnership, key) → decide → debit? → payout? → commit
//! ```
//!
//! Auto-approved conversions either debit and get a `due` payout in the same
//! commit, or land in `approved_unfunded` with a withheld reason. Manual
//! campaigns record `pending` and go through [`ConversionIntake::approve`].

use std::sync::Arc;

use chrono::Utc;
use curator_store::{CampaignTxn, LedgerStore, constraints, with_bounded_retry};
use curator_types::{
    ApiKeyHash, ApprovalMode, AuthContext, CampaignId, Conversion, ConversionId, ConversionStatus,
    ConversionType, LedgerError, Partnership, Payout, Product, RefCode, Result, RetryPolicy,
    WithheldReason,
};

use crate::budget_guard::{BudgetGuard, DebitOutcome};
use crate::request::ValidatedConversion;

/// Result of [`ConversionIntake::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub conversion: Conversion,
    /// Present only when the budget was debited in the same transaction.
    pub payout: Option<Payout>,
    /// The (partnership, idempotency key) pair was already recorded; nothing
    /// was written and `conversion` is the original row.
    pub deduped: bool,
}

/// Result of [`ConversionIntake::approve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// Budget debited and a `due` payout created.
    Approved { conversion: Conversion, payout: Payout },
    /// Approved, but no payout until the campaign is funded or resumed.
    Unfunded {
        conversion: Conversion,
        reason: WithheldReason,
    },
    /// The conversion had already been decided. Nothing changed.
    NotPending { conversion: Conversion },
}

impl ApproveOutcome {
    #[must_use]
    pub fn approved(&self) -> bool {
        !matches!(self, Self::NotPending { .. })
    }

    /// Wire reason for anything other than a funded approval.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Approved { .. } => None,
            Self::Unfunded { reason, .. } => Some(reason.to_string()),
            Self::NotPending { .. } => Some("not_pending".to_owned()),
        }
    }

    #[must_use]
    pub fn conversion(&self) -> &Conversion {
        match self {
            Self::Approved { conversion, .. }
            | Self::Unfunded { conversion, .. }
            | Self::NotPending { conversion } => conversion,
        }
    }

    #[must_use]
    pub fn payout(&self) -> Option<&Payout> {
        match self {
            Self::Approved { payout, .. } => Some(payout),
            _ => None,
        }
    }
}

/// The product owning `campaign`, if `actor` may manage it.
///
/// Admins manage every campaign. Anyone else gets
/// [`LedgerError::CampaignNotFound`], so foreign campaigns are
/// indistinguishable from missing ones.
pub fn require_campaign_owner(
    store: &LedgerStore,
    campaign: CampaignId,
    actor: &AuthContext,
) -> Result<Product> {
    store
        .product_for_campaign(campaign)
        .filter(|product| actor.is_admin() || product.owner_user_id == actor.user_id)
        .ok_or(LedgerError::CampaignNotFound(campaign))
}

pub struct ConversionIntake {
    store: Arc<LedgerStore>,
    retry: RetryPolicy,
}

impl ConversionIntake {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Resolve a bearer API key to its product. Only the hash is compared.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Product> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(LedgerError::MissingCredential)?;
        self.store
            .product_by_key_hash(&ApiKeyHash::of_token(token))
            .ok_or(LedgerError::InvalidCredential)
    }

    pub fn resolve_partnership(&self, ref_code: &RefCode) -> Result<Partnership> {
        self.store
            .partnership_by_ref(ref_code)
            .ok_or_else(|| LedgerError::RefCodeNotFound(ref_code.clone()))
    }

    /// The partnership's campaign must belong to `product`, and the event
    /// must be the campaign's current conversion type.
    pub async fn validate_binding(
        &self,
        partnership: &Partnership,
        product: &Product,
        event_type: ConversionType,
    ) -> Result<()> {
        let owner = self
            .store
            .product_for_campaign(partnership.campaign_id)
            .ok_or(LedgerError::CampaignNotFound(partnership.campaign_id))?;
        if owner.id != product.id {
            tracing::warn!(
                product = %product.id,
                partnership = %partnership.id,
                "ref code presented by foreign product"
            );
            return Err(LedgerError::CrossTenant);
        }
        let expected = self
            .store
            .campaign(partnership.campaign_id)
            .await?
            .conversion_type;
        if expected != event_type {
            return Err(LedgerError::EventTypeMismatch {
                expected,
                actual: event_type,
            });
        }
        Ok(())
    }

    /// Record a conversion for `partnership`.
    ///
    /// Retried as a whole on transient storage failures. A uniqueness
    /// conflict on the idempotency key resolves to the deduped outcome.
    pub async fn submit(
        &self,
        partnership: &Partnership,
        event: &ValidatedConversion,
    ) -> Result<SubmitOutcome> {
        with_bounded_retry(&self.retry, "submit_conversion", |_| async move {
            match self.submit_once(partnership, event).await {
                Err(LedgerError::UniqueViolation { constraint })
                    if constraint == constraints::CONVERSION_IDEMPOTENCY =>
                {
                    self.deduped(partnership, event)
                }
                other => other,
            }
        })
        .await
    }

    async fn submit_once(
        &self,
        partnership: &Partnership,
        event: &ValidatedConversion,
    ) -> Result<SubmitOutcome> {
        let mut txn = self.store.begin(partnership.campaign_id).await?;

        if let Some(key) = &event.idempotency_key {
            if let Some(existing) = txn.conversion_by_key(partnership.id, key) {
                let payout = txn.payout_for_conversion(existing.id);
                txn.rollback();
                tracing::debug!(conversion = %existing.id, "duplicate submission acknowledged");
                return Ok(SubmitOutcome {
                    conversion: existing,
                    payout,
                    deduped: true,
                });
            }
        }

        let mut conversion = Conversion {
            id: ConversionId::new(),
            partnership_id: partnership.id,
            campaign_id: partnership.campaign_id,
            creator_user_id: partnership.creator_user_id,
            event_type: event.event_type,
            external_user_hash: event.external_user_hash.clone(),
            idempotency_key: event.idempotency_key.clone(),
            status: ConversionStatus::Pending,
            payout_amount_cents: partnership.terms.cpa_amount_cents,
            withheld: None,
            created_at: Utc::now(),
            decided_at: None,
        };

        let mode = txn.campaign().approval_mode;
        let payout = match mode {
            ApprovalMode::Auto => decide_approval(&mut txn, &mut conversion)?,
            ApprovalMode::Manual => None,
        };

        txn.insert_conversion(conversion.clone())?;
        if let Some(payout) = &payout {
            txn.insert_payout(payout.clone())?;
        }
        txn.commit()?;

        log_decision(&conversion, payout.as_ref());
        Ok(SubmitOutcome {
            conversion,
            payout,
            deduped: false,
        })
    }

    fn deduped(
        &self,
        partnership: &Partnership,
        event: &ValidatedConversion,
    ) -> Result<SubmitOutcome> {
        let key = event
            .idempotency_key
            .as_ref()
            .ok_or_else(|| LedgerError::Internal("idempotency conflict without a key".into()))?;
        let conversion = self
            .store
            .conversion_by_key(partnership.id, key)
            .ok_or_else(|| LedgerError::Internal("idempotency conflict without a row".into()))?;
        let payout = self.store.payout_for_conversion(conversion.id);
        Ok(SubmitOutcome {
            conversion,
            payout,
            deduped: true,
        })
    }

    /// Manually approve a pending conversion.
    ///
    /// Budget is checked at approval time under the campaign lock. Only the
    /// campaign's builder or an admin may approve; anyone else gets
    /// [`LedgerError::ConversionNotFound`].
    pub async fn approve(&self, id: ConversionId, actor: &AuthContext) -> Result<ApproveOutcome> {
        let campaign = self.authorized_campaign(id, actor)?;
        with_bounded_retry(&self.retry, "approve_conversion", |_| async move {
            let mut txn = self.store.begin(campaign).await?;
            let mut conversion = txn.conversion(id)?;
            if conversion.status != ConversionStatus::Pending {
                txn.rollback();
                return Ok(ApproveOutcome::NotPending { conversion });
            }

            let payout = decide_approval(&mut txn, &mut conversion)?;
            txn.update_conversion(conversion.clone())?;
            if let Some(payout) = &payout {
                txn.insert_payout(payout.clone())?;
            }
            txn.commit()?;

            log_decision(&conversion, payout.as_ref());
            Ok(match (payout, conversion.withheld) {
                (Some(payout), _) => ApproveOutcome::Approved { conversion, payout },
                (None, reason) => ApproveOutcome::Unfunded {
                    reason: reason.unwrap_or(WithheldReason::InsufficientBudget),
                    conversion,
                },
            })
        })
        .await
    }

    /// Reject a pending conversion. No budget moves.
    pub async fn reject(&self, id: ConversionId, actor: &AuthContext) -> Result<Conversion> {
        let campaign = self.authorized_campaign(id, actor)?;
        with_bounded_retry(&self.retry, "reject_conversion", |_| async move {
            let mut txn = self.store.begin(campaign).await?;
            let mut conversion = txn.conversion(id)?;
            conversion.transition(ConversionStatus::Rejected)?;
            txn.update_conversion(conversion.clone())?;
            txn.commit()?;
            tracing::info!(conversion = %conversion.id, campaign = %campaign, "conversion rejected");
            Ok(conversion)
        })
        .await
    }

    fn authorized_campaign(&self, id: ConversionId, actor: &AuthContext) -> Result<CampaignId> {
        let conversion = self.store.conversion(id)?;
        require_campaign_owner(&self.store, conversion.campaign_id, actor)
            .map(|_| conversion.campaign_id)
            .map_err(|_| LedgerError::ConversionNotFound(id))
    }
}

/// Approve `conversion` against the locked campaign budget.
///
/// On a successful debit the conversion becomes `approved` and the returned
/// payout must be staged in the same transaction. Otherwise the conversion
/// becomes `approved_unfunded` with the reason recorded.
fn decide_approval(
    txn: &mut CampaignTxn<'_>,
    conversion: &mut Conversion,
) -> Result<Option<Payout>> {
    match BudgetGuard::try_debit_in(txn, conversion.payout_amount_cents) {
        DebitOutcome::Debited { .. } => {
            conversion.transition(ConversionStatus::Approved)?;
            Ok(Some(Payout::due_for(conversion)))
        }
        DebitOutcome::Insufficient { .. } => {
            conversion.withhold(WithheldReason::InsufficientBudget)?;
            Ok(None)
        }
        DebitOutcome::Frozen { .. } => {
            conversion.withhold(WithheldReason::CampaignFrozen)?;
            Ok(None)
        }
    }
}

fn log_decision(conversion: &Conversion, payout: Option<&Payout>) {
    match (conversion.status, payout) {
        (ConversionStatus::Approved, Some(payout)) => tracing::info!(
            conversion = %conversion.id,
            campaign = %conversion.campaign_id,
            payout = %payout.id,
            amount = payout.amount_cents,
            "conversion approved with payout"
        ),
        (ConversionStatus::ApprovedUnfunded, _) => tracing::warn!(
            conversion = %conversion.id,
            campaign = %conversion.campaign_id,
            reason = ?conversion.withheld,
            "conversion approved without payout"
        ),
        (status, _) => tracing::info!(
            conversion = %conversion.id,
            campaign = %conversion.campaign_id,
            %status,
            "conversion recorded"
        ),
    }
}
