//! # curator-settlement
//!
//! **Finality plane**: turns due payouts into external transfers and keeps
//! campaign budgets consistent with what has been paid.
//!
//! ## Components
//!
//! 1. **TransferGateway**: port to the payment processor
//! 2. **PayoutSettler**: `due → paid` exactly once per payout
//! 3. **FundingLedger**: applies checkout funding once per session
//! 4. **CampaignControl**: freeze/resume of payout issuance
//! 5. **Reconciler**: turns `approved_unfunded` into paid-for approvals
//! 6. **BudgetConservation**: `total == available + Σ payouts` audit
//! 7. **analytics**: per-campaign counters
//!
//! ## Settlement
//!
//! ```text
//! payout(due) → destination? → transfer(tag = payout:<id>) → mark paid
//! ```
//!
//! No store lock is held while the transfer is in flight. The processor
//! deduplicates on the idempotency tag, and `mark paid` is a conditional
//! update, so a retried settle never pays twice.

pub mod analytics;
pub mod budget_conservation;
pub mod campaign_control;
pub mod funding;
pub mod in_flight;
pub mod reconciliation;
pub mod settler;
pub mod transfer;

pub use analytics::{CampaignAnalytics, campaign_analytics};
pub use budget_conservation::{BudgetAudit, BudgetConservation};
pub use campaign_control::CampaignControl;
pub use funding::{FundingLedger, FundingOutcome};
pub use in_flight::InFlightGuard;
pub use reconciliation::{ReconcileReport, Reconciler};
pub use settler::{PayoutSettler, SettleOutcome, SettleReason, SweepReport};
pub use transfer::{TransferError, TransferGateway, TransferRequest};

#[cfg(any(test, feature = "test-helpers"))]
pub use transfer::RecordingGateway;
