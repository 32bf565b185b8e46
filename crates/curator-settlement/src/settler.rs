//! Payout Settler.
//!
//! Moves a payout from `due` to `paid` by requesting an external transfer.
//! A payout that is already `paid` is answered from the ledger without
//! contacting the processor. Failures leave the payout `due` and are
//! recorded on the row.

use std::collections::BTreeMap;
use std::sync::Arc;

use curator_store::{LedgerStore, PaidTransition};
use curator_types::{Payout, PayoutId, Result, SettlementConfig, TransferId};

use crate::in_flight::InFlightGuard;
use crate::transfer::{TransferError, TransferGateway, TransferRequest};

/// Why a settle call did not end with a paid payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleReason {
    /// The creator has not connected a payout destination.
    MissingDestination,
    /// Another settlement of the same payout is running in this process.
    InFlight,
    /// The processor call failed or timed out.
    TransferFailed(TransferError),
}

impl std::fmt::Display for SettleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDestination => write!(f, "missing_destination"),
            Self::InFlight => write!(f, "in_flight"),
            Self::TransferFailed(err) => write!(f, "transfer_failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutcome {
    pub payout_id: PayoutId,
    pub settled: bool,
    pub transfer_id: Option<TransferId>,
    pub reason: Option<SettleReason>,
}

impl SettleOutcome {
    fn paid(payout_id: PayoutId, transfer_id: Option<TransferId>) -> Self {
        Self {
            payout_id,
            settled: true,
            transfer_id,
            reason: None,
        }
    }

    fn unsettled(payout_id: PayoutId, reason: SettleReason) -> Self {
        Self {
            payout_id,
            settled: false,
            transfer_id: None,
            reason: Some(reason),
        }
    }
}

/// Result of [`PayoutSettler::settle_due`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub settled: usize,
    pub unsettled: Vec<SettleOutcome>,
}

pub struct PayoutSettler {
    store: Arc<LedgerStore>,
    gateway: Arc<dyn TransferGateway>,
    config: SettlementConfig,
    in_flight: InFlightGuard,
}

impl PayoutSettler {
    #[must_use]
    pub fn new(
        store: Arc<LedgerStore>,
        gateway: Arc<dyn TransferGateway>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
            in_flight: InFlightGuard::new(),
        }
    }

    /// Settle one payout.
    ///
    /// The transfer is tagged `payout:<id>` so a retry after a lost response
    /// is deduplicated by the processor. No store lock is held while the
    /// transfer is in flight.
    pub async fn settle(&self, payout: &Payout) -> Result<SettleOutcome> {
        let Some(_permit) = self.in_flight.try_acquire(payout.id) else {
            tracing::debug!(payout = %payout.id, "settlement already in flight");
            return Ok(SettleOutcome::unsettled(payout.id, SettleReason::InFlight));
        };

        // Re-read under the permit: a previous call may have paid it.
        let current = self.store.payout(payout.id)?;
        if current.is_paid() {
            return Ok(SettleOutcome::paid(current.id, current.transfer_id));
        }

        let Some(destination) = self.store.destination(current.creator_user_id) else {
            let reason = SettleReason::MissingDestination;
            self.store.record_settle_failure(current.id, &reason.to_string())?;
            tracing::info!(
                payout = %current.id,
                creator = %current.creator_user_id,
                "payout left due: no destination"
            );
            return Ok(SettleOutcome::unsettled(current.id, reason));
        };

        let request = TransferRequest {
            destination,
            amount_cents: current.amount_cents,
            currency: self.config.currency.clone(),
            idempotency_tag: current.transfer_idempotency_tag(),
            metadata: BTreeMap::from([
                ("payout_id".to_owned(), current.id.0.to_string()),
                ("campaign_id".to_owned(), current.campaign_id.0.to_string()),
                (
                    "creator_user_id".to_owned(),
                    current.creator_user_id.0.to_string(),
                ),
            ]),
        };

        let timeout = self.config.transfer_timeout();
        let transfer = match tokio::time::timeout(timeout, self.gateway.create_transfer(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout {
                after_ms: self.config.transfer_timeout_ms,
            }),
        };

        match transfer {
            Ok(transfer_id) => match self.store.mark_payout_paid(current.id, transfer_id)? {
                PaidTransition::Transitioned(paid) => {
                    tracing::info!(
                        payout = %paid.id,
                        campaign = %paid.campaign_id,
                        amount = paid.amount_cents,
                        transfer = ?paid.transfer_id,
                        "payout settled"
                    );
                    Ok(SettleOutcome::paid(paid.id, paid.transfer_id))
                }
                PaidTransition::AlreadyPaid(paid) => {
                    Ok(SettleOutcome::paid(paid.id, paid.transfer_id))
                }
            },
            Err(err) => {
                self.store.record_settle_failure(current.id, &err.to_string())?;
                tracing::warn!(payout = %current.id, error = %err, "transfer failed; payout stays due");
                Ok(SettleOutcome::unsettled(
                    current.id,
                    SettleReason::TransferFailed(err),
                ))
            }
        }
    }

    pub async fn settle_payout(&self, id: PayoutId) -> Result<SettleOutcome> {
        let payout = self.store.payout(id)?;
        self.settle(&payout).await
    }

    /// Settle up to `limit` due payouts, oldest first.
    pub async fn settle_due(&self, limit: usize) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for payout in self.store.due_payouts(limit) {
            report.attempted += 1;
            let outcome = self.settle(&payout).await?;
            if outcome.settled {
                report.settled += 1;
            } else {
                report.unsettled.push(outcome);
            }
        }
        tracing::info!(
            attempted = report.attempted,
            settled = report.settled,
            "due payout sweep finished"
        );
        Ok(report)
    }

    #[must_use]
    pub fn sweep_batch_size(&self) -> usize {
        self.config.sweep_batch_size
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use curator_types::{
        Campaign, Conversion, ConversionStatus, DestinationAccount, PayoutStatus, Product, UserId,
    };

    use super::*;
    use crate::transfer::RecordingGateway;

    struct Fixture {
        store: Arc<LedgerStore>,
        gateway: Arc<RecordingGateway>,
        settler: PayoutSettler,
        payout: Payout,
    }

    async fn fixture(config: SettlementConfig) -> Fixture {
        let store = Arc::new(LedgerStore::default());
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(2500, 10_000);
        campaign.product_id = product.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign.clone()).unwrap();

        let conversion = Conversion::dummy(campaign.id, ConversionStatus::Approved, 2500);
        let payout = Payout::due_for(&conversion);
        let mut txn = store.begin(campaign.id).await.unwrap();
        txn.campaign_mut().budget_available_cents -= 2500;
        txn.insert_conversion(conversion).unwrap();
        txn.insert_payout(payout.clone()).unwrap();
        txn.commit().unwrap();

        let gateway = Arc::new(RecordingGateway::new());
        let settler = PayoutSettler::new(store.clone(), gateway.clone(), config);
        Fixture {
            store,
            gateway,
            settler,
            payout,
        }
    }

    #[tokio::test]
    async fn missing_destination_leaves_payout_due() {
        let f = fixture(SettlementConfig::default()).await;
        let out = f.settler.settle(&f.payout).await.unwrap();
        assert!(!out.settled);
        assert_eq!(out.reason, Some(SettleReason::MissingDestination));
        assert_eq!(f.gateway.calls(), 0);
        let stored = f.store.payout(f.payout.id).unwrap();
        assert_eq!(stored.status, PayoutStatus::Due);
        assert_eq!(stored.last_failure.as_deref(), Some("missing_destination"));
    }

    #[tokio::test]
    async fn settles_once_and_replays_recorded_transfer() {
        let f = fixture(SettlementConfig::default()).await;
        f.store
            .set_destination(f.payout.creator_user_id, DestinationAccount::new("acct_1"));

        let first = f.settler.settle(&f.payout).await.unwrap();
        assert!(first.settled);
        let transfer = first.transfer_id.clone().unwrap();

        let second = f.settler.settle(&f.payout).await.unwrap();
        assert!(second.settled);
        assert_eq!(second.transfer_id, Some(transfer));
        assert_eq!(f.gateway.calls(), 1);

        let req = &f.gateway.requests()[0];
        assert_eq!(req.idempotency_tag, format!("payout:{}", f.payout.id.0));
        assert_eq!(req.amount_cents, 2500);
        assert_eq!(req.currency, "usd");
    }

    #[tokio::test]
    async fn transfer_failure_is_recorded_and_retryable() {
        let f = fixture(SettlementConfig::default()).await;
        f.store
            .set_destination(f.payout.creator_user_id, DestinationAccount::new("acct_1"));
        f.gateway.fail_with(TransferError::Rejected {
            reason: "account restricted".into(),
        });

        let out = f.settler.settle(&f.payout).await.unwrap();
        assert!(!out.settled);
        assert!(matches!(out.reason, Some(SettleReason::TransferFailed(_))));
        let stored = f.store.payout(f.payout.id).unwrap();
        assert_eq!(stored.status, PayoutStatus::Due);
        assert_eq!(stored.attempts, 1);

        f.gateway.succeed();
        let report = f.settler.settle_due(10).await.unwrap();
        assert_eq!(report.settled, 1);
        let stored = f.store.payout(f.payout.id).unwrap();
        assert!(stored.is_paid());
        assert_eq!(stored.attempts, 2);
        assert!(stored.last_failure.is_none());
    }

    #[tokio::test]
    async fn slow_processor_times_out() {
        let f = fixture(SettlementConfig {
            transfer_timeout_ms: 20,
            ..SettlementConfig::default()
        })
        .await;
        f.store
            .set_destination(f.payout.creator_user_id, DestinationAccount::new("acct_1"));
        f.gateway.stall(Duration::from_millis(500));

        let out = f.settler.settle(&f.payout).await.unwrap();
        assert_eq!(
            out.reason,
            Some(SettleReason::TransferFailed(TransferError::Timeout { after_ms: 20 }))
        );
        assert!(!f.store.payout(f.payout.id).unwrap().is_paid());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_settles_pay_once() {
        let f = fixture(SettlementConfig::default()).await;
        f.store
            .set_destination(f.payout.creator_user_id, DestinationAccount::new("acct_1"));
        f.gateway.stall(Duration::from_millis(30));
        let settler = Arc::new(f.settler);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let settler = settler.clone();
            let payout = f.payout.clone();
            tasks.spawn(async move { settler.settle(&payout).await.unwrap() });
        }
        while let Some(res) = tasks.join_next().await {
            let out = res.unwrap();
            assert!(out.settled || out.reason == Some(SettleReason::InFlight));
        }
        assert_eq!(f.gateway.transfers_created(), 1);
        assert!(f.store.payout(f.payout.id).unwrap().is_paid());
    }

    #[test]
    fn reasons_render_wire_names() {
        assert_eq!(SettleReason::MissingDestination.to_string(), "missing_destination");
        assert_eq!(SettleReason::InFlight.to_string(), "in_flight");
    }
}
