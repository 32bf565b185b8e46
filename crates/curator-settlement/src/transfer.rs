//! Payment processor port.
//!
//! The ledger only needs "transfer succeeded with id X" or "transfer
//! failed". Implementations must deduplicate on
//! [`TransferRequest::idempotency_tag`]: two requests with the same tag
//! must never move money twice.

use std::collections::BTreeMap;

use async_trait::async_trait;
use curator_types::{Cents, DestinationAccount, TransferId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination: DestinationAccount,
    pub amount_cents: Cents,
    pub currency: String,
    /// `payout:<payout id>`. Stable across retries of the same payout.
    pub idempotency_tag: String,
    /// Opaque labels forwarded to the processor (payout, campaign, creator).
    pub metadata: BTreeMap<String, String>,
}

/// Processor-side failure. The payout stays `due`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The processor refused the transfer (bad destination, insufficient
    /// platform balance, ...).
    #[error("transfer rejected: {reason}")]
    Rejected { reason: String },

    #[error("processor unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("transfer timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn create_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferId, TransferError>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub use recording::RecordingGateway;

#[cfg(any(test, feature = "test-helpers"))]
mod recording {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::{TransferError, TransferGateway, TransferRequest, async_trait};
    use curator_types::TransferId;

    /// In-memory processor double.
    ///
    /// Deduplicates on the idempotency tag like a real processor, counts
    /// calls, and can be told to fail or stall.
    #[derive(Default)]
    pub struct RecordingGateway {
        calls: AtomicUsize,
        transfers: Mutex<HashMap<String, TransferId>>,
        requests: Mutex<Vec<TransferRequest>>,
        failure: Mutex<Option<TransferError>>,
        delay: Mutex<Option<Duration>>,
    }

    impl RecordingGateway {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every call with `err` until [`Self::succeed`] is called.
        pub fn fail_with(&self, err: TransferError) {
            *self.failure.lock() = Some(err);
        }

        pub fn succeed(&self) {
            *self.failure.lock() = None;
        }

        /// Sleep before answering each call.
        pub fn stall(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Calls received, including failed and deduplicated ones.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Distinct transfers actually created.
        pub fn transfers_created(&self) -> usize {
            self.transfers.lock().len()
        }

        pub fn requests(&self) -> Vec<TransferRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl TransferGateway for RecordingGateway {
        async fn create_transfer(
            &self,
            request: &TransferRequest,
        ) -> Result<TransferId, TransferError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            let mut transfers = self.transfers.lock();
            let id = transfers
                .entry(request.idempotency_tag.clone())
                .or_insert_with(|| TransferId::new(format!("tr_{n:06}")));
            Ok(id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tag: &str) -> TransferRequest {
        TransferRequest {
            destination: DestinationAccount::new("acct_1"),
            amount_cents: 2500,
            currency: "usd".into(),
            idempotency_tag: tag.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn recording_gateway_dedups_on_tag() {
        let gw = RecordingGateway::new();
        let a = gw.create_transfer(&request("payout:1")).await.unwrap();
        let b = gw.create_transfer(&request("payout:1")).await.unwrap();
        let c = gw.create_transfer(&request("payout:2")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(gw.calls(), 3);
        assert_eq!(gw.transfers_created(), 2);
    }

    #[tokio::test]
    async fn recording_gateway_failure_switch() {
        let gw = RecordingGateway::new();
        gw.fail_with(TransferError::Unavailable {
            reason: "maintenance".into(),
        });
        assert!(gw.create_transfer(&request("payout:1")).await.is_err());
        gw.succeed();
        assert!(gw.create_transfer(&request("payout:1")).await.is_ok());
        assert_eq!(gw.transfers_created(), 1);
    }

    #[test]
    fn errors_render_reason() {
        let err = TransferError::Timeout { after_ms: 10_000 };
        assert_eq!(err.to_string(), "transfer timed out after 10000ms");
    }
}
