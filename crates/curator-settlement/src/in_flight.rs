//! In-process guard against settling one payout twice at the same time.
//!
//! The store and processor already make a duplicate settle harmless. This
//! guard keeps a second concurrent caller from issuing a redundant
//! processor call at all.

use std::collections::HashSet;
use std::sync::Arc;

use curator_types::PayoutId;
use parking_lot::Mutex;

/// Set of payouts with a settlement currently in progress.
#[derive(Clone, Default)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<PayoutId>>>,
}

/// Held while a settlement runs. Releases the payout on drop.
pub struct InFlightPermit {
    active: Arc<Mutex<HashSet<PayoutId>>>,
    payout: PayoutId,
}

impl InFlightGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `payout`. `None` if another settlement already holds it.
    #[must_use]
    pub fn try_acquire(&self, payout: PayoutId) -> Option<InFlightPermit> {
        if !self.active.lock().insert(payout) {
            return None;
        }
        Some(InFlightPermit {
            active: self.active.clone(),
            payout,
        })
    }

    #[must_use]
    pub fn is_active(&self, payout: &PayoutId) -> bool {
        self.active.lock().contains(payout)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.active.lock().remove(&self.payout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_refused_until_release() {
        let guard = InFlightGuard::new();
        let id = PayoutId::new();
        let permit = guard.try_acquire(id).unwrap();
        assert!(guard.try_acquire(id).is_none());
        assert!(guard.is_active(&id));
        drop(permit);
        assert!(guard.is_empty());
        assert!(guard.try_acquire(id).is_some());
    }

    #[test]
    fn distinct_payouts_do_not_interfere() {
        let guard = InFlightGuard::new();
        let _a = guard.try_acquire(PayoutId::new()).unwrap();
        let _b = guard.try_acquire(PayoutId::new()).unwrap();
        assert_eq!(guard.len(), 2);
    }
}
