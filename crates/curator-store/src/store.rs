//! Tables, indexes, and non-campaign mutations.
//!
//! Campaign rows are owned by their row locks. Everything else lives in
//! [`Tables`] behind one short-held mutex. Writes that touch budget go
//! through a [`CampaignTxn`]; the plain methods here cover rows whose
//! invariants are single-row (products, partnerships, destinations, payout
//! status).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use curator_types::{
    ApiKeyHash, Campaign, CampaignId, CheckoutSessionId, ClickEvent, Conversion, ConversionId,
    DestinationAccount, FundingEvent, IdempotencyKey, LedgerError, Partnership, PartnershipId,
    PartnershipStatus, Payout, PayoutId, PayoutStatus, Product, ProductId, RefCode, Result,
    StoreConfig, TransferId, UserId,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::txn::CampaignTxn;

/// Names of the uniqueness constraints, as reported in
/// [`LedgerError::UniqueViolation`].
pub mod constraints {
    pub const CAMPAIGN_ID: &str = "campaigns.id";
    pub const PRODUCT_API_KEY: &str = "products.api_key_hash";
    pub const PARTNERSHIP_REF_CODE: &str = "partnerships.ref_code";
    pub const PARTNERSHIP_MEMBER: &str = "partnerships.campaign_id_creator_user_id";
    pub const CONVERSION_IDEMPOTENCY: &str = "conversions.partnership_id_idempotency_key";
    pub const PAYOUT_CONVERSION: &str = "payouts.conversion_id";
    pub const FUNDING_SESSION: &str = "funding_events.checkout_session_id";
}

/// Committed rows other than campaigns.
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) products: HashMap<ProductId, Product>,
    pub(crate) products_by_key: HashMap<ApiKeyHash, ProductId>,
    pub(crate) campaign_products: HashMap<CampaignId, ProductId>,
    pub(crate) partnerships: HashMap<PartnershipId, Partnership>,
    pub(crate) partnerships_by_ref: HashMap<RefCode, PartnershipId>,
    pub(crate) partnerships_by_member: HashMap<(CampaignId, UserId), PartnershipId>,
    pub(crate) conversions: HashMap<ConversionId, Conversion>,
    pub(crate) conversions_by_key: HashMap<(PartnershipId, IdempotencyKey), ConversionId>,
    pub(crate) payouts: HashMap<PayoutId, Payout>,
    pub(crate) payouts_by_conversion: HashMap<ConversionId, PayoutId>,
    pub(crate) funding: HashMap<CheckoutSessionId, FundingEvent>,
    pub(crate) destinations: HashMap<UserId, DestinationAccount>,
    pub(crate) clicks: Vec<ClickEvent>,
}

/// Outcome of [`LedgerStore::mark_payout_paid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaidTransition {
    /// `due → paid` happened now.
    Transitioned(Payout),
    /// The payout was already paid. The recorded transfer is kept.
    AlreadyPaid(Payout),
}

impl PaidTransition {
    #[must_use]
    pub fn payout(&self) -> &Payout {
        match self {
            Self::Transitioned(p) | Self::AlreadyPaid(p) => p,
        }
    }
}

/// In-process transactional store.
///
/// Construct one per process and share it as `Arc<LedgerStore>`.
pub struct LedgerStore {
    campaigns: RwLock<HashMap<CampaignId, Arc<RowLock<Campaign>>>>,
    pub(crate) tables: Mutex<Tables>,
    lock_timeout: Duration,
}

impl LedgerStore {
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            campaigns: RwLock::new(HashMap::new()),
            tables: Mutex::new(Tables::default()),
            lock_timeout: config.lock_timeout(),
        }
    }

    // -----------------------------------------------------------------
    // Campaigns
    // -----------------------------------------------------------------

    /// Insert a new campaign row. Its product must exist.
    pub fn insert_campaign(&self, campaign: Campaign) -> Result<()> {
        campaign.check_budget_bounds()?;
        let mut rows = self.campaigns.write();
        if rows.contains_key(&campaign.id) {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::CAMPAIGN_ID,
            });
        }
        {
            let mut tables = self.tables.lock();
            if !tables.products.contains_key(&campaign.product_id) {
                return Err(LedgerError::ProductNotFound);
            }
            tables.campaign_products.insert(campaign.id, campaign.product_id);
        }
        tracing::debug!(campaign = %campaign.id, product = %campaign.product_id, "campaign inserted");
        rows.insert(campaign.id, Arc::new(RowLock::new(campaign)));
        Ok(())
    }

    /// Committed state of a campaign. Waits for any open transaction on it.
    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign> {
        let guard = self.lock_row(id).await?;
        Ok(guard.clone())
    }

    /// The product a campaign belongs to. Never changes after insert, so it
    /// is readable without the row lock.
    #[must_use]
    pub fn product_for_campaign(&self, campaign: CampaignId) -> Option<Product> {
        let tables = self.tables.lock();
        tables
            .campaign_products
            .get(&campaign)
            .and_then(|id| tables.products.get(id))
            .cloned()
    }

    /// All campaign ids, in no particular order.
    #[must_use]
    pub fn campaign_ids(&self) -> Vec<CampaignId> {
        self.campaigns.read().keys().copied().collect()
    }

    /// Open a transaction holding the exclusive lock on one campaign row.
    ///
    /// # Errors
    /// - [`LedgerError::CampaignNotFound`] for an unknown campaign
    /// - [`LedgerError::LockTimeout`] if the lock is not acquired in time
    pub async fn begin(&self, id: CampaignId) -> Result<CampaignTxn<'_>> {
        let guard = self.lock_row(id).await?;
        tracing::debug!(campaign = %id, "campaign row locked");
        Ok(CampaignTxn::new(self, guard))
    }

    async fn lock_row(&self, id: CampaignId) -> Result<OwnedMutexGuard<Campaign>> {
        let row = self
            .campaigns
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::CampaignNotFound(id))?;
        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(campaign = %id, timeout_ms = self.lock_timeout.as_millis(), "campaign lock timeout");
                LedgerError::LockTimeout(id)
            })
    }

    // -----------------------------------------------------------------
    // Products
    // -----------------------------------------------------------------

    pub fn insert_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.lock();
        if let Some(hash) = &product.api_key_hash {
            if tables.products_by_key.contains_key(hash) {
                return Err(LedgerError::UniqueViolation {
                    constraint: constraints::PRODUCT_API_KEY,
                });
            }
            tables.products_by_key.insert(hash.clone(), product.id);
        }
        tables.products.insert(product.id, product);
        Ok(())
    }

    pub fn product(&self, id: ProductId) -> Result<Product> {
        self.tables
            .lock()
            .products
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ProductNotFound)
    }

    #[must_use]
    pub fn product_by_key_hash(&self, hash: &ApiKeyHash) -> Option<Product> {
        let tables = self.tables.lock();
        tables
            .products_by_key
            .get(hash)
            .and_then(|id| tables.products.get(id))
            .cloned()
    }

    /// Replace a product's API key hash. The old key stops working at once.
    pub fn set_product_key(&self, id: ProductId, hash: ApiKeyHash) -> Result<Product> {
        let mut tables = self.tables.lock();
        if tables.products_by_key.contains_key(&hash) {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::PRODUCT_API_KEY,
            });
        }
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(LedgerError::ProductNotFound)?;
        let old = product.api_key_hash.replace(hash.clone());
        let updated = product.clone();
        if let Some(old) = old {
            tables.products_by_key.remove(&old);
        }
        tables.products_by_key.insert(hash, id);
        Ok(updated)
    }

    // -----------------------------------------------------------------
    // Partnerships
    // -----------------------------------------------------------------

    /// Insert a partnership, enforcing unique ref code and one partnership
    /// per (campaign, creator).
    pub fn insert_partnership(&self, partnership: Partnership) -> Result<()> {
        if !self.campaigns.read().contains_key(&partnership.campaign_id) {
            return Err(LedgerError::CampaignNotFound(partnership.campaign_id));
        }
        let mut tables = self.tables.lock();
        if tables.partnerships_by_ref.contains_key(&partnership.ref_code) {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::PARTNERSHIP_REF_CODE,
            });
        }
        let member = (partnership.campaign_id, partnership.creator_user_id);
        if tables.partnerships_by_member.contains_key(&member) {
            return Err(LedgerError::UniqueViolation {
                constraint: constraints::PARTNERSHIP_MEMBER,
            });
        }
        tables
            .partnerships_by_ref
            .insert(partnership.ref_code.clone(), partnership.id);
        tables.partnerships_by_member.insert(member, partnership.id);
        tables.partnerships.insert(partnership.id, partnership);
        Ok(())
    }

    pub fn partnership(&self, id: PartnershipId) -> Result<Partnership> {
        self.tables
            .lock()
            .partnerships
            .get(&id)
            .cloned()
            .ok_or(LedgerError::PartnershipNotFound)
    }

    #[must_use]
    pub fn partnership_by_ref(&self, ref_code: &RefCode) -> Option<Partnership> {
        let tables = self.tables.lock();
        tables
            .partnerships_by_ref
            .get(ref_code)
            .and_then(|id| tables.partnerships.get(id))
            .cloned()
    }

    #[must_use]
    pub fn partnership_for(&self, campaign: CampaignId, creator: UserId) -> Option<Partnership> {
        let tables = self.tables.lock();
        tables
            .partnerships_by_member
            .get(&(campaign, creator))
            .and_then(|id| tables.partnerships.get(id))
            .cloned()
    }

    /// Move a creator's own partnership to `status`.
    ///
    /// # Errors
    /// [`LedgerError::PartnershipNotFound`] if the partnership does not belong
    /// to `creator`, [`LedgerError::InvalidTransition`] if the move is
    /// not allowed.
    pub fn set_partnership_status(
        &self,
        id: PartnershipId,
        creator: UserId,
        status: PartnershipStatus,
    ) -> Result<Partnership> {
        let mut tables = self.tables.lock();
        let partnership = tables
            .partnerships
            .get_mut(&id)
            .filter(|p| p.creator_user_id == creator)
            .ok_or(LedgerError::PartnershipNotFound)?;
        if partnership.status == status {
            return Ok(partnership.clone());
        }
        if !partnership.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                from: format!("{:?}", partnership.status),
                to: format!("{status:?}"),
            });
        }
        partnership.status = status;
        partnership.updated_at = Utc::now();
        Ok(partnership.clone())
    }

    // -----------------------------------------------------------------
    // Conversions & payouts (reads)
    // -----------------------------------------------------------------

    pub fn conversion(&self, id: ConversionId) -> Result<Conversion> {
        self.tables
            .lock()
            .conversions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ConversionNotFound(id))
    }

    #[must_use]
    pub fn conversion_by_key(
        &self,
        partnership: PartnershipId,
        key: &IdempotencyKey,
    ) -> Option<Conversion> {
        let tables = self.tables.lock();
        tables
            .conversions_by_key
            .get(&(partnership, key.clone()))
            .and_then(|id| tables.conversions.get(id))
            .cloned()
    }

    #[must_use]
    pub fn conversions_for_campaign(&self, campaign: CampaignId) -> Vec<Conversion> {
        let mut rows: Vec<Conversion> = self
            .tables
            .lock()
            .conversions
            .values()
            .filter(|c| c.campaign_id == campaign)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        rows
    }

    pub fn payout(&self, id: PayoutId) -> Result<Payout> {
        self.tables
            .lock()
            .payouts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::PayoutNotFound(id))
    }

    #[must_use]
    pub fn payout_for_conversion(&self, conversion: ConversionId) -> Option<Payout> {
        let tables = self.tables.lock();
        tables
            .payouts_by_conversion
            .get(&conversion)
            .and_then(|id| tables.payouts.get(id))
            .cloned()
    }

    #[must_use]
    pub fn payouts_for_campaign(&self, campaign: CampaignId) -> Vec<Payout> {
        let mut rows: Vec<Payout> = self
            .tables
            .lock()
            .payouts
            .values()
            .filter(|p| p.campaign_id == campaign)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.created_at, p.id));
        rows
    }

    /// Oldest due payouts first.
    #[must_use]
    pub fn due_payouts(&self, limit: usize) -> Vec<Payout> {
        let mut rows: Vec<Payout> = self
            .tables
            .lock()
            .payouts
            .values()
            .filter(|p| p.status == PayoutStatus::Due)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.created_at, p.id));
        rows.truncate(limit);
        rows
    }

    // -----------------------------------------------------------------
    // Payout settlement bookkeeping
    // -----------------------------------------------------------------

    /// Conditional `due → paid` update.
    ///
    /// Calling it again for an already-paid payout changes nothing and keeps
    /// the first transfer id.
    pub fn mark_payout_paid(&self, id: PayoutId, transfer_id: TransferId) -> Result<PaidTransition> {
        let mut tables = self.tables.lock();
        let payout = tables
            .payouts
            .get_mut(&id)
            .ok_or(LedgerError::PayoutNotFound(id))?;
        if payout.status == PayoutStatus::Paid {
            return Ok(PaidTransition::AlreadyPaid(payout.clone()));
        }
        payout.status = PayoutStatus::Paid;
        payout.transfer_id = Some(transfer_id);
        payout.attempts = payout.attempts.saturating_add(1);
        payout.last_failure = None;
        payout.paid_at = Some(Utc::now());
        Ok(PaidTransition::Transitioned(payout.clone()))
    }

    /// Record a failed settlement attempt on a due payout.
    pub fn record_settle_failure(&self, id: PayoutId, reason: &str) -> Result<Payout> {
        let mut tables = self.tables.lock();
        let payout = tables
            .payouts
            .get_mut(&id)
            .ok_or(LedgerError::PayoutNotFound(id))?;
        if payout.status == PayoutStatus::Due {
            payout.attempts = payout.attempts.saturating_add(1);
            payout.last_failure = Some(reason.to_owned());
        }
        Ok(payout.clone())
    }

    // -----------------------------------------------------------------
    // Destinations, funding, clicks
    // -----------------------------------------------------------------

    /// Connect (or replace) a creator's payout destination.
    pub fn set_destination(&self, creator: UserId, account: DestinationAccount) {
        self.tables.lock().destinations.insert(creator, account);
    }

    #[must_use]
    pub fn destination(&self, creator: UserId) -> Option<DestinationAccount> {
        self.tables.lock().destinations.get(&creator).cloned()
    }

    #[must_use]
    pub fn funding_event(&self, session: &CheckoutSessionId) -> Option<FundingEvent> {
        self.tables.lock().funding.get(session).cloned()
    }

    #[must_use]
    pub fn funding_for_campaign(&self, campaign: CampaignId) -> Vec<FundingEvent> {
        self.tables
            .lock()
            .funding
            .values()
            .filter(|f| f.campaign_id == campaign)
            .cloned()
            .collect()
    }

    pub fn record_click(&self, click: ClickEvent) {
        self.tables.lock().clicks.push(click);
    }

    /// Clicks on any ref code of the campaign's partnerships.
    #[must_use]
    pub fn clicks_for_campaign(&self, campaign: CampaignId) -> usize {
        let tables = self.tables.lock();
        tables
            .clicks
            .iter()
            .filter(|click| {
                tables
                    .partnerships_by_ref
                    .get(&click.ref_code)
                    .and_then(|id| tables.partnerships.get(id))
                    .is_some_and(|p| p.campaign_id == campaign)
            })
            .count()
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_types::{ApprovalMode, ConversionType};

    fn seeded() -> (LedgerStore, Campaign) {
        let store = LedgerStore::default();
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let mut campaign = Campaign::dummy_funded(2500, 10_000);
        campaign.product_id = product.id;
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign.clone()).unwrap();
        (store, campaign)
    }

    #[tokio::test]
    async fn campaign_roundtrip_through_row_lock() {
        let (store, campaign) = seeded();
        let loaded = store.campaign(campaign.id).await.unwrap();
        assert_eq!(loaded, campaign);
    }

    #[tokio::test]
    async fn unknown_campaign_not_found() {
        let store = LedgerStore::default();
        let err = store.campaign(CampaignId::new()).await.unwrap_err();
        assert!(matches!(err, LedgerError::CampaignNotFound(_)));
    }

    #[test]
    fn campaign_requires_product() {
        let store = LedgerStore::default();
        let err = store
            .insert_campaign(Campaign::dummy_funded(1, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProductNotFound));
    }

    #[test]
    fn duplicate_ref_code_is_unique_violation() {
        let (store, campaign) = seeded();
        let code = RefCode::new("abcdefghij");
        store
            .insert_partnership(Partnership::invite(&campaign, UserId::new(), code.clone()))
            .unwrap();
        let err = store
            .insert_partnership(Partnership::invite(&campaign, UserId::new(), code))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UniqueViolation { constraint } if constraint == constraints::PARTNERSHIP_REF_CODE
        ));
    }

    #[test]
    fn one_partnership_per_campaign_and_creator() {
        let (store, campaign) = seeded();
        let creator = UserId::new();
        store
            .insert_partnership(Partnership::invite(&campaign, creator, RefCode::new("aaaaaaaaaa")))
            .unwrap();
        let err = store
            .insert_partnership(Partnership::invite(&campaign, creator, RefCode::new("bbbbbbbbbb")))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UniqueViolation { constraint } if constraint == constraints::PARTNERSHIP_MEMBER
        ));
    }

    #[test]
    fn partnership_status_only_changes_for_its_creator() {
        let (store, campaign) = seeded();
        let creator = UserId::new();
        let p = Partnership::invite(&campaign, creator, RefCode::new("cccccccccc"));
        store.insert_partnership(p.clone()).unwrap();

        let err = store
            .set_partnership_status(p.id, UserId::new(), PartnershipStatus::Active)
            .unwrap_err();
        assert!(matches!(err, LedgerError::PartnershipNotFound));

        let active = store
            .set_partnership_status(p.id, creator, PartnershipStatus::Active)
            .unwrap();
        assert_eq!(active.status, PartnershipStatus::Active);
        // Accepting twice is harmless.
        store
            .set_partnership_status(p.id, creator, PartnershipStatus::Active)
            .unwrap();
    }

    #[test]
    fn rotating_api_key_retires_old_hash() {
        let store = LedgerStore::default();
        let mut product = Product::new(UserId::new(), "Acme", "https://acme.test");
        product.api_key_hash = Some(ApiKeyHash::of_token("old"));
        let id = product.id;
        store.insert_product(product).unwrap();

        store.set_product_key(id, ApiKeyHash::of_token("new")).unwrap();
        assert!(store.product_by_key_hash(&ApiKeyHash::of_token("old")).is_none());
        assert_eq!(
            store.product_by_key_hash(&ApiKeyHash::of_token("new")).unwrap().id,
            id
        );
    }

    #[tokio::test]
    async fn mark_paid_is_idempotent() {
        let (store, campaign) = seeded();
        let conversion = Conversion::dummy(campaign.id, curator_types::ConversionStatus::Approved, 2500);
        let payout = Payout::due_for(&conversion);
        let payout_id = payout.id;
        let mut txn = store.begin(campaign.id).await.unwrap();
        txn.insert_conversion(conversion).unwrap();
        txn.insert_payout(payout).unwrap();
        txn.commit().unwrap();

        let first = store.mark_payout_paid(payout_id, TransferId::new("tr_1")).unwrap();
        assert!(matches!(first, PaidTransition::Transitioned(_)));
        let second = store.mark_payout_paid(payout_id, TransferId::new("tr_2")).unwrap();
        match second {
            PaidTransition::AlreadyPaid(p) => {
                assert_eq!(p.transfer_id, Some(TransferId::new("tr_1")));
            }
            PaidTransition::Transitioned(_) => panic!("second mark must not transition"),
        }
        assert!(store.due_payouts(10).is_empty());
    }

    #[tokio::test]
    async fn lock_timeout_while_row_held() {
        let store = LedgerStore::new(&StoreConfig { lock_timeout_ms: 20 });
        let product = Product::new(UserId::new(), "Acme", "https://acme.test");
        let campaign = Campaign::draft(
            product.id,
            "t",
            ConversionType::Signup,
            ApprovalMode::Auto,
            1,
        );
        store.insert_product(product).unwrap();
        store.insert_campaign(campaign.clone()).unwrap();

        let _held = store.begin(campaign.id).await.unwrap();
        let err = store.begin(campaign.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout(id) if id == campaign.id));
    }

    #[test]
    fn clicks_are_attributed_through_ref_codes() {
        let (store, campaign) = seeded();
        let code = RefCode::new("dddddddddd");
        store
            .insert_partnership(Partnership::invite(&campaign, UserId::new(), code.clone()))
            .unwrap();
        for _ in 0..3 {
            store.record_click(ClickEvent {
                ref_code: code.clone(),
                ip_hash: None,
                user_agent_hash: None,
                at: Utc::now(),
            });
        }
        store.record_click(ClickEvent {
            ref_code: RefCode::new("unknown000"),
            ip_hash: None,
            user_agent_hash: None,
            at: Utc::now(),
        });
        assert_eq!(store.clicks_for_campaign(campaign.id), 3);
    }
}
