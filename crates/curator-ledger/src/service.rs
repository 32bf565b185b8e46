//! The ledger's operation surface.
//!
//! [`LedgerService`] wires one [`LedgerStore`] to the intake and settlement
//! planes, applies role checks and rate limits, and settles freshly created
//! payouts opportunistically. Settlement failures never undo a committed
//! conversion: the payout just stays `due` for a later sweep.

use std::sync::Arc;

use curator_ingress::{
    ClickRedirect, ConversionIntake, ConversionRequest, MemoryRateLimiter, Partnerships,
    RateLimiter, new_api_key, require_campaign_owner,
};
use curator_settlement::{
    BudgetAudit, BudgetConservation, CampaignAnalytics, CampaignControl, FundingLedger,
    PayoutSettler, Reconciler, TransferGateway, campaign_analytics,
};
use curator_store::LedgerStore;
use curator_types::{
    AuthContext, Campaign, CampaignId, Cents, CheckoutSessionId, ConversionId, DestinationAccount,
    LedgerConfig, LedgerError, PartnershipId, Payout, PayoutId, Product, ProductId, RefCode,
    Result, Role, UserId, require_role,
};

use crate::responses::{
    ApproveResponse, CampaignView, ConversionView, FundingResponse, NewCampaign,
    PartnershipView, ProductKeyResponse, ReconcileResponse, ResumeResponse, SettleResponse,
    SubmitConversionResponse, SweepResponse,
};

const BUILDER_ROLES: &[Role] = &[Role::Builder, Role::Admin];
const ADMIN_ROLES: &[Role] = &[Role::Admin];
const CREATOR_ROLES: &[Role] = &[Role::Creator];

pub struct LedgerService {
    config: LedgerConfig,
    store: Arc<LedgerStore>,
    intake: ConversionIntake,
    partnerships: Partnerships,
    settler: PayoutSettler,
    funding: FundingLedger,
    control: CampaignControl,
    reconciler: Reconciler,
    conservation: BudgetConservation,
    limiter: Arc<dyn RateLimiter>,
}

impl LedgerService {
    /// Build a service over a fresh store.
    ///
    /// # Errors
    /// [`LedgerError::Configuration`] if `config` does not validate.
    pub fn new(config: LedgerConfig, gateway: Arc<dyn TransferGateway>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(LedgerStore::new(&config.store));
        let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new(&config.rate_limit));
        Ok(Self {
            intake: ConversionIntake::new(store.clone(), config.retry.clone()),
            partnerships: Partnerships::new(store.clone(), config.retry.clone(), &config.credentials),
            settler: PayoutSettler::new(store.clone(), gateway, config.settlement.clone()),
            funding: FundingLedger::new(store.clone(), config.retry.clone()),
            control: CampaignControl::new(store.clone()),
            reconciler: Reconciler::new(store.clone()),
            conservation: BudgetConservation::new(store.clone()),
            limiter,
            store,
            config,
        })
    }

    /// Replace the in-memory limiter with a shared one.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Conversion intake
    // -----------------------------------------------------------------

    /// Record a conversion event sent by a builder's backend.
    ///
    /// Order of checks: rate limit, API key, request shape, ref code,
    /// tenant and event type binding. A fresh payout is settled right away
    /// when possible.
    pub async fn submit_conversion(
        &self,
        client_ip: Option<&str>,
        api_key: Option<&str>,
        request: &ConversionRequest,
    ) -> Result<SubmitConversionResponse> {
        self.throttle("conversion", client_ip).await?;
        let product = self.intake.authenticate(api_key)?;
        let event = request.validate()?;
        let partnership = self.intake.resolve_partnership(&event.ref_code)?;
        self.intake
            .validate_binding(&partnership, &product, event.event_type)
            .await?;

        let outcome = self.intake.submit(&partnership, &event).await?;
        let payout_status = match &outcome.payout {
            Some(payout) if !outcome.deduped => Some(self.settle_quietly(payout).await),
            Some(payout) => Some(payout.status.to_string()),
            None => None,
        };
        Ok(SubmitConversionResponse::new(&outcome, payout_status))
    }

    /// Manually approve a pending conversion (campaign builder or admin).
    pub async fn approve_conversion(
        &self,
        actor: Option<&AuthContext>,
        conversion: ConversionId,
    ) -> Result<ApproveResponse> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        let outcome = self.intake.approve(conversion, actor).await?;
        let settlement = match outcome.payout() {
            Some(payout) => Some(self.settle_reported(payout).await),
            None => None,
        };
        Ok(ApproveResponse::new(&outcome, settlement))
    }

    pub async fn reject_conversion(
        &self,
        actor: Option<&AuthContext>,
        conversion: ConversionId,
    ) -> Result<ConversionView> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        let rejected = self.intake.reject(conversion, actor).await?;
        Ok(ConversionView::from(&rejected))
    }

    // -----------------------------------------------------------------
    // Products, campaigns, partnerships
    // -----------------------------------------------------------------

    /// Register a product and issue its conversion API key.
    pub fn register_product(
        &self,
        actor: Option<&AuthContext>,
        name: &str,
        url: &str,
    ) -> Result<ProductKeyResponse> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        if name.trim().len() < 2 {
            return Err(LedgerError::InvalidRequest {
                reason: "product name must be at least 2 characters".into(),
            });
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(LedgerError::InvalidRequest {
                reason: "product url must be an http(s) URL".into(),
            });
        }
        let key = new_api_key(&self.config.credentials.api_key_prefix);
        let mut product = Product::new(actor.user_id, name.trim(), url);
        product.api_key_hash = Some(key.hash);
        let product_id = product.id;
        self.store.insert_product(product)?;
        tracing::info!(product = %product_id, owner = %actor.user_id, "product registered");
        Ok(ProductKeyResponse {
            product_id,
            api_key: key.token,
        })
    }

    /// Issue a new API key. The previous key stops working immediately.
    pub fn rotate_api_key(
        &self,
        actor: Option<&AuthContext>,
        product: ProductId,
    ) -> Result<ProductKeyResponse> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        self.owned_product(product, actor)?;
        let key = new_api_key(&self.config.credentials.api_key_prefix);
        self.store.set_product_key(product, key.hash)?;
        tracing::info!(product = %product, "api key rotated");
        Ok(ProductKeyResponse {
            product_id: product,
            api_key: key.token,
        })
    }

    /// Create a draft campaign with zero budget.
    pub fn create_campaign(
        &self,
        actor: Option<&AuthContext>,
        input: NewCampaign,
    ) -> Result<CampaignView> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        self.owned_product(input.product_id, actor)?;
        if input.title.trim().len() < 3 {
            return Err(LedgerError::InvalidRequest {
                reason: "campaign title must be at least 3 characters".into(),
            });
        }
        let campaign = Campaign::draft(
            input.product_id,
            input.title.trim(),
            input.conversion_type,
            input.approval_mode,
            input.cpa_amount_cents,
        );
        let view = CampaignView::from(&campaign);
        self.store.insert_campaign(campaign)?;
        tracing::info!(
            campaign = %view.campaign_id,
            product = %view.product_id,
            cpa = view.cpa_amount_cents,
            "campaign created"
        );
        Ok(view)
    }

    pub async fn invite_creator(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
        creator: UserId,
    ) -> Result<PartnershipView> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        require_campaign_owner(&self.store, campaign, actor)?;
        let partnership = self.partnerships.invite(campaign, creator).await?;
        Ok(PartnershipView::from(&partnership))
    }

    pub fn accept_partnership(
        &self,
        actor: Option<&AuthContext>,
        partnership: PartnershipId,
    ) -> Result<PartnershipView> {
        let actor = require_role(actor, CREATOR_ROLES)?;
        let accepted = self.partnerships.accept(partnership, actor.user_id)?;
        Ok(PartnershipView::from(&accepted))
    }

    /// Connect the calling creator's payout account.
    pub fn connect_payout_destination(
        &self,
        actor: Option<&AuthContext>,
        account: DestinationAccount,
    ) -> Result<()> {
        let actor = require_role(actor, CREATOR_ROLES)?;
        if account.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidRequest {
                reason: "destination account must not be empty".into(),
            });
        }
        self.store.set_destination(actor.user_id, account);
        tracing::info!(creator = %actor.user_id, "payout destination connected");
        Ok(())
    }

    /// Log a referral click and return the redirect target.
    pub async fn record_click(
        &self,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
        ref_code: &RefCode,
    ) -> Result<ClickRedirect> {
        self.throttle("redirect", client_ip).await?;
        self.partnerships.record_click(ref_code, client_ip, user_agent)
    }

    // -----------------------------------------------------------------
    // Funding and campaign control
    // -----------------------------------------------------------------

    /// Apply a completed checkout to a campaign. Called from the verified
    /// payment webhook; redelivery is harmless.
    pub async fn apply_funding(
        &self,
        session: &CheckoutSessionId,
        campaign: CampaignId,
        amount: Cents,
    ) -> Result<FundingResponse> {
        let outcome = self.funding.apply_funding(session, campaign, amount).await?;
        let settlements = self.settle_all(&outcome.reconciled.funded).await;
        Ok(FundingResponse::new(&outcome, settlements))
    }

    /// Stop payout issuance for a campaign (admin).
    pub async fn freeze_campaign(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
    ) -> Result<CampaignView> {
        require_role(actor, ADMIN_ROLES)?;
        let frozen = self.control.freeze(campaign).await?;
        Ok(CampaignView::from(&frozen))
    }

    /// Lift a freeze and fund approvals that accumulated (admin).
    pub async fn resume_campaign(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
    ) -> Result<ResumeResponse> {
        require_role(actor, ADMIN_ROLES)?;
        let (resumed, report) = self.control.resume(campaign).await?;
        let settlements = self.settle_all(&report.funded).await;
        Ok(ResumeResponse {
            campaign: CampaignView::from(&resumed),
            reconciled: ReconcileResponse::new(&report, settlements),
        })
    }

    pub async fn reconcile_campaign(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
    ) -> Result<ReconcileResponse> {
        require_role(actor, ADMIN_ROLES)?;
        let report = self.reconciler.reconcile(campaign).await?;
        let settlements = self.settle_all(&report.funded).await;
        Ok(ReconcileResponse::new(&report, settlements))
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    pub async fn settle_payout(
        &self,
        actor: Option<&AuthContext>,
        payout: PayoutId,
    ) -> Result<SettleResponse> {
        require_role(actor, ADMIN_ROLES)?;
        let outcome = self.settler.settle_payout(payout).await?;
        Ok(SettleResponse::from(&outcome))
    }

    /// Settle a batch of due payouts (scheduler or admin). `None` uses the
    /// configured batch size.
    pub async fn settle_due_payouts(
        &self,
        actor: Option<&AuthContext>,
        limit: Option<usize>,
    ) -> Result<SweepResponse> {
        require_role(actor, ADMIN_ROLES)?;
        let report = self
            .settler
            .settle_due(limit.unwrap_or_else(|| self.settler.sweep_batch_size()))
            .await?;
        Ok(SweepResponse::from(&report))
    }

    // -----------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------

    pub async fn campaign_analytics(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
    ) -> Result<CampaignAnalytics> {
        let actor = require_role(actor, BUILDER_ROLES)?;
        require_campaign_owner(&self.store, campaign, actor)?;
        campaign_analytics(&self.store, campaign).await
    }

    /// Verify budget conservation for one campaign (admin).
    pub async fn audit_campaign(
        &self,
        actor: Option<&AuthContext>,
        campaign: CampaignId,
    ) -> Result<BudgetAudit> {
        require_role(actor, ADMIN_ROLES)?;
        self.conservation.audit(campaign).await
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn throttle(&self, scope: &str, client_ip: Option<&str>) -> Result<()> {
        let ip = client_ip
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or("unknown");
        let key = format!("{scope}:{ip}");
        if self.limiter.check_and_consume(&key).await {
            Ok(())
        } else {
            Err(LedgerError::RateLimited { key })
        }
    }

    fn owned_product(&self, product: ProductId, actor: &AuthContext) -> Result<Product> {
        let found = self.store.product(product)?;
        if actor.is_admin() || found.owner_user_id == actor.user_id {
            Ok(found)
        } else {
            Err(LedgerError::ProductNotFound)
        }
    }

    /// Settle and report `paid` / `due`. Errors are logged, not returned:
    /// the conversion is already committed.
    async fn settle_quietly(&self, payout: &Payout) -> String {
        match self.settler.settle(payout).await {
            Ok(outcome) if outcome.settled => "paid".to_owned(),
            Ok(_) => "due".to_owned(),
            Err(err) => {
                tracing::warn!(payout = %payout.id, error = %err, "opportunistic settle failed");
                "due".to_owned()
            }
        }
    }

    async fn settle_reported(&self, payout: &Payout) -> SettleResponse {
        match self.settler.settle(payout).await {
            Ok(outcome) => SettleResponse::from(&outcome),
            Err(err) => {
                tracing::warn!(payout = %payout.id, error = %err, "opportunistic settle failed");
                SettleResponse {
                    payout_id: payout.id,
                    settled: false,
                    transfer_id: None,
                    reason: Some(err.code()),
                }
            }
        }
    }

    async fn settle_all(&self, payouts: &[Payout]) -> Vec<SettleResponse> {
        let mut out = Vec::with_capacity(payouts.len());
        for payout in payouts {
            out.push(self.settle_reported(payout).await);
        }
        out
    }
}
