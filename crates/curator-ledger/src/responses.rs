//! Request bodies and response payloads of the operation surface.
//!
//! Field names are the wire names (`snake_case`). Optional fields are
//! omitted when absent.

use curator_ingress::{ApproveOutcome, ConversionRequest, SubmitOutcome};
use curator_settlement::{FundingOutcome, ReconcileReport, SettleOutcome, SweepReport};
use curator_types::{
    ApprovalMode, Campaign, CampaignId, CampaignStatus, Cents, Conversion, ConversionId,
    ConversionStatus, ConversionType, Partnership, PartnershipId, PartnershipStatus, PayoutId,
    ProductId, RefCode, TransferId,
};
use serde::{Deserialize, Serialize};

/// Body of a conversion submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitConversionBody {
    pub ref_code: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl From<SubmitConversionBody> for ConversionRequest {
    fn from(body: SubmitConversionBody) -> Self {
        Self {
            ref_code: body.ref_code,
            event_type: body.event_type,
            external_user_id: body.external_user_id,
            idempotency_key: body.idempotency_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitConversionResponse {
    pub conversion_id: ConversionId,
    pub status: ConversionStatus,
    pub payout_amount_cents: Cents,
    pub deduped: bool,
    /// `paid` or `due` when a payout exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_status: Option<String>,
}

impl SubmitConversionResponse {
    pub(crate) fn new(outcome: &SubmitOutcome, payout_status: Option<String>) -> Self {
        Self {
            conversion_id: outcome.conversion.id,
            status: outcome.conversion.status,
            payout_amount_cents: outcome.conversion.payout_amount_cents,
            deduped: outcome.deduped,
            payout_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleResponse {
    pub payout_id: PayoutId,
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&SettleOutcome> for SettleResponse {
    fn from(outcome: &SettleOutcome) -> Self {
        Self {
            payout_id: outcome.payout_id,
            settled: outcome.settled,
            transfer_id: outcome.transfer_id.clone(),
            reason: outcome.reason.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub conversion_id: ConversionId,
    pub status: ConversionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<PayoutId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettleResponse>,
}

impl ApproveResponse {
    pub(crate) fn new(outcome: &ApproveOutcome, settlement: Option<SettleResponse>) -> Self {
        let conversion = outcome.conversion();
        Self {
            approved: outcome.approved(),
            reason: outcome.reason(),
            conversion_id: conversion.id,
            status: conversion.status,
            payout_id: outcome.payout().map(|p| p.id),
            settlement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionView {
    pub conversion_id: ConversionId,
    pub campaign_id: CampaignId,
    pub status: ConversionStatus,
    pub payout_amount_cents: Cents,
}

impl From<&Conversion> for ConversionView {
    fn from(c: &Conversion) -> Self {
        Self {
            conversion_id: c.id,
            campaign_id: c.campaign_id,
            status: c.status,
            payout_amount_cents: c.payout_amount_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignView {
    pub campaign_id: CampaignId,
    pub product_id: ProductId,
    pub title: String,
    pub conversion_type: ConversionType,
    pub approval_mode: ApprovalMode,
    pub cpa_amount_cents: Cents,
    pub budget_total_cents: Cents,
    pub budget_available_cents: Cents,
    pub status: CampaignStatus,
}

impl From<&Campaign> for CampaignView {
    fn from(c: &Campaign) -> Self {
        Self {
            campaign_id: c.id,
            product_id: c.product_id,
            title: c.title.clone(),
            conversion_type: c.conversion_type,
            approval_mode: c.approval_mode,
            cpa_amount_cents: c.cpa_amount_cents,
            budget_total_cents: c.budget_total_cents,
            budget_available_cents: c.budget_available_cents,
            status: c.status,
        }
    }
}

/// Inputs of a new campaign. Budget always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub product_id: ProductId,
    pub title: String,
    pub conversion_type: ConversionType,
    pub approval_mode: ApprovalMode,
    pub cpa_amount_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipView {
    pub partnership_id: PartnershipId,
    pub campaign_id: CampaignId,
    pub ref_code: RefCode,
    pub status: PartnershipStatus,
    pub cpa_amount_cents: Cents,
}

impl From<&Partnership> for PartnershipView {
    fn from(p: &Partnership) -> Self {
        Self {
            partnership_id: p.id,
            campaign_id: p.campaign_id,
            ref_code: p.ref_code.clone(),
            status: p.status,
            cpa_amount_cents: p.terms.cpa_amount_cents,
        }
    }
}

/// Returned by product registration and key rotation. `api_key` is the only
/// time the raw key is ever shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductKeyResponse {
    pub product_id: ProductId,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub campaign_id: CampaignId,
    pub funded_payouts: Vec<PayoutId>,
    pub still_unfunded: usize,
    pub settlements: Vec<SettleResponse>,
}

impl ReconcileResponse {
    pub(crate) fn new(report: &ReconcileReport, settlements: Vec<SettleResponse>) -> Self {
        Self {
            campaign_id: report.campaign_id,
            funded_payouts: report.funded.iter().map(|p| p.id).collect(),
            still_unfunded: report.still_unfunded,
            settlements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingResponse {
    pub applied: bool,
    pub campaign: CampaignView,
    pub reconciled: ReconcileResponse,
}

impl FundingResponse {
    pub(crate) fn new(outcome: &FundingOutcome, settlements: Vec<SettleResponse>) -> Self {
        Self {
            applied: outcome.applied,
            campaign: CampaignView::from(&outcome.campaign),
            reconciled: ReconcileResponse::new(&outcome.reconciled, settlements),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeResponse {
    pub campaign: CampaignView,
    pub reconciled: ReconcileResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResponse {
    pub attempted: usize,
    pub settled: usize,
    pub unsettled: Vec<SettleResponse>,
}

impl From<&SweepReport> for SweepResponse {
    fn from(report: &SweepReport) -> Self {
        Self {
            attempted: report.attempted,
            settled: report.settled,
            unsettled: report.unsettled.iter().map(SettleResponse::from).collect(),
        }
    }
}
