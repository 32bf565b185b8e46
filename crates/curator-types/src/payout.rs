//! # Payout: money owed to a creator
//!
//! ## State Machine
//!
//! ```text
//!        transfer ok   ┌──────┐
//!   DUE ──────────────▶│ PAID │
//!   ▲ │                └──────┘
//!   └─┘ transfer failed (retryable)
//! ```
//!
//! A payout row exists only if the campaign budget was debited by exactly
//! `amount_cents` in the same transaction that inserted it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, Cents, Conversion, ConversionId, PayoutId, TransferId, UserId};

/// Lifecycle state of a payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Owed and waiting for a successful transfer.
    Due,
    /// Transfer confirmed by the processor. Terminal.
    Paid,
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Due => write!(f, "due"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

/// A payout record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub conversion_id: ConversionId,
    pub campaign_id: CampaignId,
    pub creator_user_id: UserId,
    pub amount_cents: Cents,
    pub status: PayoutStatus,
    pub transfer_id: Option<TransferId>,
    /// Settlement attempts that reached the processor or found no destination.
    pub attempts: u32,
    /// Last settlement failure, kept for operators.
    pub last_failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payout {
    /// A `due` payout for an approved conversion, for its snapshotted amount.
    #[must_use]
    pub fn due_for(conversion: &Conversion) -> Self {
        Self {
            id: PayoutId::new(),
            conversion_id: conversion.id,
            campaign_id: conversion.campaign_id,
            creator_user_id: conversion.creator_user_id,
            amount_cents: conversion.payout_amount_cents,
            status: PayoutStatus::Due,
            transfer_id: None,
            attempts: 0,
            last_failure: None,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    /// Tag sent with the transfer request so the processor collapses retries.
    #[must_use]
    pub fn transfer_idempotency_tag(&self) -> String {
        transfer_idempotency_tag(self.id)
    }

    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == PayoutStatus::Paid
    }
}

/// Idempotency tag for the transfer realizing `payout_id`.
#[must_use]
pub fn transfer_idempotency_tag(payout_id: PayoutId) -> String {
    format!("payout:{}", payout_id.0)
}
