//! # curator-types
//!
//! Shared types, errors, and configuration for the **Curator** settlement
//! ledger.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`CampaignId`], [`ProductId`], [`PartnershipId`], [`ConversionId`], [`PayoutId`], [`UserId`], [`RefCode`], [`IdempotencyKey`]
//! - **Campaign model**: [`Campaign`], [`CampaignStatus`], [`ConversionType`], [`ApprovalMode`]
//! - **Partnership model**: [`Partnership`], [`PartnershipStatus`], [`TermsSnapshot`]
//! - **Conversion model**: [`Conversion`], [`ConversionStatus`], [`WithheldReason`]
//! - **Payout model**: [`Payout`], [`PayoutStatus`], [`TransferId`], [`DestinationAccount`]
//! - **Tenancy**: [`Product`], [`ApiKeyHash`], [`AuthContext`], [`Role`]
//! - **Funding & traffic**: [`FundingEvent`], [`ClickEvent`]
//! - **Configuration**: [`LedgerConfig`] and its sections
//! - **Errors**: [`LedgerError`] with `CL_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod auth;
pub mod campaign;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod error;
pub mod events;
pub mod ids;
pub mod partnership;
pub mod payout;
pub mod product;

// Re-export all primary types at crate root:
//   use curator_types::{Campaign, Conversion, Payout, ...};

pub use auth::*;
pub use campaign::*;
pub use config::*;
pub use conversion::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use partnership::*;
pub use payout::*;
pub use product::*;

/// Money amounts are integer cents throughout the ledger.
pub type Cents = u64;
