//! # curator-ledger
//!
//! Operation surface of the settlement ledger. A thin layer over the
//! intake and settlement planes that:
//!
//! - checks roles and campaign ownership
//! - throttles unauthenticated entry points (`conversion:<ip>`, `redirect:<ip>`)
//! - settles freshly created payouts opportunistically
//! - shapes wire responses
//!
//! ```text
//! caller ──► LedgerService ──► ConversionIntake ──► LedgerStore
//!                 │                                     ▲
//!                 └──► PayoutSettler ──► TransferGateway │
//!                 └──► FundingLedger / CampaignControl ──┘
//! ```

pub mod responses;
pub mod service;
pub mod telemetry;

pub use responses::{
    ApproveResponse, CampaignView, ConversionView, FundingResponse, NewCampaign, PartnershipView,
    ProductKeyResponse, ReconcileResponse, ResumeResponse, SettleResponse, SubmitConversionBody,
    SubmitConversionResponse, SweepResponse,
};
pub use service::LedgerService;
