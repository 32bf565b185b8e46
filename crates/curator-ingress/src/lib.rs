//! # curator-ingress
//!
//! **Intake plane**: everything between an inbound conversion event and a
//! committed `(conversion, payout?)` pair.
//!
//! ## Components
//!
//! 1. **BudgetGuard**: serialized check-then-debit on one campaign row
//! 2. **credentials / ref_code**: API key issuance and referral codes
//! 3. **ConversionRequest**: shape validation of inbound events
//! 4. **RateLimiter**: per-client sliding window, keyed `conversion:<ip>`
//! 5. **Partnerships**: invite, accept, click attribution
//! 6. **ConversionIntake**: authenticate, resolve, bind, submit, approve
//!
//! ## Submit flow
//!
//! ```text
//! authenticate(token) → resolve_partnership(ref) → validate_binding
//!     → submit: [lock campaign → dedup → insert → debit? → payout?] commit
//! ```
//!
//! A conversion is approved with a payout, or recorded as
//! `approved_unfunded` with none. There is no third outcome.

pub mod budget_guard;
pub mod credentials;
pub mod intake;
pub mod partnerships;
pub mod rate_limiter;
pub mod ref_code;
pub mod request;

pub use budget_guard::{BudgetGuard, DebitOutcome};
pub use credentials::{IssuedApiKey, hash_client_value, hash_external_user, new_api_key};
pub use intake::{ApproveOutcome, ConversionIntake, SubmitOutcome, require_campaign_owner};
pub use partnerships::{ClickRedirect, Partnerships};
pub use rate_limiter::{MemoryRateLimiter, RateLimiter};
pub use ref_code::generate_ref_code;
pub use request::{ConversionRequest, ValidatedConversion};
