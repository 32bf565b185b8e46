//! # curator-store
//!
//! The ledger's single source of truth and unit of atomicity.
//!
//! ## Guarantees
//!
//! - **Row locks**: every campaign row sits behind its own async mutex.
//!   [`LedgerStore::begin`] acquires it and holds it for the life of the
//!   [`CampaignTxn`]. Waiters block (no spinning) up to the configured lock
//!   timeout.
//! - **Staged writes**: a transaction mutates a working copy. Nothing is
//!   visible until [`CampaignTxn::commit`], which applies everything in one
//!   non-suspending step. Dropping a transaction (caller cancelled, error
//!   path) discards all staged writes.
//! - **Uniqueness constraints**: enforced on insert *and* re-checked at
//!   commit, surfacing [`LedgerError::UniqueViolation`] as a distinguishable
//!   conflict signal.
//!
//! ## Lock order
//!
//! ```text
//! campaign row (async, long)  →  tables (sync, short)
//! ```
//!
//! The tables mutex is never held across an `.await`.
//!
//! [`LedgerError::UniqueViolation`]: curator_types::LedgerError::UniqueViolation

pub mod retry;
pub mod store;
pub mod txn;

pub use retry::with_bounded_retry;
pub use store::{LedgerStore, PaidTransition, constraints};
pub use txn::CampaignTxn;
