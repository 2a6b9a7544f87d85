//! # Caravan Escrow
//!
//! The escrow transaction protocol: trustless, conditional payment for a
//! physical delivery on a ledger with no programmable contract layer.
//!
//! From a handful of parties, amounts, and a deadline, the crate derives a
//! bundle of mutually exclusive, pre-built transactions plus a weighted
//! signer configuration, such that exactly one of {timed refund,
//! recipient-approved payment, deposit reclamation} can ever execute,
//! depending on who submits what and when. Multi-courier handoff chains a
//! child escrow off a parent leg ([`relay`]).
//!
//! The crate performs no network I/O of its own beyond the
//! [`LedgerClient`](caravan_protocol::LedgerClient) capability it is handed,
//! and no concurrency: within one escrow account, callers must serialize
//! submissions, at most one in-flight sequence at a time.
//!
//! ## Modules
//!
//! - [`sequence`] — the setup ritual and per-envelope sequence derivation.
//! - [`thresholds`] — signer weights and threshold values.
//! - [`plan`] — [`EscrowPlanBuilder`] and the four-envelope [`EscrowPlan`].
//! - [`relay`] — chaining child escrows for courier handoff.
//! - [`lifecycle`] — the custody/settlement state machine.

pub mod lifecycle;
pub mod plan;
pub mod relay;
pub mod sequence;
pub mod thresholds;

pub use lifecycle::{InvalidTransition, PackageEvent, PackageLifecycle, PackageState};
pub use plan::{
    classify_rejection, BranchRejection, EscrowError, EscrowPlan, EscrowPlanBuilder,
    PlanEnvelopes, SetupError,
};
pub use relay::{link_relay, RelayError, RelayPlan};
pub use sequence::{RitualStep, SequencePlan, SETUP_RITUAL};
pub use thresholds::{escrow_thresholds, BranchHashes};
