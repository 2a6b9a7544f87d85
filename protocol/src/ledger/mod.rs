//! # Ledger Capability
//!
//! Everything the escrow protocol needs from a ledger fits behind one small
//! trait: read an account, submit a signed envelope. Envelope construction,
//! hashing, and signing are pure functions over protocol types, exposed here
//! as provided methods so callers can treat [`LedgerClient`] as the single
//! ledger-facing capability.
//!
//! Failure is a closed enumeration. Callers dispatch on [`RejectReason`]
//! variants and never on error message text; a new rejection kind is a
//! breaking change here, which is the point.

pub mod memory;

use crate::crypto::{CaravanKeypair, CaravanPublicKey};
use crate::envelope::{
    Operation, SignedEnvelope, SignerEntry, ThresholdSet, TimeBounds, TransactionEnvelope, TxHash,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use memory::InMemoryLedger;

// ---------------------------------------------------------------------------
// Account state
// ---------------------------------------------------------------------------

/// A ledger account as seen by a query.
///
/// `sequence` is the last consumed sequence number; the next valid envelope
/// must carry exactly `sequence + 1`. Asset balances are keyed by
/// [`Asset::balance_key`](crate::envelope::Asset::balance_key); presence of a
/// key means an open trust line, even at balance zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub sequence: u64,
    pub native_balance: i64,
    pub asset_balances: BTreeMap<String, i64>,
    pub signers: Vec<SignerEntry>,
    pub thresholds: ThresholdSet,
}

impl AccountRecord {
    /// A freshly created account: sequence 1 (creation consumed the first
    /// slot), no extra signers, master key fully authoritative.
    pub fn fresh(native_balance: i64) -> Self {
        Self {
            sequence: 1,
            native_balance,
            asset_balances: BTreeMap::new(),
            signers: Vec::new(),
            thresholds: ThresholdSet::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the ledger refused to apply a transaction. Closed set; no free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("sequence number does not match the account's next slot")]
    BadSequence,
    #[error("submitted before the envelope's lower time bound")]
    TimelockNotYetValid,
    #[error("submitted after the envelope's upper time bound")]
    TimelockExpired,
    #[error("combined signer weight below the required threshold")]
    ThresholdNotMet,
    #[error("insufficient balance for the operation")]
    InsufficientBalance,
    #[error("no trust line for the asset")]
    MissingTrustline,
    #[error("trust line still holds a balance")]
    TrustlineNotEmpty,
    #[error("destination account does not exist")]
    NoSuchDestination,
    #[error("account already exists")]
    AccountExists,
}

/// Errors at the ledger boundary.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account {account} not found on the ledger")]
    AccountNotFound { account: CaravanPublicKey },

    #[error("transaction rejected: {0}")]
    TransactionRejected(RejectReason),

    #[error("ledger transport failure: {0}")]
    Network(String),
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Returned when a submission is accepted and applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub hash: TxHash,
    /// Ledger clock at application time, Unix seconds.
    pub applied_at: i64,
}

// ---------------------------------------------------------------------------
// The capability trait
// ---------------------------------------------------------------------------

/// The single ledger-facing capability the protocol consumes.
///
/// Calls are blocking request/response; retry and backoff policy belongs to
/// implementations, never to the protocol core.
pub trait LedgerClient {
    /// Look up an account's current state.
    fn get_account(&self, account: &CaravanPublicKey) -> Result<AccountRecord, LedgerError>;

    /// Submit a signed envelope for application.
    fn submit(&self, signed: &SignedEnvelope) -> Result<SubmitReceipt, LedgerError>;

    /// Current ledger time in Unix seconds, used for deadline validation.
    fn now(&self) -> i64;

    // --- provided methods: pure envelope plumbing ---

    fn build_envelope(
        &self,
        source: CaravanPublicKey,
        sequence: u64,
        operations: Vec<Operation>,
        time_bounds: Option<TimeBounds>,
    ) -> TransactionEnvelope {
        let mut envelope = TransactionEnvelope::new(source, sequence, operations);
        if let Some(bounds) = time_bounds {
            envelope = envelope.with_time_bounds(bounds);
        }
        envelope
    }

    fn hash(&self, envelope: &TransactionEnvelope) -> TxHash {
        envelope.hash()
    }

    fn sign(&self, envelope: TransactionEnvelope, keypair: &CaravanKeypair) -> SignedEnvelope {
        SignedEnvelope::unsigned(envelope).sign(keypair)
    }
}
