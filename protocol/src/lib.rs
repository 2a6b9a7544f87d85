// Copyright (c) 2026 Caravan Contributors. MIT License.
// See LICENSE for details.

//! # Caravan Protocol
//!
//! Ledger primitives for the Caravan delivery network: identity keys,
//! transaction envelopes with deterministic hashing, and the ledger
//! capability trait with an in-memory simulated implementation.
//!
//! This crate knows nothing about escrow. It provides the vocabulary —
//! envelopes, operations, signers, thresholds, timelocks — out of which the
//! `caravan-escrow` crate composes the escrow transaction protocol.
//!
//! ## Layout
//!
//! - [`crypto`] — Ed25519 keys and double-SHA-256 hashing.
//! - [`envelope`] — operations, envelopes, canonical bytes, signatures.
//! - [`ledger`] — the [`LedgerClient`] trait and [`InMemoryLedger`].
//! - [`config`] — protocol constants.

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod ledger;

pub use crypto::{CaravanKeypair, CaravanPublicKey, CaravanSignature, KeyError};
pub use envelope::{
    Asset, DecoratedSignature, EnvelopeError, Operation, SignedEnvelope, SignerEntry, SignerKey,
    ThresholdCategory, ThresholdSet, TimeBounds, TransactionEnvelope, TxHash,
};
pub use ledger::{
    AccountRecord, InMemoryLedger, LedgerClient, LedgerError, RejectReason, SubmitReceipt,
};
