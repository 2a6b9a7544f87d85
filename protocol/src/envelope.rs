//! # Transaction Envelopes
//!
//! The envelope is the protocol's unit of commitment. An unsigned envelope
//! fully determines a transaction: source account, exact sequence number,
//! ordered operation list, optional validity window, optional memo. Its hash
//! is the double-SHA-256 of a deterministic canonical byte serialization,
//! and that hash doubles as a signer identity: a `PreAuthTx` signer entry on
//! an account authorizes exactly one future envelope, bit for bit.
//!
//! Because hashes are commitments, envelopes are immutable by discipline:
//! once a hash has been embedded in a signer configuration, mutating the
//! envelope silently invalidates the corresponding branch. Nothing in this
//! module mutates an envelope after construction.
//!
//! ## Canonical byte layout
//!
//! Field order is fixed; integers are little-endian; strings and lists are
//! length-prefixed; optional fields carry a one-byte presence flag. The
//! layout is versioned by a leading [`ENVELOPE_VERSION`] tag so a future
//! format change cannot collide with version-1 hashes.

use crate::config::ENVELOPE_VERSION;
use crate::crypto::{double_sha256, CaravanKeypair, CaravanPublicKey, CaravanSignature};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from envelope blob encoding and decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope blob is not valid hex")]
    BadBlobEncoding,

    #[error("envelope blob does not decode to a known envelope shape: {0}")]
    BadBlobContents(String),
}

// ---------------------------------------------------------------------------
// Assets and amounts
// ---------------------------------------------------------------------------

/// An asset moved by a payment or held through a trust line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// The ledger's native currency, used for reserves and fees.
    Native,
    /// An issued token, identified by code and issuing account.
    Token {
        code: String,
        issuer: CaravanPublicKey,
    },
}

impl Asset {
    /// Stable string form used as a balance-map key: `native` or
    /// `CODE:issuer_hex`.
    pub fn balance_key(&self) -> String {
        match self {
            Asset::Native => "native".to_string(),
            Asset::Token { code, issuer } => format!("{}:{}", code, issuer.to_hex()),
        }
    }
}

// ---------------------------------------------------------------------------
// Time bounds
// ---------------------------------------------------------------------------

/// A validity window enforced by the ledger at submission time.
///
/// `min_time` is the earliest instant (inclusive, Unix seconds) at which the
/// transaction may land; `max_time`, when present, is the latest. Refund and
/// merge envelopes carry `min_time = deadline` with no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: i64,
    pub max_time: Option<i64>,
}

impl TimeBounds {
    /// A lower bound with no expiry.
    pub fn from(min_time: i64) -> Self {
        Self {
            min_time,
            max_time: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction hashes
// ---------------------------------------------------------------------------

/// A 32-byte transaction identifier: the double-SHA-256 of an envelope's
/// canonical bytes. Hex in serialized form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(s).map_err(|_| EnvelopeError::BadBlobEncoding)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EnvelopeError::BadBlobEncoding)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.to_hex()[..12])
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Signers and thresholds
// ---------------------------------------------------------------------------

/// The identity half of a signer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignerKey {
    /// An ordinary key signer: weight counts when a valid signature by this
    /// key accompanies the submission.
    Ed25519 { key: CaravanPublicKey },
    /// A pre-authorized transaction signer: weight counts only when the
    /// submitted envelope's hash equals this digest exactly. No signature is
    /// involved; the transaction *is* the credential.
    PreAuthTx { hash: TxHash },
}

/// A weighted signer on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    pub key: SignerKey,
    pub weight: u8,
}

/// Per-account authorization thresholds.
///
/// `master` is the weight of the account's own key. Freshly created accounts
/// get `{master: 1, low: 0, medium: 0, high: 0}`; the ledger treats an
/// effective threshold of 0 as 1, so a brand-new account is controlled by its
/// own key alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub master: u8,
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            master: 1,
            low: 0,
            medium: 0,
            high: 0,
        }
    }
}

impl ThresholdSet {
    /// Required combined signer weight for an operation category, never
    /// below 1.
    pub fn required_weight(&self, category: ThresholdCategory) -> u32 {
        let raw = match category {
            ThresholdCategory::Low => self.low,
            ThresholdCategory::Medium => self.medium,
            ThresholdCategory::High => self.high,
        };
        u32::from(raw).max(1)
    }
}

/// Classification of operation kinds by required signer weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdCategory {
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// A single ledger operation inside an envelope.
///
/// Amounts are integer stroops throughout. The set is deliberately small:
/// these five kinds are everything the escrow protocol needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Create `destination` with an initial native balance paid by the
    /// source account.
    CreateAccount {
        destination: CaravanPublicKey,
        starting_balance: i64,
    },
    /// Move `amount` of `asset` from the source account to `destination`.
    Payment {
        destination: CaravanPublicKey,
        amount: i64,
        asset: Asset,
    },
    /// Open, resize, or remove a trust line. `limit: None` opens with the
    /// default maximum; `limit: Some(0)` removes the line, which the ledger
    /// only allows when the held balance is zero.
    ChangeTrust { asset: Asset, limit: Option<i64> },
    /// Close the source account and transfer its remaining native balance to
    /// `destination`.
    AccountMerge { destination: CaravanPublicKey },
    /// Adjust the source account's signer list, master-key weight, and
    /// thresholds. Upserts the given signer; weight 0 removes it.
    SetOptions {
        signer: Option<SignerEntry>,
        master_weight: Option<u8>,
        low_threshold: Option<u8>,
        medium_threshold: Option<u8>,
        high_threshold: Option<u8>,
    },
}

impl Operation {
    /// The threshold category this operation kind belongs to. Account
    /// structure changes are High; everything that only moves value is
    /// Medium.
    pub fn threshold_category(&self) -> ThresholdCategory {
        match self {
            Operation::CreateAccount { .. }
            | Operation::Payment { .. }
            | Operation::ChangeTrust { .. } => ThresholdCategory::Medium,
            Operation::AccountMerge { .. } | Operation::SetOptions { .. } => {
                ThresholdCategory::High
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// An unsigned transaction: the thing that gets hashed and pre-authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub source: CaravanPublicKey,
    pub sequence: u64,
    pub operations: Vec<Operation>,
    pub time_bounds: Option<TimeBounds>,
    pub memo: Option<String>,
}

impl TransactionEnvelope {
    pub fn new(source: CaravanPublicKey, sequence: u64, operations: Vec<Operation>) -> Self {
        Self {
            source,
            sequence,
            operations,
            time_bounds: None,
            memo: None,
        }
    }

    pub fn with_time_bounds(mut self, bounds: TimeBounds) -> Self {
        self.time_bounds = Some(bounds);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// The strictest threshold category across this envelope's operations.
    pub fn required_category(&self) -> ThresholdCategory {
        self.operations
            .iter()
            .map(Operation::threshold_category)
            .max()
            .unwrap_or(ThresholdCategory::Low)
    }

    /// Deterministic byte serialization. Equal envelopes produce equal
    /// bytes on every platform; this is the preimage of [`hash`](Self::hash).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
        buf.extend_from_slice(self.source.as_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        match &self.time_bounds {
            None => buf.push(0),
            Some(tb) => {
                buf.push(1);
                buf.extend_from_slice(&tb.min_time.to_le_bytes());
                match tb.max_time {
                    None => buf.push(0),
                    Some(max) => {
                        buf.push(1);
                        buf.extend_from_slice(&max.to_le_bytes());
                    }
                }
            }
        }
        match &self.memo {
            None => buf.push(0),
            Some(memo) => {
                buf.push(1);
                write_str(&mut buf, memo);
            }
        }
        buf.extend_from_slice(&(self.operations.len() as u32).to_le_bytes());
        for op in &self.operations {
            write_operation(&mut buf, op);
        }
        buf
    }

    /// The transaction identifier: double-SHA-256 of the canonical bytes.
    /// Computed on demand; envelopes carry no cached hash that could drift.
    pub fn hash(&self) -> TxHash {
        TxHash(double_sha256(&self.canonical_bytes()))
    }

    /// Encode as an opaque blob for API payloads and persisted records:
    /// hex over canonical JSON.
    pub fn encode_blob(&self) -> String {
        // serde_json cannot fail on these types; every field serializes.
        let json = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(json)
    }

    /// Decode a blob produced by [`encode_blob`](Self::encode_blob).
    pub fn decode_blob(blob: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(blob.trim()).map_err(|_| EnvelopeError::BadBlobEncoding)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| EnvelopeError::BadBlobContents(err.to_string()))
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_asset(buf: &mut Vec<u8>, asset: &Asset) {
    match asset {
        Asset::Native => buf.push(0),
        Asset::Token { code, issuer } => {
            buf.push(1);
            write_str(buf, code);
            buf.extend_from_slice(issuer.as_bytes());
        }
    }
}

fn write_operation(buf: &mut Vec<u8>, op: &Operation) {
    match op {
        Operation::CreateAccount {
            destination,
            starting_balance,
        } => {
            buf.push(0);
            buf.extend_from_slice(destination.as_bytes());
            buf.extend_from_slice(&starting_balance.to_le_bytes());
        }
        Operation::Payment {
            destination,
            amount,
            asset,
        } => {
            buf.push(1);
            buf.extend_from_slice(destination.as_bytes());
            buf.extend_from_slice(&amount.to_le_bytes());
            write_asset(buf, asset);
        }
        Operation::ChangeTrust { asset, limit } => {
            buf.push(2);
            write_asset(buf, asset);
            match limit {
                None => buf.push(0),
                Some(l) => {
                    buf.push(1);
                    buf.extend_from_slice(&l.to_le_bytes());
                }
            }
        }
        Operation::AccountMerge { destination } => {
            buf.push(3);
            buf.extend_from_slice(destination.as_bytes());
        }
        Operation::SetOptions {
            signer,
            master_weight,
            low_threshold,
            medium_threshold,
            high_threshold,
        } => {
            buf.push(4);
            match signer {
                None => buf.push(0),
                Some(entry) => {
                    buf.push(1);
                    match entry.key {
                        SignerKey::Ed25519 { key } => {
                            buf.push(0);
                            buf.extend_from_slice(key.as_bytes());
                        }
                        SignerKey::PreAuthTx { hash } => {
                            buf.push(1);
                            buf.extend_from_slice(hash.as_bytes());
                        }
                    }
                    buf.push(entry.weight);
                }
            }
            for field in [master_weight, low_threshold, medium_threshold, high_threshold] {
                match field {
                    None => buf.push(0),
                    Some(v) => {
                        buf.push(1);
                        buf.push(*v);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Signed envelopes
// ---------------------------------------------------------------------------

/// A signature plus the key that produced it, so verifiers need no guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub signer: CaravanPublicKey,
    pub signature: CaravanSignature,
}

/// An envelope carrying zero or more decorated signatures.
///
/// Zero is a legitimate count: a pre-authorized branch envelope needs no
/// signature at all, the matching hash is its whole authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub envelope: TransactionEnvelope,
    pub signatures: Vec<DecoratedSignature>,
}

impl SignedEnvelope {
    /// Wrap an envelope with no signatures attached.
    pub fn unsigned(envelope: TransactionEnvelope) -> Self {
        Self {
            envelope,
            signatures: Vec::new(),
        }
    }

    /// Add a signature by `keypair` over the envelope's canonical bytes.
    pub fn sign(mut self, keypair: &CaravanKeypair) -> Self {
        let signature = keypair.sign(&self.envelope.canonical_bytes());
        self.signatures.push(DecoratedSignature {
            signer: keypair.public_key(),
            signature,
        });
        self
    }

    pub fn encode_blob(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(json)
    }

    pub fn decode_blob(blob: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(blob.trim()).map_err(|_| EnvelopeError::BadBlobEncoding)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| EnvelopeError::BadBlobContents(err.to_string()))
    }
}
