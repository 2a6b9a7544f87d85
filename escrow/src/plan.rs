//! # Escrow Plan Construction
//!
//! An [`EscrowPlan`] is the whole trick: four pre-built envelopes for one
//! single-use escrow account, arranged so that exactly one of
//! {timed refund, recipient-approved payment, deposit reclamation} can ever
//! land. Construction touches the ledger only to read the escrow account's
//! baseline sequence; nothing is submitted.
//!
//! The refund and payment branches both move `payment + collateral` in full.
//! The collateral is the courier's skin in the game: deliver on time and the
//! payment branch returns it on top of the fee; miss the deadline and the
//! refund branch hands all of it to the launcher.
//!
//! Plans freeze at the moment the signer-configuration envelope is built
//! from the three branch hashes. There is no cancellation and no repair:
//! abandoning a package means waiting out the deadline and submitting the
//! refund leg, and a mis-built plan can only be replaced wholesale.

use crate::sequence::SequencePlan;
use crate::thresholds::{self, BranchHashes};
use caravan_protocol::{
    Asset, CaravanKeypair, CaravanPublicKey, LedgerClient, LedgerError, Operation, RejectReason,
    SignedEnvelope, SignerKey, TimeBounds, TransactionEnvelope,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation and query failures during plan construction. Nothing is built
/// or sent when any of these fire.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("invalid amounts: payment {payment} must be positive, collateral {collateral} non-negative")]
    InvalidAmount { payment: i64, collateral: i64 },

    #[error("payment plus collateral overflows the stroop range")]
    AmountOverflow,

    #[error("deadline {deadline} is not in the future (ledger time {now})")]
    PastDeadline { deadline: i64, now: i64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("escrow account query failed")]
    AccountQuery(#[source] LedgerError),
}

/// Failures while executing the setup ritual against the ledger.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("trust-establishment transaction rejected")]
    TrustRejected(#[source] LedgerError),

    /// The signer-configuration submission was rejected. Safety-relevant and
    /// reported distinctly: the escrow account's own key is still fully
    /// authoritative, so funds placed there are NOT protected by the plan.
    #[error("escrow account is not secured: signer configuration rejected")]
    NotSecured(#[source] LedgerError),
}

// ---------------------------------------------------------------------------
// The plan
// ---------------------------------------------------------------------------

/// The four pre-built envelopes of a plan, all sourced from the escrow
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEnvelopes {
    /// Escrow pays `payment + collateral` back to the launcher; valid only
    /// at or after the deadline, forever.
    pub refund: TransactionEnvelope,
    /// Escrow pays `payment + collateral` to the courier; no time bounds,
    /// requires the recipient's co-signature.
    pub payment: TransactionEnvelope,
    /// Escrow drops its trust line and merges its native balance back to
    /// the launcher; viable only while the escrow was never funded.
    pub merge: TransactionEnvelope,
    /// Installs the preauth signers and thresholds, then freezes the escrow
    /// key. Last prerequisite before any branch becomes authorizable.
    pub set_options: TransactionEnvelope,
}

/// A fully constructed escrow plan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPlan {
    pub escrow: CaravanPublicKey,
    pub launcher: CaravanPublicKey,
    pub courier: CaravanPublicKey,
    pub recipient: CaravanPublicKey,
    pub payment: i64,
    pub collateral: i64,
    pub deadline: i64,
    pub asset: Asset,
    pub baseline: u64,
    pub envelopes: PlanEnvelopes,
}

impl EscrowPlan {
    /// The hashes committed into the signer configuration.
    pub fn branch_hashes(&self) -> BranchHashes {
        BranchHashes {
            refund: self.envelopes.refund.hash(),
            payment: self.envelopes.payment.hash(),
            merge: self.envelopes.merge.hash(),
        }
    }

    /// Total stroops moved by either the refund or the payment branch.
    pub fn total_stroops(&self) -> i64 {
        // Construction already proved this sum fits.
        self.payment.saturating_add(self.collateral)
    }

    /// The trust-establishment envelope of the setup ritual, derived from
    /// the same sequence plan the branch envelopes were built with.
    pub fn trust_envelope(&self) -> TransactionEnvelope {
        let sequences = SequencePlan::from_baseline(self.baseline);
        TransactionEnvelope::new(
            self.escrow,
            sequences.trust_sequence(),
            vec![Operation::ChangeTrust {
                asset: self.asset.clone(),
                limit: None,
            }],
        )
    }

    /// Run the on-ledger half of the setup ritual: establish trust, then
    /// install the signer configuration, in order, signed by the escrow's
    /// own key (the last acts that key ever performs).
    ///
    /// A [`SetupError::NotSecured`] return means the escrow account is still
    /// controlled by whoever holds its seed. Callers must surface this
    /// condition distinctly and must not fund the account.
    pub fn execute_setup(
        &self,
        ledger: &impl LedgerClient,
        escrow_keypair: &CaravanKeypair,
    ) -> Result<(), SetupError> {
        let trust = SignedEnvelope::unsigned(self.trust_envelope()).sign(escrow_keypair);
        ledger.submit(&trust).map_err(SetupError::TrustRejected)?;
        tracing::debug!(escrow = %self.escrow, "trust line established");

        let configure =
            SignedEnvelope::unsigned(self.envelopes.set_options.clone()).sign(escrow_keypair);
        ledger.submit(&configure).map_err(SetupError::NotSecured)?;
        tracing::info!(escrow = %self.escrow, "escrow account secured");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds an [`EscrowPlan`] for a freshly generated escrow account.
///
/// ```no_run
/// # use caravan_escrow::EscrowPlanBuilder;
/// # use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger};
/// # let ledger = InMemoryLedger::new();
/// # let (escrow, launcher, courier, recipient) = (
/// #     CaravanKeypair::generate(), CaravanKeypair::generate(),
/// #     CaravanKeypair::generate(), CaravanKeypair::generate());
/// # let token = Asset::Token { code: "CRGO".into(), issuer: launcher.public_key() };
/// let plan = EscrowPlanBuilder::new(escrow.public_key())
///     .launcher(launcher.public_key())
///     .courier(courier.public_key())
///     .recipient(recipient.public_key())
///     .payment(50_000_000)
///     .collateral(100_000_000)
///     .deadline(1_900_000_000)
///     .asset(token)
///     .build(&ledger)?;
/// # Ok::<(), caravan_escrow::EscrowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct EscrowPlanBuilder {
    escrow: CaravanPublicKey,
    launcher: Option<CaravanPublicKey>,
    courier: Option<CaravanPublicKey>,
    recipient: Option<CaravanPublicKey>,
    payment: i64,
    collateral: i64,
    deadline: Option<i64>,
    asset: Option<Asset>,
}

impl EscrowPlanBuilder {
    pub fn new(escrow: CaravanPublicKey) -> Self {
        Self {
            escrow,
            launcher: None,
            courier: None,
            recipient: None,
            payment: 0,
            collateral: 0,
            deadline: None,
            asset: None,
        }
    }

    pub fn launcher(mut self, launcher: CaravanPublicKey) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// The current custodian, paid on delivery.
    pub fn courier(mut self, courier: CaravanPublicKey) -> Self {
        self.courier = Some(courier);
        self
    }

    pub fn recipient(mut self, recipient: CaravanPublicKey) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Courier's fee in stroops. Must be positive.
    pub fn payment(mut self, stroops: i64) -> Self {
        self.payment = stroops;
        self
    }

    /// Courier's collateral in stroops. Zero is allowed.
    pub fn collateral(mut self, stroops: i64) -> Self {
        self.collateral = stroops;
        self
    }

    /// Delivery deadline, Unix seconds. Must be strictly in the future.
    pub fn deadline(mut self, unix_seconds: i64) -> Self {
        self.deadline = Some(unix_seconds);
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Validate, read the escrow baseline sequence, and build the four
    /// envelopes. Nothing is submitted.
    pub fn build(self, ledger: &impl LedgerClient) -> Result<EscrowPlan, EscrowError> {
        if self.payment <= 0 || self.collateral < 0 {
            return Err(EscrowError::InvalidAmount {
                payment: self.payment,
                collateral: self.collateral,
            });
        }
        let total = self
            .payment
            .checked_add(self.collateral)
            .ok_or(EscrowError::AmountOverflow)?;

        let launcher = self.launcher.ok_or(EscrowError::MissingField("launcher"))?;
        let courier = self.courier.ok_or(EscrowError::MissingField("courier"))?;
        let recipient = self
            .recipient
            .ok_or(EscrowError::MissingField("recipient"))?;
        let deadline = self.deadline.ok_or(EscrowError::MissingField("deadline"))?;
        let asset = self.asset.ok_or(EscrowError::MissingField("asset"))?;

        let now = ledger.now();
        if deadline <= now {
            return Err(EscrowError::PastDeadline { deadline, now });
        }

        let baseline = ledger
            .get_account(&self.escrow)
            .map_err(EscrowError::AccountQuery)?
            .sequence;
        let sequences = SequencePlan::from_baseline(baseline);

        // The three branches share one sequence slot; at most one lands.
        let refund = TransactionEnvelope::new(
            self.escrow,
            sequences.branch_sequence(),
            vec![Operation::Payment {
                destination: launcher,
                amount: total,
                asset: asset.clone(),
            }],
        )
        .with_time_bounds(TimeBounds::from(deadline))
        .with_memo("refund");

        let payment = TransactionEnvelope::new(
            self.escrow,
            sequences.branch_sequence(),
            vec![Operation::Payment {
                destination: courier,
                amount: total,
                asset: asset.clone(),
            }],
        )
        .with_memo("payment");

        let merge = TransactionEnvelope::new(
            self.escrow,
            sequences.branch_sequence(),
            vec![
                Operation::ChangeTrust {
                    asset: asset.clone(),
                    limit: Some(0),
                },
                Operation::AccountMerge {
                    destination: launcher,
                },
            ],
        )
        .with_time_bounds(TimeBounds::from(deadline))
        .with_memo("reclaim");

        // Built last, from the frozen branch hashes. From here the plan is
        // immutable.
        let hashes = BranchHashes {
            refund: refund.hash(),
            payment: payment.hash(),
            merge: merge.hash(),
        };
        let set_options = TransactionEnvelope::new(
            self.escrow,
            sequences.configure_sequence(),
            thresholds::signer_configuration(&hashes, recipient),
        );

        tracing::info!(
            escrow = %self.escrow,
            payment = self.payment,
            collateral = self.collateral,
            deadline,
            baseline,
            "escrow plan built"
        );

        Ok(EscrowPlan {
            escrow: self.escrow,
            launcher,
            courier,
            recipient,
            payment: self.payment,
            collateral: self.collateral,
            deadline,
            asset,
            baseline,
            envelopes: PlanEnvelopes {
                refund,
                payment,
                merge,
                set_options,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Branch-rejection classification
// ---------------------------------------------------------------------------

/// Why a branch submission bounced, classified for callers.
#[derive(Debug, Error)]
pub enum BranchRejection {
    /// The submitted envelope's hash matches none of the escrow account's
    /// configured preauth signers: the plan and the submission disagree on a
    /// sequence offset or amount. Never retried; the only repair is
    /// rebuilding the entire plan.
    #[error("submitted transaction matches no configured commitment")]
    CommitmentMismatch,

    #[error("branch not yet valid: deadline has not passed")]
    TimelockNotYetValid,

    #[error("branch validity window has closed")]
    TimelockExpired,

    #[error("branch submission failed")]
    Other(#[source] LedgerError),
}

/// Classify a branch-submission failure against the escrow account's actual
/// signer state. Dispatches on the ledger's closed reject enumeration only.
pub fn classify_rejection(
    ledger: &impl LedgerClient,
    escrow: &CaravanPublicKey,
    submitted: &TransactionEnvelope,
    error: LedgerError,
) -> BranchRejection {
    match error {
        LedgerError::TransactionRejected(RejectReason::TimelockNotYetValid) => {
            BranchRejection::TimelockNotYetValid
        }
        LedgerError::TransactionRejected(RejectReason::TimelockExpired) => {
            BranchRejection::TimelockExpired
        }
        LedgerError::TransactionRejected(RejectReason::ThresholdNotMet) => {
            // Distinguish "wrong transaction" from "right transaction,
            // missing co-signature": if the account carries preauth signers
            // and none matches the submitted hash, the commitment itself is
            // broken.
            let submitted_hash = submitted.hash();
            match ledger.get_account(escrow) {
                Ok(record) => {
                    let preauths: Vec<_> = record
                        .signers
                        .iter()
                        .filter_map(|entry| match entry.key {
                            SignerKey::PreAuthTx { hash } => Some(hash),
                            SignerKey::Ed25519 { .. } => None,
                        })
                        .collect();
                    if !preauths.is_empty() && !preauths.contains(&submitted_hash) {
                        tracing::warn!(
                            escrow = %escrow,
                            tx = %submitted_hash,
                            "submission matches no configured commitment"
                        );
                        BranchRejection::CommitmentMismatch
                    } else {
                        BranchRejection::Other(LedgerError::TransactionRejected(
                            RejectReason::ThresholdNotMet,
                        ))
                    }
                }
                Err(query_err) => BranchRejection::Other(query_err),
            }
        }
        other => BranchRejection::Other(other),
    }
}
