//! # Sequence Planning
//!
//! Every envelope in an escrow plan carries an exact sequence number, and
//! those numbers are commitments: they feed the envelope hashes embedded in
//! the signer configuration. If plan construction and eventual submission
//! disagree about an offset, the configured hash never matches anything
//! submittable and that branch is silently dead.
//!
//! The protocol therefore assumes one fixed setup ritual, executed in order,
//! each step consuming a declared number of sequence slots. The ritual is
//! data, not magic constants: offsets are derived by walking the step list.

use serde::{Deserialize, Serialize};

/// A named step of the setup ritual and the sequence slots it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RitualStep {
    pub name: &'static str,
    pub slots: u64,
}

/// The fixed prerequisite ritual for every escrow account, in execution
/// order. The caller guarantees these run in order, each consuming its
/// declared slots, before any branch envelope is submitted.
pub const SETUP_RITUAL: [RitualStep; 3] = [
    // The account-creating transaction itself. Accounts report sequence 1
    // immediately after creation, so a baseline read post-creation already
    // reflects this slot.
    RitualStep {
        name: "create_account",
        slots: 1,
    },
    RitualStep {
        name: "establish_trust",
        slots: 1,
    },
    RitualStep {
        name: "configure_signers",
        slots: 1,
    },
];

/// Sequence numbers for one escrow account, anchored at the baseline read
/// right after account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePlan {
    baseline: u64,
}

impl SequencePlan {
    /// Anchor a plan at `baseline`, the escrow account's sequence number as
    /// reported after creation and before any further transactions.
    pub fn from_baseline(baseline: u64) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// The sequence number the pre-ritual account sat at, before the anchor
    /// step consumed its declared slots.
    fn origin(&self) -> u64 {
        self.baseline - SETUP_RITUAL[0].slots
    }

    /// The sequence number the named ritual step lands at, derived by
    /// accumulating every step's declared slot count from the pre-ritual
    /// origin. `None` for a name not in the ritual.
    pub fn step_sequence(&self, name: &str) -> Option<u64> {
        let mut consumed = 0u64;
        for step in &SETUP_RITUAL {
            consumed += step.slots;
            if step.name == name {
                return Some(self.origin() + consumed);
            }
        }
        None
    }

    /// Sequence for the trust-establishment transaction.
    pub fn trust_sequence(&self) -> u64 {
        // The ritual is a compile-time constant containing this step.
        self.step_sequence("establish_trust").unwrap_or(self.baseline + 1)
    }

    /// Sequence for the signer-configuration transaction.
    pub fn configure_sequence(&self) -> u64 {
        self.step_sequence("configure_signers")
            .unwrap_or(self.baseline + 2)
    }

    /// The single sequence slot shared by all branch envelopes. Sharing one
    /// slot is what makes refund, payment, and merge mutually exclusive: at
    /// most one of them can ever land.
    pub fn branch_sequence(&self) -> u64 {
        let ritual_total: u64 = SETUP_RITUAL.iter().map(|step| step.slots).sum();
        self.origin() + ritual_total + 1
    }
}
