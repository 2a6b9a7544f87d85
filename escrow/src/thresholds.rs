//! # Threshold Configuration
//!
//! The signer weights and threshold values that turn a plain ledger account
//! into an escrow vault. The scheme encodes the protocol's authorization
//! rules arithmetically:
//!
//! - payment operations sit in the Medium category (threshold 2), so the
//!   payment preauth signer (weight 1) is insufficient alone and must pair
//!   with the recipient's signature (weight 1) — payment requires the
//!   recipient's explicit approval;
//! - the refund preauth signer (weight 2) meets Medium by itself — once the
//!   deadline passes, the refund is available to whoever submits that exact
//!   pre-built transaction, no signature needed;
//! - the merge envelope contains an `AccountMerge`, a High-category
//!   operation, so its preauth signer carries weight 3 and authorizes
//!   itself;
//! - the escrow account's own key drops to weight 0, irreversibly: nobody
//!   who ever held the escrow seed can move funds afterward.

use caravan_protocol::{Operation, SignerEntry, SignerKey, ThresholdSet};
use caravan_protocol::{CaravanPublicKey, TxHash};
use serde::{Deserialize, Serialize};

pub const REFUND_SIGNER_WEIGHT: u8 = 2;
pub const PAYMENT_SIGNER_WEIGHT: u8 = 1;
pub const MERGE_SIGNER_WEIGHT: u8 = 3;
pub const RECIPIENT_SIGNER_WEIGHT: u8 = 1;

pub const LOW_THRESHOLD: u8 = 1;
pub const MEDIUM_THRESHOLD: u8 = 2;
pub const HIGH_THRESHOLD: u8 = 3;

/// The frozen hashes of the three branch envelopes. Inputs to the signer
/// configuration; once these are embedded, the plan is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHashes {
    pub refund: TxHash,
    pub payment: TxHash,
    pub merge: TxHash,
}

/// The threshold set installed on a configured escrow account.
pub fn escrow_thresholds() -> ThresholdSet {
    ThresholdSet {
        master: 0,
        low: LOW_THRESHOLD,
        medium: MEDIUM_THRESHOLD,
        high: HIGH_THRESHOLD,
    }
}

fn preauth_signer(hash: TxHash, weight: u8) -> Operation {
    Operation::SetOptions {
        signer: Some(SignerEntry {
            key: SignerKey::PreAuthTx { hash },
            weight,
        }),
        master_weight: None,
        low_threshold: None,
        medium_threshold: None,
        high_threshold: None,
    }
}

/// The ordered operation list of the signer-configuration envelope: three
/// preauth signers, the recipient's key, then the master-weight drop and
/// thresholds in one final operation.
///
/// The master drop comes last so a partially applied configuration can never
/// strand the account with no authoritative key. (The simulated ledger
/// applies envelopes atomically anyway; a real one may not.)
pub fn signer_configuration(
    hashes: &BranchHashes,
    recipient: CaravanPublicKey,
) -> Vec<Operation> {
    vec![
        preauth_signer(hashes.refund, REFUND_SIGNER_WEIGHT),
        preauth_signer(hashes.payment, PAYMENT_SIGNER_WEIGHT),
        preauth_signer(hashes.merge, MERGE_SIGNER_WEIGHT),
        Operation::SetOptions {
            signer: Some(SignerEntry {
                key: SignerKey::Ed25519 { key: recipient },
                weight: RECIPIENT_SIGNER_WEIGHT,
            }),
            master_weight: None,
            low_threshold: None,
            medium_threshold: None,
            high_threshold: None,
        },
        Operation::SetOptions {
            signer: None,
            master_weight: Some(0),
            low_threshold: Some(LOW_THRESHOLD),
            medium_threshold: Some(MEDIUM_THRESHOLD),
            high_threshold: Some(HIGH_THRESHOLD),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravan_protocol::{CaravanKeypair, ThresholdCategory};

    fn sample_hashes() -> BranchHashes {
        BranchHashes {
            refund: TxHash([1u8; 32]),
            payment: TxHash([2u8; 32]),
            merge: TxHash([3u8; 32]),
        }
    }

    #[test]
    fn refund_alone_meets_medium() {
        let thresholds = escrow_thresholds();
        let required = thresholds.required_weight(ThresholdCategory::Medium);
        assert!(u32::from(REFUND_SIGNER_WEIGHT) >= required);
    }

    #[test]
    fn payment_needs_the_recipient() {
        let thresholds = escrow_thresholds();
        let required = thresholds.required_weight(ThresholdCategory::Medium);
        assert!(u32::from(PAYMENT_SIGNER_WEIGHT) < required);
        assert!(u32::from(PAYMENT_SIGNER_WEIGHT + RECIPIENT_SIGNER_WEIGHT) >= required);
    }

    #[test]
    fn merge_authorizes_itself_at_high() {
        let thresholds = escrow_thresholds();
        let required = thresholds.required_weight(ThresholdCategory::High);
        assert!(u32::from(MERGE_SIGNER_WEIGHT) >= required);
    }

    #[test]
    fn configuration_carries_all_four_signers_then_locks() {
        let recipient = CaravanKeypair::generate().public_key();
        let ops = signer_configuration(&sample_hashes(), recipient);
        assert_eq!(ops.len(), 5);

        let signer_count = ops
            .iter()
            .filter(|op| matches!(op, Operation::SetOptions { signer: Some(_), .. }))
            .count();
        assert_eq!(signer_count, 4);

        // The lock is the final operation.
        assert!(matches!(
            ops.last(),
            Some(Operation::SetOptions {
                master_weight: Some(0),
                ..
            })
        ));
    }
}
