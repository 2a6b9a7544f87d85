//! # Relay Linking
//!
//! A relay chains a second escrow off the courier leg of a parent plan,
//! modeling custody handoff between successive couriers. The relayer (the
//! courier handing off) splits the parent leg's total into their own cut and
//! the relayee's cut; the relayee's cut becomes the payment of a fresh,
//! structurally identical child plan. Arbitrary-depth chains fall out of
//! recursion, since a child plan's courier leg can itself be relayed.

use crate::plan::{EscrowError, EscrowPlan, EscrowPlanBuilder};
use caravan_protocol::{CaravanPublicKey, LedgerClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The relayer/relayee shares do not sum to the amount being relayed.
    #[error(
        "relay split {relayer_stroops} + {relayee_stroops} does not equal the relayed amount {expected}"
    )]
    SplitMismatch {
        relayer_stroops: i64,
        relayee_stroops: i64,
        expected: i64,
    },

    #[error(transparent)]
    Plan(#[from] EscrowError),
}

/// A child escrow plan plus its link back to the parent leg it was carved
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPlan {
    pub plan: EscrowPlan,
    /// The escrow account of the parent plan whose courier leg was split.
    pub parent_escrow: CaravanPublicKey,
    pub relayer_stroops: i64,
    pub relayee_stroops: i64,
}

/// Build a child escrow plan off `parent`'s courier leg.
///
/// The relayer becomes the child's launcher (and refundee), the relayee its
/// courier; the recipient is inherited from the parent. The child's payment
/// is the relayee's share with no collateral: the relayee's stake is the
/// parent leg they will only collect by completing the chain.
#[allow(clippy::too_many_arguments)]
pub fn link_relay(
    ledger: &impl LedgerClient,
    parent: &EscrowPlan,
    relay_escrow: CaravanPublicKey,
    relayer: CaravanPublicKey,
    relayee: CaravanPublicKey,
    relayer_stroops: i64,
    relayee_stroops: i64,
    deadline: i64,
) -> Result<RelayPlan, RelayError> {
    let expected = parent.total_stroops();
    let split_total = relayer_stroops
        .checked_add(relayee_stroops)
        .filter(|sum| *sum == expected);
    if split_total.is_none() || relayer_stroops < 0 || relayee_stroops < 0 {
        return Err(RelayError::SplitMismatch {
            relayer_stroops,
            relayee_stroops,
            expected,
        });
    }

    let plan = EscrowPlanBuilder::new(relay_escrow)
        .launcher(relayer)
        .courier(relayee)
        .recipient(parent.recipient)
        .payment(relayee_stroops)
        .collateral(0)
        .deadline(deadline)
        .asset(parent.asset.clone())
        .build(ledger)?;

    tracing::info!(
        parent = %parent.escrow,
        child = %plan.escrow,
        relayer_stroops,
        relayee_stroops,
        "relay linked"
    );

    Ok(RelayPlan {
        plan,
        parent_escrow: parent.escrow,
        relayer_stroops,
        relayee_stroops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger};

    fn parent_plan(ledger: &InMemoryLedger) -> (EscrowPlan, CaravanKeypair) {
        let escrow = CaravanKeypair::generate();
        let launcher = CaravanKeypair::generate();
        let courier = CaravanKeypair::generate();
        let recipient = CaravanKeypair::generate();
        let issuer = CaravanKeypair::generate();
        ledger.create_account(escrow.public_key(), 50_000_000).unwrap();
        let plan = EscrowPlanBuilder::new(escrow.public_key())
            .launcher(launcher.public_key())
            .courier(courier.public_key())
            .recipient(recipient.public_key())
            .payment(50_000_000)
            .collateral(100_000_000)
            .deadline(1_000_600)
            .asset(Asset::Token {
                code: "CRGO".to_string(),
                issuer: issuer.public_key(),
            })
            .build(ledger)
            .unwrap();
        (plan, courier)
    }

    #[test]
    fn split_must_cover_relayed_amount_exactly() {
        let ledger = InMemoryLedger::at_time(1_000_000);
        let (parent, courier) = parent_plan(&ledger);
        let relay_escrow = CaravanKeypair::generate();
        let relayee = CaravanKeypair::generate();
        ledger
            .create_account(relay_escrow.public_key(), 50_000_000)
            .unwrap();

        for (relayer_cut, relayee_cut) in [
            (40_000_000, 100_000_000),
            (60_000_000, 100_000_000),
            (i64::MAX, 1),
        ] {
            let err = link_relay(
                &ledger,
                &parent,
                relay_escrow.public_key(),
                courier.public_key(),
                relayee.public_key(),
                relayer_cut,
                relayee_cut,
                1_000_500,
            )
            .unwrap_err();
            assert!(matches!(err, RelayError::SplitMismatch { .. }));
        }
    }

    #[test]
    fn child_plan_inherits_recipient_and_asset() {
        let ledger = InMemoryLedger::at_time(1_000_000);
        let (parent, courier) = parent_plan(&ledger);
        let relay_escrow = CaravanKeypair::generate();
        let relayee = CaravanKeypair::generate();
        ledger
            .create_account(relay_escrow.public_key(), 50_000_000)
            .unwrap();

        let relay = link_relay(
            &ledger,
            &parent,
            relay_escrow.public_key(),
            courier.public_key(),
            relayee.public_key(),
            50_000_000,
            100_000_000,
            1_000_500,
        )
        .unwrap();

        assert_eq!(relay.parent_escrow, parent.escrow);
        assert_eq!(relay.plan.recipient, parent.recipient);
        assert_eq!(relay.plan.asset, parent.asset);
        assert_eq!(relay.plan.launcher, courier.public_key());
        assert_eq!(relay.plan.courier, relayee.public_key());
        assert_eq!(relay.plan.payment, 100_000_000);
        assert_eq!(relay.plan.collateral, 0);
    }

    #[test]
    fn chains_recurse_off_the_child_leg() {
        let ledger = InMemoryLedger::at_time(1_000_000);
        let (parent, courier) = parent_plan(&ledger);
        let first_escrow = CaravanKeypair::generate();
        let second_escrow = CaravanKeypair::generate();
        let second_courier = CaravanKeypair::generate();
        let third_courier = CaravanKeypair::generate();
        ledger
            .create_account(first_escrow.public_key(), 50_000_000)
            .unwrap();
        ledger
            .create_account(second_escrow.public_key(), 50_000_000)
            .unwrap();

        let first = link_relay(
            &ledger,
            &parent,
            first_escrow.public_key(),
            courier.public_key(),
            second_courier.public_key(),
            50_000_000,
            100_000_000,
            1_000_500,
        )
        .unwrap();

        let second = link_relay(
            &ledger,
            &first.plan,
            second_escrow.public_key(),
            second_courier.public_key(),
            third_courier.public_key(),
            30_000_000,
            70_000_000,
            1_000_400,
        )
        .unwrap();

        assert_eq!(second.parent_escrow, first.plan.escrow);
        assert_eq!(second.plan.payment, 70_000_000);
        assert_eq!(second.plan.recipient, parent.recipient);
    }
}
