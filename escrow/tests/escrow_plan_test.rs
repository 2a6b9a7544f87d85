//! End-to-end escrow flows against the simulated ledger: setup ritual,
//! recipient-approved payment, timed refund, deposit reclamation, and relay
//! handoff.

use caravan_escrow::{
    classify_rejection, link_relay, BranchRejection, EscrowPlan, EscrowPlanBuilder,
    PackageEvent, PackageLifecycle, PackageState,
};
use caravan_protocol::{
    Asset, CaravanKeypair, CaravanPublicKey, InMemoryLedger, LedgerClient, LedgerError,
    RejectReason, SignedEnvelope,
};

const PAYMENT: i64 = 50_000_000;
const COLLATERAL: i64 = 100_000_000;
const TOTAL: i64 = PAYMENT + COLLATERAL;
const LAUNCH_TIME: i64 = 1_000_000;
const DEADLINE: i64 = LAUNCH_TIME + 600;

struct Network {
    ledger: InMemoryLedger,
    escrow: CaravanKeypair,
    launcher: CaravanKeypair,
    courier: CaravanKeypair,
    recipient: CaravanKeypair,
    asset: Asset,
}

fn network() -> Network {
    let ledger = InMemoryLedger::at_time(LAUNCH_TIME);
    let escrow = CaravanKeypair::generate();
    let launcher = CaravanKeypair::generate();
    let courier = CaravanKeypair::generate();
    let recipient = CaravanKeypair::generate();
    let issuer = CaravanKeypair::generate();
    let asset = Asset::Token {
        code: "CRGO".to_string(),
        issuer: issuer.public_key(),
    };

    for kp in [&escrow, &launcher, &courier, &recipient, &issuer] {
        ledger.create_account(kp.public_key(), 50_000_000).unwrap();
    }
    for kp in [&launcher, &courier, &recipient] {
        ledger.open_trustline(&kp.public_key(), &asset).unwrap();
    }
    Network {
        ledger,
        escrow,
        launcher,
        courier,
        recipient,
        asset,
    }
}

fn build_plan(net: &Network) -> EscrowPlan {
    EscrowPlanBuilder::new(net.escrow.public_key())
        .launcher(net.launcher.public_key())
        .courier(net.courier.public_key())
        .recipient(net.recipient.public_key())
        .payment(PAYMENT)
        .collateral(COLLATERAL)
        .deadline(DEADLINE)
        .asset(net.asset.clone())
        .build(&net.ledger)
        .unwrap()
}

/// Build, secure, and fund an escrow, the way a launching node would.
fn secured_funded_plan(net: &Network) -> EscrowPlan {
    let plan = build_plan(net);
    plan.execute_setup(&net.ledger, &net.escrow).unwrap();
    net.ledger
        .credit_token(&net.escrow.public_key(), &net.asset, TOTAL)
        .unwrap();
    plan
}

fn token_balance(net: &Network, account: &CaravanPublicKey) -> i64 {
    net.ledger
        .get_account(account)
        .unwrap()
        .asset_balances
        .get(&net.asset.balance_key())
        .copied()
        .unwrap_or(0)
}

#[test]
fn delivery_pays_courier_with_recipient_approval() {
    let net = network();
    let plan = secured_funded_plan(&net);

    let payment = SignedEnvelope::unsigned(plan.envelopes.payment.clone()).sign(&net.recipient);
    net.ledger.submit(&payment).unwrap();

    assert_eq!(token_balance(&net, &net.courier.public_key()), TOTAL);
    assert_eq!(token_balance(&net, &net.escrow.public_key()), 0);

    // The shared sequence slot is spent; the refund can never land now.
    let refund = SignedEnvelope::unsigned(plan.envelopes.refund.clone());
    net.ledger.set_time(DEADLINE + 1);
    let err = net.ledger.submit(&refund).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::BadSequence)
    ));
}

#[test]
fn payment_without_recipient_signature_is_below_threshold() {
    let net = network();
    let plan = secured_funded_plan(&net);

    let unsigned = SignedEnvelope::unsigned(plan.envelopes.payment.clone());
    let err = net.ledger.submit(&unsigned).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::ThresholdNotMet)
    ));

    // Not a broken commitment: the payment hash is configured, it just
    // needs the co-signature.
    let classified = classify_rejection(
        &net.ledger,
        &net.escrow.public_key(),
        &plan.envelopes.payment,
        net.ledger.submit(&unsigned).unwrap_err(),
    );
    assert!(matches!(classified, BranchRejection::Other(_)));
}

#[test]
fn refund_waits_for_the_deadline_then_needs_nobody() {
    let net = network();
    let plan = secured_funded_plan(&net);
    let refund = SignedEnvelope::unsigned(plan.envelopes.refund.clone());

    net.ledger.set_time(LAUNCH_TIME + 1);
    let err = net.ledger.submit(&refund).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::TimelockNotYetValid)
    ));

    net.ledger.set_time(DEADLINE + 1);
    net.ledger.submit(&refund).unwrap();
    assert_eq!(token_balance(&net, &net.launcher.public_key()), TOTAL);
}

#[test]
fn refund_exactly_at_deadline_is_valid() {
    let net = network();
    let plan = secured_funded_plan(&net);
    net.ledger.set_time(DEADLINE);
    net.ledger
        .submit(&SignedEnvelope::unsigned(plan.envelopes.refund.clone()))
        .unwrap();
}

#[test]
fn merge_reclaims_the_deposit_of_an_unfunded_escrow() {
    let net = network();
    let plan = build_plan(&net);
    plan.execute_setup(&net.ledger, &net.escrow).unwrap();
    // Never funded with tokens: the launch fell through.

    let launcher_native_before = net
        .ledger
        .get_account(&net.launcher.public_key())
        .unwrap()
        .native_balance;

    net.ledger.set_time(DEADLINE + 1);
    net.ledger
        .submit(&SignedEnvelope::unsigned(plan.envelopes.merge.clone()))
        .unwrap();

    assert!(!net.ledger.account_exists(&net.escrow.public_key()));
    let launcher_native_after = net
        .ledger
        .get_account(&net.launcher.public_key())
        .unwrap()
        .native_balance;
    assert_eq!(launcher_native_after, launcher_native_before + 50_000_000);
}

#[test]
fn merge_cannot_reclaim_a_funded_escrow() {
    let net = network();
    let plan = secured_funded_plan(&net);
    net.ledger.set_time(DEADLINE + 1);
    let err = net
        .ledger
        .submit(&SignedEnvelope::unsigned(plan.envelopes.merge.clone()))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::TrustlineNotEmpty)
    ));
}

#[test]
fn escrow_key_is_powerless_after_setup() {
    let net = network();
    let plan = secured_funded_plan(&net);

    // Whoever held the escrow seed tries to walk off with the funds.
    let theft = caravan_protocol::TransactionEnvelope::new(
        net.escrow.public_key(),
        plan.envelopes.refund.sequence,
        vec![caravan_protocol::Operation::Payment {
            destination: net.courier.public_key(),
            amount: TOTAL,
            asset: net.asset.clone(),
        }],
    );
    let err = net
        .ledger
        .submit(&SignedEnvelope::unsigned(theft).sign(&net.escrow))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::ThresholdNotMet)
    ));
}

#[test]
fn concrete_scenario_amounts_and_bounds() {
    let net = network();
    let plan = build_plan(&net);

    let refund = &plan.envelopes.refund;
    assert_eq!(refund.time_bounds.unwrap().min_time, DEADLINE);
    assert_eq!(refund.time_bounds.unwrap().max_time, None);
    match &refund.operations[..] {
        [caravan_protocol::Operation::Payment {
            destination,
            amount,
            ..
        }] => {
            assert_eq!(*destination, net.launcher.public_key());
            assert_eq!(*amount, 150_000_000);
        }
        other => panic!("unexpected refund shape: {other:?}"),
    }

    let payment = &plan.envelopes.payment;
    assert!(payment.time_bounds.is_none());
    match &payment.operations[..] {
        [caravan_protocol::Operation::Payment {
            destination,
            amount,
            ..
        }] => {
            assert_eq!(*destination, net.courier.public_key());
            assert_eq!(*amount, 150_000_000);
        }
        other => panic!("unexpected payment shape: {other:?}"),
    }
}

#[test]
fn envelope_blobs_survive_persistence() {
    let net = network();
    let plan = build_plan(&net);
    for envelope in [
        &plan.envelopes.refund,
        &plan.envelopes.payment,
        &plan.envelopes.merge,
        &plan.envelopes.set_options,
    ] {
        let decoded =
            caravan_protocol::TransactionEnvelope::decode_blob(&envelope.encode_blob()).unwrap();
        assert_eq!(decoded.hash(), envelope.hash());
    }
}

#[test]
fn relayed_delivery_settles_both_legs() {
    let net = network();
    let parent = secured_funded_plan(&net);

    // The first courier hands off to a relay courier.
    let relay_escrow = CaravanKeypair::generate();
    let relayee = CaravanKeypair::generate();
    net.ledger
        .create_account(relay_escrow.public_key(), 50_000_000)
        .unwrap();
    net.ledger
        .create_account(relayee.public_key(), 10_000_000)
        .unwrap();
    net.ledger
        .open_trustline(&relayee.public_key(), &net.asset)
        .unwrap();

    let relay = link_relay(
        &net.ledger,
        &parent,
        relay_escrow.public_key(),
        net.courier.public_key(),
        relayee.public_key(),
        60_000_000,
        90_000_000,
        DEADLINE - 100,
    )
    .unwrap();
    relay
        .plan
        .execute_setup(&net.ledger, &relay_escrow)
        .unwrap();
    net.ledger
        .credit_token(&relay_escrow.public_key(), &net.asset, 90_000_000)
        .unwrap();

    let mut lifecycle = PackageLifecycle::launched(net.courier.public_key());
    lifecycle
        .apply(PackageEvent::HandedOff {
            custodian: relayee.public_key(),
        })
        .unwrap();
    assert_eq!(lifecycle.state(), PackageState::Relayed);

    // Delivery: the recipient countersigns both payment legs.
    net.ledger
        .submit(
            &SignedEnvelope::unsigned(relay.plan.envelopes.payment.clone()).sign(&net.recipient),
        )
        .unwrap();
    net.ledger
        .submit(&SignedEnvelope::unsigned(parent.envelopes.payment.clone()).sign(&net.recipient))
        .unwrap();

    assert_eq!(token_balance(&net, &relayee.public_key()), 90_000_000);
    assert_eq!(token_balance(&net, &net.courier.public_key()), TOTAL);
    assert_eq!(
        lifecycle.apply(PackageEvent::PaymentConfirmed).unwrap(),
        PackageState::Delivered
    );
}
