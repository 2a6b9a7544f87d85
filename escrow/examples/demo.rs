//! Walkthrough of one escrowed delivery on the simulated ledger.
//!
//! Run with `cargo run --example demo -p caravan-escrow`.

use caravan_escrow::{EscrowPlanBuilder, PackageEvent, PackageLifecycle};
use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger, LedgerClient, SignedEnvelope};

fn main() {
    let ledger = InMemoryLedger::new();
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

    let deadline = ledger.now() + 3600;
    let plan = EscrowPlanBuilder::new(escrow.public_key())
        .launcher(launcher.public_key())
        .courier(courier.public_key())
        .recipient(recipient.public_key())
        .payment(50_000_000)
        .collateral(100_000_000)
        .deadline(deadline)
        .asset(asset.clone())
        .build(&ledger)
        .unwrap();
    println!("plan built for escrow {}", plan.escrow);
    println!("  refund  hash {}", plan.envelopes.refund.hash());
    println!("  payment hash {}", plan.envelopes.payment.hash());
    println!("  merge   hash {}", plan.envelopes.merge.hash());

    plan.execute_setup(&ledger, &escrow).unwrap();
    ledger
        .credit_token(&escrow.public_key(), &asset, plan.total_stroops())
        .unwrap();
    println!("escrow secured and funded with {} stroops", plan.total_stroops());

    let mut lifecycle = PackageLifecycle::launched(courier.public_key());

    // The recipient confirms delivery by countersigning the payment branch.
    let payment = SignedEnvelope::unsigned(plan.envelopes.payment.clone()).sign(&recipient);
    let receipt = ledger.submit(&payment).unwrap();
    println!("payment landed: {} at t={}", receipt.hash, receipt.applied_at);

    let state = lifecycle.apply(PackageEvent::PaymentConfirmed).unwrap();
    println!("package state: {state:?}");

    let courier_record = ledger.get_account(&courier.public_key()).unwrap();
    println!(
        "courier now holds {} stroops of CRGO",
        courier_record.asset_balances[&asset.balance_key()]
    );
}
