use caravan_escrow::EscrowPlanBuilder;
use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_plan_build(c: &mut Criterion) {
    let ledger = InMemoryLedger::at_time(1_000_000);
    let escrow = CaravanKeypair::generate();
    let launcher = CaravanKeypair::generate();
    let courier = CaravanKeypair::generate();
    let recipient = CaravanKeypair::generate();
    let issuer = CaravanKeypair::generate();
    ledger.create_account(escrow.public_key(), 50_000_000).unwrap();
    let asset = Asset::Token {
        code: "CRGO".to_string(),
        issuer: issuer.public_key(),
    };

    c.bench_function("escrow_plan_build", |b| {
        b.iter(|| {
            EscrowPlanBuilder::new(escrow.public_key())
                .launcher(launcher.public_key())
                .courier(courier.public_key())
                .recipient(recipient.public_key())
                .payment(50_000_000)
                .collateral(100_000_000)
                .deadline(1_000_600)
                .asset(asset.clone())
                .build(&ledger)
                .unwrap()
        })
    });

    let plan = EscrowPlanBuilder::new(escrow.public_key())
        .launcher(launcher.public_key())
        .courier(courier.public_key())
        .recipient(recipient.public_key())
        .payment(50_000_000)
        .collateral(100_000_000)
        .deadline(1_000_600)
        .asset(asset)
        .build(&ledger)
        .unwrap();

    c.bench_function("branch_hashing", |b| {
        b.iter(|| plan.branch_hashes())
    });
}

criterion_group!(benches, bench_plan_build);
criterion_main!(benches);
