//! End-to-end exercises of the ledger primitives: envelope hashing as a
//! commitment, weighted-signer authorization, and sequence bookkeeping
//! across multi-transaction histories.

use caravan_protocol::{
    Asset, CaravanKeypair, InMemoryLedger, LedgerClient, LedgerError, Operation, RejectReason,
    SignedEnvelope, SignerEntry, SignerKey, TransactionEnvelope,
};

#[test]
fn sequence_chain_across_many_transactions() {
    let ledger = InMemoryLedger::at_time(5_000);
    let alice = CaravanKeypair::generate();
    let bob = CaravanKeypair::generate();
    ledger.create_account(alice.public_key(), 10_000).unwrap();
    ledger.create_account(bob.public_key(), 0).unwrap();

    for i in 0..5u64 {
        let envelope = TransactionEnvelope::new(
            alice.public_key(),
            2 + i,
            vec![Operation::Payment {
                destination: bob.public_key(),
                amount: 100,
                asset: Asset::Native,
            }],
        );
        ledger
            .submit(&SignedEnvelope::unsigned(envelope).sign(&alice))
            .unwrap();
    }

    let alice_record = ledger.get_account(&alice.public_key()).unwrap();
    assert_eq!(alice_record.sequence, 6);
    assert_eq!(alice_record.native_balance, 9_500);
    assert_eq!(ledger.get_account(&bob.public_key()).unwrap().native_balance, 500);

    // Replaying a consumed slot fails.
    let replay = TransactionEnvelope::new(
        alice.public_key(),
        3,
        vec![Operation::Payment {
            destination: bob.public_key(),
            amount: 100,
            asset: Asset::Native,
        }],
    );
    let err = ledger
        .submit(&SignedEnvelope::unsigned(replay).sign(&alice))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::BadSequence)
    ));
}

#[test]
fn multisig_weights_accumulate_across_cosigners() {
    let ledger = InMemoryLedger::at_time(5_000);
    let shared = CaravanKeypair::generate();
    let partner_a = CaravanKeypair::generate();
    let partner_b = CaravanKeypair::generate();
    let sink = CaravanKeypair::generate();
    ledger.create_account(shared.public_key(), 10_000).unwrap();
    ledger.create_account(sink.public_key(), 0).unwrap();

    // Two weight-1 partners, payments require both (medium = 2), and the
    // shared account's own key is locked out.
    let configure = TransactionEnvelope::new(
        shared.public_key(),
        2,
        vec![
            Operation::SetOptions {
                signer: Some(SignerEntry {
                    key: SignerKey::Ed25519 {
                        key: partner_a.public_key(),
                    },
                    weight: 1,
                }),
                master_weight: None,
                low_threshold: None,
                medium_threshold: None,
                high_threshold: None,
            },
            Operation::SetOptions {
                signer: Some(SignerEntry {
                    key: SignerKey::Ed25519 {
                        key: partner_b.public_key(),
                    },
                    weight: 1,
                }),
                master_weight: Some(0),
                low_threshold: Some(1),
                medium_threshold: Some(2),
                high_threshold: Some(2),
            },
        ],
    );
    ledger
        .submit(&SignedEnvelope::unsigned(configure).sign(&shared))
        .unwrap();

    let spend = TransactionEnvelope::new(
        shared.public_key(),
        3,
        vec![Operation::Payment {
            destination: sink.public_key(),
            amount: 1_000,
            asset: Asset::Native,
        }],
    );

    let half_signed = SignedEnvelope::unsigned(spend.clone()).sign(&partner_a);
    let err = ledger.submit(&half_signed).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TransactionRejected(RejectReason::ThresholdNotMet)
    ));

    let fully_signed = half_signed.sign(&partner_b);
    ledger.submit(&fully_signed).unwrap();
    assert_eq!(ledger.get_account(&sink.public_key()).unwrap().native_balance, 1_000);
}

#[test]
fn account_record_serde_roundtrip() {
    let ledger = InMemoryLedger::at_time(5_000);
    let issuer = CaravanKeypair::generate();
    let holder = CaravanKeypair::generate();
    let asset = Asset::Token {
        code: "CRGO".to_string(),
        issuer: issuer.public_key(),
    };
    ledger.create_account(holder.public_key(), 777).unwrap();
    ledger.credit_token(&holder.public_key(), &asset, 42).unwrap();

    let record = ledger.get_account(&holder.public_key()).unwrap();
    let json = serde_json::to_string(&record).unwrap();
    let back: caravan_protocol::AccountRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, back);
    assert_eq!(back.asset_balances[&asset.balance_key()], 42);
}

#[test]
fn signed_blob_submission_is_transport_stable() {
    let ledger = InMemoryLedger::at_time(5_000);
    let alice = CaravanKeypair::generate();
    let bob = CaravanKeypair::generate();
    ledger.create_account(alice.public_key(), 10_000).unwrap();
    ledger.create_account(bob.public_key(), 0).unwrap();

    let envelope = TransactionEnvelope::new(
        alice.public_key(),
        2,
        vec![Operation::Payment {
            destination: bob.public_key(),
            amount: 9,
            asset: Asset::Native,
        }],
    )
    .with_memo("blob trip");
    let signed = SignedEnvelope::unsigned(envelope).sign(&alice);

    // What a node receives over HTTP is the blob, not the struct.
    let transported = SignedEnvelope::decode_blob(&signed.encode_blob()).unwrap();
    let receipt = ledger.submit(&transported).unwrap();
    assert_eq!(receipt.hash, signed.envelope.hash());
}
