//! # In-Memory Ledger
//!
//! A simulated ledger implementing [`LedgerClient`] with the full semantics
//! the escrow protocol depends on: strict sequence matching, wall-clock
//! timelocks against a settable clock, weighted-signer authorization with
//! pre-authorized transaction signers, and token balances with trust-line
//! bookkeeping.
//!
//! It backs the test suites and the devnet node. It does not pretend to be a
//! consensus ledger: there is one writer lock and no history.

use super::{AccountRecord, LedgerClient, LedgerError, RejectReason, SubmitReceipt};
use crate::crypto::CaravanPublicKey;
use crate::envelope::{Asset, Operation, SignedEnvelope, SignerKey, TxHash};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// The simulated ledger. Cheap to create per test; shared behind an `Arc`
/// in the node.
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<CaravanPublicKey, AccountRecord>>,
    clock: AtomicI64,
}

impl InMemoryLedger {
    /// An empty ledger with its clock at the current wall time.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(chrono::Utc::now().timestamp()),
        }
    }

    /// An empty ledger with its clock pinned to `unix_seconds`. Tests use
    /// this for deterministic timelock behavior.
    pub fn at_time(unix_seconds: i64) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(unix_seconds),
        }
    }

    pub fn set_time(&self, unix_seconds: i64) {
        self.clock.store(unix_seconds, Ordering::SeqCst);
    }

    pub fn advance_time(&self, seconds: i64) {
        self.clock.fetch_add(seconds, Ordering::SeqCst);
    }

    // --- debug helpers, the friendbot surface ---

    /// Create an account out of thin air with a native balance. This is the
    /// devnet funding path; on a real ledger creation happens through a
    /// `CreateAccount` operation paid for by an existing account.
    pub fn create_account(
        &self,
        account: CaravanPublicKey,
        native_balance: i64,
    ) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account) {
            return Err(LedgerError::TransactionRejected(RejectReason::AccountExists));
        }
        accounts.insert(account, AccountRecord::fresh(native_balance));
        Ok(())
    }

    /// Open a trust line directly, bypassing a `ChangeTrust` transaction.
    pub fn open_trustline(
        &self,
        account: &CaravanPublicKey,
        asset: &Asset,
    ) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write();
        let record = accounts
            .get_mut(account)
            .ok_or(LedgerError::AccountNotFound { account: *account })?;
        record.asset_balances.entry(asset.balance_key()).or_insert(0);
        Ok(())
    }

    /// Credit tokens directly, opening the trust line if needed. This is the
    /// issuer-funding debug path.
    pub fn credit_token(
        &self,
        account: &CaravanPublicKey,
        asset: &Asset,
        amount: i64,
    ) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write();
        let record = accounts
            .get_mut(account)
            .ok_or(LedgerError::AccountNotFound { account: *account })?;
        *record.asset_balances.entry(asset.balance_key()).or_insert(0) += amount;
        Ok(())
    }

    pub fn account_exists(&self, account: &CaravanPublicKey) -> bool {
        self.accounts.read().contains_key(account)
    }

    // --- submission internals ---

    fn authorized_weight(
        source: &AccountRecord,
        source_key: &CaravanPublicKey,
        signed: &SignedEnvelope,
        tx_hash: &TxHash,
        canonical: &[u8],
    ) -> u32 {
        let mut weight: u32 = 0;
        for entry in &source.signers {
            match entry.key {
                // A preauth signer counts only for the bit-exact envelope it
                // was configured from.
                SignerKey::PreAuthTx { hash } if hash == *tx_hash => {
                    weight += u32::from(entry.weight);
                }
                SignerKey::PreAuthTx { .. } => {}
                SignerKey::Ed25519 { key } => {
                    let signed_by_key = signed
                        .signatures
                        .iter()
                        .any(|d| d.signer == key && key.verify(canonical, &d.signature));
                    if signed_by_key {
                        weight += u32::from(entry.weight);
                    }
                }
            }
        }
        let signed_by_master = signed
            .signatures
            .iter()
            .any(|d| d.signer == *source_key && source_key.verify(canonical, &d.signature));
        if signed_by_master {
            weight += u32::from(source.thresholds.master);
        }
        weight
    }

    fn apply_operation(
        accounts: &mut HashMap<CaravanPublicKey, AccountRecord>,
        source_key: &CaravanPublicKey,
        op: &Operation,
    ) -> Result<(), RejectReason> {
        match op {
            Operation::CreateAccount {
                destination,
                starting_balance,
            } => {
                if accounts.contains_key(destination) {
                    return Err(RejectReason::AccountExists);
                }
                let source = accounts
                    .get_mut(source_key)
                    .ok_or(RejectReason::NoSuchDestination)?;
                if *starting_balance <= 0 || source.native_balance < *starting_balance {
                    return Err(RejectReason::InsufficientBalance);
                }
                source.native_balance -= starting_balance;
                accounts.insert(*destination, AccountRecord::fresh(*starting_balance));
                Ok(())
            }

            Operation::Payment {
                destination,
                amount,
                asset,
            } => {
                if *amount <= 0 {
                    return Err(RejectReason::InsufficientBalance);
                }
                if !accounts.contains_key(destination) {
                    return Err(RejectReason::NoSuchDestination);
                }
                match asset {
                    Asset::Native => {
                        let source = accounts
                            .get_mut(source_key)
                            .ok_or(RejectReason::NoSuchDestination)?;
                        if source.native_balance < *amount {
                            return Err(RejectReason::InsufficientBalance);
                        }
                        source.native_balance -= amount;
                        accounts
                            .get_mut(destination)
                            .ok_or(RejectReason::NoSuchDestination)?
                            .native_balance += amount;
                        Ok(())
                    }
                    Asset::Token { issuer, .. } => {
                        let key = asset.balance_key();
                        // The issuer mints on send and burns on receive; it
                        // holds no trust line in its own token.
                        if source_key != issuer {
                            let source = accounts
                                .get_mut(source_key)
                                .ok_or(RejectReason::NoSuchDestination)?;
                            let balance = source
                                .asset_balances
                                .get_mut(&key)
                                .ok_or(RejectReason::MissingTrustline)?;
                            if *balance < *amount {
                                return Err(RejectReason::InsufficientBalance);
                            }
                            *balance -= amount;
                        }
                        if destination != issuer {
                            let dest = accounts
                                .get_mut(destination)
                                .ok_or(RejectReason::NoSuchDestination)?;
                            let balance = dest
                                .asset_balances
                                .get_mut(&key)
                                .ok_or(RejectReason::MissingTrustline)?;
                            *balance += amount;
                        }
                        Ok(())
                    }
                }
            }

            Operation::ChangeTrust { asset, limit } => {
                let Asset::Token { .. } = asset else {
                    // Trust in the native asset is implicit.
                    return Ok(());
                };
                let key = asset.balance_key();
                let source = accounts
                    .get_mut(source_key)
                    .ok_or(RejectReason::NoSuchDestination)?;
                match limit {
                    Some(0) => {
                        match source.asset_balances.get(&key) {
                            Some(balance) if *balance != 0 => {
                                Err(RejectReason::TrustlineNotEmpty)
                            }
                            Some(_) => {
                                source.asset_balances.remove(&key);
                                Ok(())
                            }
                            None => Ok(()),
                        }
                    }
                    _ => {
                        source.asset_balances.entry(key).or_insert(0);
                        Ok(())
                    }
                }
            }

            Operation::AccountMerge { destination } => {
                if !accounts.contains_key(destination) {
                    return Err(RejectReason::NoSuchDestination);
                }
                let source = accounts
                    .get(source_key)
                    .ok_or(RejectReason::NoSuchDestination)?;
                // An account holding token balances cannot be merged away.
                if source.asset_balances.values().any(|b| *b != 0) {
                    return Err(RejectReason::TrustlineNotEmpty);
                }
                let remaining = source.native_balance;
                accounts.remove(source_key);
                accounts
                    .get_mut(destination)
                    .ok_or(RejectReason::NoSuchDestination)?
                    .native_balance += remaining;
                Ok(())
            }

            Operation::SetOptions {
                signer,
                master_weight,
                low_threshold,
                medium_threshold,
                high_threshold,
            } => {
                let source = accounts
                    .get_mut(source_key)
                    .ok_or(RejectReason::NoSuchDestination)?;
                if let Some(entry) = signer {
                    source.signers.retain(|existing| existing.key != entry.key);
                    if entry.weight > 0 {
                        source.signers.push(*entry);
                    }
                }
                if let Some(w) = master_weight {
                    source.thresholds.master = *w;
                }
                if let Some(t) = low_threshold {
                    source.thresholds.low = *t;
                }
                if let Some(t) = medium_threshold {
                    source.thresholds.medium = *t;
                }
                if let Some(t) = high_threshold {
                    source.thresholds.high = *t;
                }
                Ok(())
            }
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerClient for InMemoryLedger {
    fn get_account(&self, account: &CaravanPublicKey) -> Result<AccountRecord, LedgerError> {
        self.accounts
            .read()
            .get(account)
            .cloned()
            .ok_or(LedgerError::AccountNotFound { account: *account })
    }

    fn submit(&self, signed: &SignedEnvelope) -> Result<SubmitReceipt, LedgerError> {
        let now = self.now();
        let envelope = &signed.envelope;
        let tx_hash = envelope.hash();
        let canonical = envelope.canonical_bytes();

        let mut accounts = self.accounts.write();

        if let Some(bounds) = &envelope.time_bounds {
            if now < bounds.min_time {
                return Err(LedgerError::TransactionRejected(
                    RejectReason::TimelockNotYetValid,
                ));
            }
            if let Some(max) = bounds.max_time {
                if now > max {
                    return Err(LedgerError::TransactionRejected(
                        RejectReason::TimelockExpired,
                    ));
                }
            }
        }

        let source = accounts
            .get(&envelope.source)
            .ok_or(LedgerError::AccountNotFound {
                account: envelope.source,
            })?;

        if envelope.sequence != source.sequence + 1 {
            return Err(LedgerError::TransactionRejected(RejectReason::BadSequence));
        }

        let required = source
            .thresholds
            .required_weight(envelope.required_category());
        let weight =
            Self::authorized_weight(source, &envelope.source, signed, &tx_hash, &canonical);
        if weight < required {
            tracing::debug!(
                tx = %tx_hash,
                weight,
                required,
                "rejecting submission below threshold"
            );
            return Err(LedgerError::TransactionRejected(
                RejectReason::ThresholdNotMet,
            ));
        }

        // Validate-then-commit: apply operations to a staged copy so a
        // mid-transaction failure leaves the ledger untouched.
        let mut staged = accounts.clone();
        for op in &envelope.operations {
            Self::apply_operation(&mut staged, &envelope.source, op)
                .map_err(LedgerError::TransactionRejected)?;
        }

        // The source may have merged itself away; otherwise consume the
        // sequence slot and retire the preauth signer that just fired.
        if let Some(record) = staged.get_mut(&envelope.source) {
            record.sequence = envelope.sequence;
            record
                .signers
                .retain(|entry| entry.key != SignerKey::PreAuthTx { hash: tx_hash });
        }

        *accounts = staged;
        tracing::debug!(tx = %tx_hash, applied_at = now, "transaction applied");
        Ok(SubmitReceipt {
            hash: tx_hash,
            applied_at: now,
        })
    }

    fn now(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }
}
