//! # Package Store
//!
//! In-memory persistence for package records: one record per package holding
//! the full escrow plan, the parent link for relays, and the lifecycle
//! tracker. The store snapshots to a JSON file so a devnet node survives
//! restarts; it validates nothing beyond the round-trip.

use caravan_escrow::{EscrowPlan, PackageLifecycle};
use caravan_protocol::CaravanPublicKey;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("package {0} not found")]
    NotFound(Uuid),

    #[error("snapshot io failure")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not a valid package list: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One persisted package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub package_id: Uuid,
    pub plan: EscrowPlan,
    /// Set for relay packages: the escrow account of the parent leg.
    pub parent_escrow: Option<CaravanPublicKey>,
    pub lifecycle: PackageLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackageRecord {
    pub fn new(plan: EscrowPlan, parent_escrow: Option<CaravanPublicKey>) -> Self {
        let now = Utc::now();
        let lifecycle = PackageLifecycle::launched(plan.courier);
        Self {
            package_id: Uuid::new_v4(),
            plan,
            parent_escrow,
            lifecycle,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Concurrent package map with JSON snapshot round-trip.
#[derive(Default)]
pub struct PackageStore {
    records: DashMap<Uuid, PackageRecord>,
}

impl PackageStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn insert(&self, record: PackageRecord) -> Uuid {
        let id = record.package_id;
        self.records.insert(id, record);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<PackageRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Mutate one record under its shard lock.
    pub fn update<F, T>(&self, id: &Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PackageRecord) -> T,
    {
        let mut entry = self.records.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        let out = f(&mut entry);
        entry.updated_at = Utc::now();
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count of packages whose lifecycle has not reached a terminal state.
    pub fn open_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.lifecycle.state().is_terminal())
            .count()
    }

    /// Write all records to `path` as a JSON array.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let records: Vec<PackageRecord> = self.records.iter().map(|r| r.clone()).collect();
        let json = serde_json::to_vec_pretty(&records)?;
        std::fs::write(path, json)?;
        tracing::info!(count = records.len(), path = %path.display(), "package snapshot written");
        Ok(())
    }

    /// Load records from a snapshot written by
    /// [`save_snapshot`](Self::save_snapshot). A missing file yields an
    /// empty store.
    pub fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let records: Vec<PackageRecord> = serde_json::from_slice(&bytes)?;
        let store = Self::new();
        for record in records {
            store.records.insert(record.package_id, record);
        }
        tracing::info!(count = store.len(), path = %path.display(), "package snapshot loaded");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravan_escrow::{EscrowPlanBuilder, PackageEvent};
    use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger};

    fn sample_record() -> PackageRecord {
        let ledger = InMemoryLedger::at_time(1_000_000);
        let escrow = CaravanKeypair::generate();
        ledger.create_account(escrow.public_key(), 50_000_000).unwrap();
        let plan = EscrowPlanBuilder::new(escrow.public_key())
            .launcher(CaravanKeypair::generate().public_key())
            .courier(CaravanKeypair::generate().public_key())
            .recipient(CaravanKeypair::generate().public_key())
            .payment(50_000_000)
            .collateral(100_000_000)
            .deadline(1_000_600)
            .asset(Asset::Token {
                code: "CRGO".to_string(),
                issuer: CaravanKeypair::generate().public_key(),
            })
            .build(&ledger)
            .unwrap();
        PackageRecord::new(plan, None)
    }

    #[test]
    fn insert_and_get() {
        let store = PackageStore::new();
        let record = sample_record();
        let escrow = record.plan.escrow;
        let id = store.insert(record);
        assert_eq!(store.get(&id).unwrap().plan.escrow, escrow);
        assert!(store.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn update_advances_lifecycle_and_timestamp() {
        let store = PackageStore::new();
        let id = store.insert(sample_record());
        let before = store.get(&id).unwrap().updated_at;

        let state = store
            .update(&id, |record| {
                record.lifecycle.apply(PackageEvent::PaymentConfirmed)
            })
            .unwrap()
            .unwrap();
        assert!(state.is_terminal());
        assert!(store.get(&id).unwrap().updated_at >= before);
        assert_eq!(store.open_count(), 0);
    }

    #[test]
    fn update_missing_package_errors() {
        let store = PackageStore::new();
        let err = store.update(&Uuid::new_v4(), |_| ()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.json");

        let store = PackageStore::new();
        let id_a = store.insert(sample_record());
        let id_b = store.insert(sample_record());
        store.save_snapshot(&path).unwrap();

        let restored = PackageStore::load_snapshot(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get(&id_a).unwrap().plan.escrow,
            store.get(&id_a).unwrap().plan.escrow
        );
        assert_eq!(
            restored.get(&id_b).unwrap().plan.envelopes.refund.hash(),
            store.get(&id_b).unwrap().plan.envelopes.refund.hash()
        );
    }

    #[test]
    fn missing_snapshot_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::load_snapshot(&dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }
}
