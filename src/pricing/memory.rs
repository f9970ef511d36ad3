//! In-process pricing store.
//!
//! Keeps every version in a single locked vector. All checks and mutations of
//! one call happen under the same write lock, so `supersede` is atomic.
//! Used by tests and by dry runs that should not touch the database.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{ConflictError, Result, StorageError};

use super::models::{PricingKey, PricingRecord, RecordId};
use super::store::{NewVersion, PricingStore};

#[derive(Default)]
pub struct MemoryPricingStore {
    records: RwLock<Vec<PricingRecord>>,
    writes: AtomicU64,
    fail_next_write: AtomicBool,
}

impl MemoryPricingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored version, in insertion order.
    pub fn records(&self) -> Vec<PricingRecord> {
        self.records.read().clone()
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next write call fail with `StorageError::Unavailable`,
    /// leaving the stored state untouched.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_failpoint(&self) -> Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".to_string()).into());
        }
        Ok(())
    }

    fn open_index(records: &[PricingRecord], key: &PricingKey) -> Option<usize> {
        records
            .iter()
            .position(|r| r.key() == key && r.is_current())
    }

    fn check_insertable(records: &[PricingRecord], new: &NewVersion) -> Result<()> {
        if Self::open_index(records, &new.key).is_some() {
            return Err(ConflictError::AlreadyActive(new.key.clone()).into());
        }
        if records
            .iter()
            .any(|r| r.key() == &new.key && r.version() == new.version)
        {
            return Err(StorageError::ConcurrentModification {
                key: new.key.clone(),
                expected_version: new.version - 1,
            }
            .into());
        }
        Ok(())
    }

    fn closable_index(records: &[PricingRecord], current: &PricingRecord) -> Result<usize> {
        records
            .iter()
            .position(|r| r.id() == current.id() && r.version() == current.version() && r.is_current())
            .ok_or_else(|| {
                StorageError::ConcurrentModification {
                    key: current.key().clone(),
                    expected_version: current.version(),
                }
                .into()
            })
    }

    fn materialize(new: NewVersion) -> PricingRecord {
        PricingRecord::new(
            RecordId::new(),
            new.key,
            new.payload,
            new.version,
            new.valid_from,
            None,
        )
    }
}

#[async_trait]
impl PricingStore for MemoryPricingStore {
    async fn find_current(&self, key: &PricingKey) -> Result<Option<PricingRecord>> {
        let records = self.records.read();
        Ok(Self::open_index(&records, key).map(|i| records[i].clone()))
    }

    async fn find_history(&self, key: &PricingKey) -> Result<Vec<PricingRecord>> {
        let mut history: Vec<PricingRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| r.key() == key)
            .cloned()
            .collect();
        history.sort_by_key(|r| r.version());
        Ok(history)
    }

    async fn find_latest(&self, key: &PricingKey) -> Result<Option<PricingRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.key() == key)
            .max_by_key(|r| r.version())
            .cloned())
    }

    async fn find_active_by_model(
        &self,
        provider: &str,
        model_name: &str,
    ) -> Result<Vec<PricingRecord>> {
        let mut active: Vec<PricingRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| {
                r.is_current() && r.key().provider == provider && r.key().model_name == model_name
            })
            .cloned()
            .collect();
        active.sort_by_key(|r| r.key().country.as_str());
        Ok(active)
    }

    async fn insert(&self, new: NewVersion) -> Result<PricingRecord> {
        let mut records = self.records.write();
        Self::check_insertable(&records, &new)?;
        self.check_failpoint()?;

        let record = Self::materialize(new);
        records.push(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn supersede(
        &self,
        current: &PricingRecord,
        new: NewVersion,
    ) -> Result<(PricingRecord, PricingRecord)> {
        let mut records = self.records.write();
        let idx = Self::closable_index(&records, current)?;
        // Version numbers stay unique per key.
        if records
            .iter()
            .any(|r| r.key() == &new.key && r.version() == new.version)
        {
            return Err(StorageError::ConcurrentModification {
                key: new.key.clone(),
                expected_version: current.version(),
            }
            .into());
        }
        self.check_failpoint()?;

        let closed = records[idx].closed_at(new.valid_from);
        let inserted = Self::materialize(new);
        records[idx] = closed.clone();
        records.push(inserted.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok((closed, inserted))
    }

    async fn close(&self, current: &PricingRecord, at: DateTime<Utc>) -> Result<PricingRecord> {
        let mut records = self.records.write();
        let idx = Self::closable_index(&records, current)?;
        self.check_failpoint()?;

        let closed = records[idx].closed_at(at);
        records[idx] = closed.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(closed)
    }
}
