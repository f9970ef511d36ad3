//! Persistence seam for versioned pricing records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

use super::models::{PricingKey, PricingPayload, PricingRecord};
use super::queries;

/// A version about to be written as the open-ended record of its key
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub key: PricingKey,
    pub payload: PricingPayload,
    pub version: i32,
    pub valid_from: DateTime<Utc>,
}

/// Storage backend for pricing history.
///
/// Implementations must make `supersede` atomic: either the current record is
/// closed and the successor inserted, or nothing changes. The close step only
/// applies while the record is still open at the expected version; otherwise
/// the call fails with `StorageError::ConcurrentModification`.
#[async_trait]
pub trait PricingStore: Send + Sync {
    /// The open-ended record for `key`, if any.
    async fn find_current(&self, key: &PricingKey) -> Result<Option<PricingRecord>>;

    /// Every version for `key`, ascending by version.
    async fn find_history(&self, key: &PricingKey) -> Result<Vec<PricingRecord>>;

    /// The highest version stored for `key`, open or closed.
    async fn find_latest(&self, key: &PricingKey) -> Result<Option<PricingRecord>>;

    /// Open records of `provider` named `model_name`, across all countries.
    async fn find_active_by_model(
        &self,
        provider: &str,
        model_name: &str,
    ) -> Result<Vec<PricingRecord>>;

    /// Insert an open-ended record. Fails with `ConflictError::AlreadyActive`
    /// when the key already has one.
    async fn insert(&self, new: NewVersion) -> Result<PricingRecord>;

    /// Close `current` at `new.valid_from` and insert `new`, atomically.
    /// Returns the closed record and the inserted one.
    async fn supersede(
        &self,
        current: &PricingRecord,
        new: NewVersion,
    ) -> Result<(PricingRecord, PricingRecord)>;

    /// Close `current` at `at` without a successor.
    async fn close(&self, current: &PricingRecord, at: DateTime<Utc>) -> Result<PricingRecord>;
}

/// Postgres-backed store over a shared connection pool
#[derive(Clone)]
pub struct PgPricingStore {
    pool: PgPool,
}

impl PgPricingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(crate::error::StorageError::from)?;
        Ok(())
    }
}

#[async_trait]
impl PricingStore for PgPricingStore {
    async fn find_current(&self, key: &PricingKey) -> Result<Option<PricingRecord>> {
        queries::find_current(&self.pool, key).await
    }

    async fn find_history(&self, key: &PricingKey) -> Result<Vec<PricingRecord>> {
        queries::find_history(&self.pool, key).await
    }

    async fn find_latest(&self, key: &PricingKey) -> Result<Option<PricingRecord>> {
        queries::find_latest(&self.pool, key).await
    }

    async fn find_active_by_model(
        &self,
        provider: &str,
        model_name: &str,
    ) -> Result<Vec<PricingRecord>> {
        queries::find_active_by_model(&self.pool, provider, model_name).await
    }

    async fn insert(&self, new: NewVersion) -> Result<PricingRecord> {
        let mut conn = self.pool.acquire().await?;
        queries::insert_version(&mut *conn, &new).await
    }

    async fn supersede(
        &self,
        current: &PricingRecord,
        new: NewVersion,
    ) -> Result<(PricingRecord, PricingRecord)> {
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;
        let closed = queries::close_version(&mut *tx, current, new.valid_from).await?;
        let inserted = queries::insert_version(&mut *tx, &new).await?;
        tx.commit().await?;
        Ok((closed, inserted))
    }

    async fn close(&self, current: &PricingRecord, at: DateTime<Utc>) -> Result<PricingRecord> {
        let mut conn = self.pool.acquire().await?;
        queries::close_version(&mut *conn, current, at).await
    }
}
