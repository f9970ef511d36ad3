//! Version manager: compare-and-version updates over a `PricingStore`.
//!
//! For each observed tariff the manager fetches the open record of its key and
//! either leaves storage untouched, inserts the first version, or closes the
//! open record and inserts its successor in one atomic store call.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConflictError, PricingError, Result, StorageError};
use crate::retry::{retry_with_backoff, RetryPolicy};

use super::models::{PricingCandidate, PricingKey, PricingRecord};
use super::store::{NewVersion, PricingStore};
use super::validity::floor_to_hour;

/// Default upper bound for a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which branch of `update` fired
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Payload equals the active version; nothing was written.
    NoChange { current: PricingRecord },
    /// A new version was opened. `previous` is the record it closed, absent
    /// when the key had no active version.
    Versioned {
        previous: Option<PricingRecord>,
        current: PricingRecord,
    },
}

impl UpdateOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, UpdateOutcome::Versioned { .. })
    }

    /// The active record after the update.
    pub fn current(&self) -> &PricingRecord {
        match self {
            UpdateOutcome::NoChange { current } | UpdateOutcome::Versioned { current, .. } => {
                current
            }
        }
    }
}

pub struct VersionManager<S> {
    store: S,
    timeout: Duration,
}

impl<S: PricingStore> VersionManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`; expiry surfaces as `StorageError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
    }

    /// The active version for `key`, if the key has one.
    pub async fn get_current(&self, key: &PricingKey) -> Result<Option<PricingRecord>> {
        self.bounded(self.store.find_current(key)).await
    }

    /// All versions of `key`, ascending by version. Empty for unknown keys.
    pub async fn get_history(&self, key: &PricingKey) -> Result<Vec<PricingRecord>> {
        self.bounded(self.store.find_history(key)).await
    }

    /// Insert `candidate` as the active version of a key that has none.
    ///
    /// Starts at version 1; a retired key continues after its last version.
    /// Without an observation time the current hour is used.
    pub async fn insert(&self, candidate: &PricingCandidate) -> Result<PricingRecord> {
        let at = observation_time(candidate);
        self.insert_at(candidate, at).await
    }

    async fn insert_at(&self, candidate: &PricingCandidate, at: DateTime<Utc>) -> Result<PricingRecord> {
        let key = candidate.key();
        if self.get_current(key).await?.is_some() {
            return Err(ConflictError::AlreadyActive(key.clone()).into());
        }

        let latest = self.bounded(self.store.find_latest(key)).await?;
        let version = match &latest {
            Some(latest) => {
                // A retired key may only reopen after its last window closed.
                if let Some(closed) = latest.valid_to() {
                    if at < closed {
                        return Err(ConflictError::OutOfOrder {
                            key: key.clone(),
                            observed: at,
                            active_from: closed,
                        }
                        .into());
                    }
                }
                latest.version() + 1
            }
            None => 1,
        };

        let record = self
            .bounded(self.store.insert(NewVersion {
                key: key.clone(),
                payload: candidate.payload().clone(),
                version,
                valid_from: at,
            }))
            .await?;

        info!(
            key = %key,
            version,
            price = %record.payload().price_per_kwh,
            valid_from = %at,
            "Inserted pricing version"
        );
        Ok(record)
    }

    /// Compare `candidate` with the active version and record a new version
    /// when the payload differs.
    pub async fn update(&self, candidate: &PricingCandidate) -> Result<UpdateOutcome> {
        let key = candidate.key();
        let at = observation_time(candidate);

        let Some(current) = self.get_current(key).await? else {
            let inserted = match self.insert_at(candidate, at).await {
                // Another writer opened a version since the fetch.
                Err(PricingError::Conflict(ConflictError::AlreadyActive(key))) => {
                    return Err(StorageError::ConcurrentModification {
                        key,
                        expected_version: 0,
                    }
                    .into());
                }
                other => other?,
            };
            return Ok(UpdateOutcome::Versioned {
                previous: None,
                current: inserted,
            });
        };

        if current.same_price(candidate) {
            debug!(key = %key, version = current.version(), "No changes detected");
            return Ok(UpdateOutcome::NoChange { current });
        }

        // Equal instants are allowed: a second change within the same hour
        // leaves the superseded version with an empty window.
        if at < current.valid_from() {
            return Err(ConflictError::OutOfOrder {
                key: key.clone(),
                observed: at,
                active_from: current.valid_from(),
            }
            .into());
        }

        let new = NewVersion {
            key: key.clone(),
            payload: candidate.payload().clone(),
            version: current.version() + 1,
            valid_from: at,
        };
        let (previous, current) = self.bounded(self.store.supersede(&current, new)).await?;

        info!(
            key = %key,
            from_version = previous.version(),
            to_version = current.version(),
            old_price = %previous.payload().price_per_kwh,
            new_price = %current.payload().price_per_kwh,
            valid_from = %at,
            "Price change recorded"
        );
        Ok(UpdateOutcome::Versioned {
            previous: Some(previous),
            current,
        })
    }

    /// `update`, re-run from a fresh fetch on retryable storage failures.
    pub async fn update_with_retry(
        &self,
        candidate: &PricingCandidate,
        policy: &RetryPolicy,
    ) -> Result<UpdateOutcome> {
        retry_with_backoff(policy, move || self.update(candidate)).await
    }

    /// Close the active version of `key` at `at` (floored) without a successor.
    pub async fn retire(&self, key: &PricingKey, at: DateTime<Utc>) -> Result<Option<PricingRecord>> {
        let Some(current) = self.get_current(key).await? else {
            return Ok(None);
        };
        self.close(&current, floor_to_hour(at)).await.map(Some)
    }

    /// Retire every active version of `provider` whose model name is listed,
    /// in all countries. Returns the closed records.
    ///
    /// Every record is checked against `at` before the first one is closed, so
    /// an out-of-order retirement closes nothing.
    pub async fn retire_models<N: AsRef<str>>(
        &self,
        provider: &str,
        model_names: &[N],
        at: DateTime<Utc>,
    ) -> Result<Vec<PricingRecord>> {
        let at = floor_to_hour(at);
        let mut active = Vec::new();
        for name in model_names {
            active.extend(
                self.bounded(self.store.find_active_by_model(provider, name.as_ref()))
                    .await?,
            );
        }
        if let Some(record) = active.iter().find(|r| at < r.valid_from()) {
            return Err(ConflictError::OutOfOrder {
                key: record.key().clone(),
                observed: at,
                active_from: record.valid_from(),
            }
            .into());
        }

        let mut closed = Vec::with_capacity(active.len());
        for record in &active {
            match self.close(record, at).await {
                Ok(record) => closed.push(record),
                Err(e) => {
                    warn!(
                        provider,
                        closed = closed.len(),
                        remaining = active.len() - closed.len(),
                        error = %e,
                        "Retirement stopped part way"
                    );
                    return Err(e);
                }
            }
        }
        info!(provider, retired = closed.len(), "Retired pricing models");
        Ok(closed)
    }

    async fn close(&self, current: &PricingRecord, at: DateTime<Utc>) -> Result<PricingRecord> {
        if at < current.valid_from() {
            return Err(ConflictError::OutOfOrder {
                key: current.key().clone(),
                observed: at,
                active_from: current.valid_from(),
            }
            .into());
        }
        let closed = self.bounded(self.store.close(current, at)).await?;
        info!(key = %closed.key(), version = closed.version(), valid_to = %at, "Closed pricing version");
        Ok(closed)
    }
}

fn observation_time(candidate: &PricingCandidate) -> DateTime<Utc> {
    candidate
        .observed_at()
        .unwrap_or_else(|| floor_to_hour(Utc::now()))
}
