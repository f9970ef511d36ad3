//! Error handling for the pricing tracker

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::pricing::models::{PricingKey, RecordId};

/// A pricing observation violated a record invariant.
///
/// Raised only while constructing a candidate or re-reading a stored row;
/// the observation is discarded, never coerced into a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Malformed currency code: {0:?}")]
    MalformedCurrency(String),

    #[error("Unknown country code: {0:?}")]
    UnknownCountry(String),

    #[error("Currency {currency} not valid for {country}")]
    CurrencyNotAllowed { country: String, currency: String },

    #[error("Negative amount for {field}: {amount}")]
    NegativeAmount { field: &'static str, amount: Decimal },

    #[error("Currency mismatch on {field}: expected {expected}, found {found}")]
    CurrencyMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },
}

/// A write was rejected because it contradicts the stored history.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConflictError {
    #[error("An active record already exists for {0}")]
    AlreadyActive(PricingKey),

    #[error("Observation at {observed} for {key} predates the active version starting {active_from}")]
    OutOfOrder {
        key: PricingKey,
        observed: DateTime<Utc>,
        active_from: DateTime<Utc>,
    },
}

/// The persistence layer failed after validation passed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    /// `expected_version` is 0 when no version was open at fetch time.
    #[error("Record for {key} changed concurrently (expected version {expected_version})")]
    ConcurrentModification {
        key: PricingKey,
        expected_version: i32,
    },

    #[error("Stored record {id} is invalid: {source}")]
    CorruptRecord {
        id: RecordId,
        #[source]
        source: ValidationError,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether re-running the whole update (fresh fetch included) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Timeout(_)
            | StorageError::ConcurrentModification { .. }
            | StorageError::Unavailable(_) => true,
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StorageError::Migration(_) | StorageError::CorruptRecord { .. } => false,
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PricingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PricingError::Storage(e) if e.is_retryable())
    }
}

impl From<sqlx::Error> for PricingError {
    fn from(e: sqlx::Error) -> Self {
        PricingError::Storage(StorageError::Database(e))
    }
}

pub type Result<T> = std::result::Result<T, PricingError>;
