//! Database queries for the pricing history table.
//!
//! Reads go through the pool; writes take a connection so they can run inside
//! the caller's transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::{ConflictError, Result, StorageError};

use super::models::{PricingKey, PricingRecord, PricingRow};
use super::store::NewVersion;

/// Partial unique index holding at most one open record per key
const OPEN_KEY_INDEX: &str = "pricing_open_key_idx";

const COLUMNS: &str = r#"
    id, country, provider, pricing_model_name, currency,
    price_per_kwh, monthly_price, initial_price,
    version, valid_from, valid_to
"#;

fn to_record(row: PricingRow) -> Result<PricingRecord> {
    let id = row.id.into();
    PricingRecord::try_from(row)
        .map_err(|source| StorageError::CorruptRecord { id, source }.into())
}

fn to_records(rows: Vec<PricingRow>) -> Result<Vec<PricingRecord>> {
    rows.into_iter().map(to_record).collect()
}

/// Get the open-ended record for a key
pub async fn find_current(pool: &PgPool, key: &PricingKey) -> Result<Option<PricingRecord>> {
    let row = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM pricing
        WHERE country = $1
          AND provider = $2
          AND pricing_model_name = $3
          AND valid_to IS NULL
        "#
    ))
    .bind(key.country.as_str())
    .bind(&key.provider)
    .bind(&key.model_name)
    .fetch_optional(pool)
    .await?;

    row.map(to_record).transpose()
}

/// Get every version of a key, oldest first
pub async fn find_history(pool: &PgPool, key: &PricingKey) -> Result<Vec<PricingRecord>> {
    let rows = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM pricing
        WHERE country = $1
          AND provider = $2
          AND pricing_model_name = $3
        ORDER BY version ASC
        "#
    ))
    .bind(key.country.as_str())
    .bind(&key.provider)
    .bind(&key.model_name)
    .fetch_all(pool)
    .await?;

    to_records(rows)
}

/// Get the newest version of a key, whether open or closed
pub async fn find_latest(pool: &PgPool, key: &PricingKey) -> Result<Option<PricingRecord>> {
    let row = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM pricing
        WHERE country = $1
          AND provider = $2
          AND pricing_model_name = $3
        ORDER BY version DESC
        LIMIT 1
        "#
    ))
    .bind(key.country.as_str())
    .bind(&key.provider)
    .bind(&key.model_name)
    .fetch_optional(pool)
    .await?;

    row.map(to_record).transpose()
}

/// Get open records of a provider's model in every country
pub async fn find_active_by_model(
    pool: &PgPool,
    provider: &str,
    model_name: &str,
) -> Result<Vec<PricingRecord>> {
    let rows = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM pricing
        WHERE provider = $1
          AND pricing_model_name = $2
          AND valid_to IS NULL
        ORDER BY country
        "#
    ))
    .bind(provider)
    .bind(model_name)
    .fetch_all(pool)
    .await?;

    to_records(rows)
}

/// Insert an open-ended version
pub async fn insert_version(conn: &mut PgConnection, new: &NewVersion) -> Result<PricingRecord> {
    let subscription = &new.payload.subscription;
    let result = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        INSERT INTO pricing (
            id, country, provider, pricing_model_name, currency,
            price_per_kwh, monthly_price, initial_price,
            version, valid_from, valid_to
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(uuid::Uuid::new_v4())
    .bind(new.key.country.as_str())
    .bind(&new.key.provider)
    .bind(&new.key.model_name)
    .bind(new.payload.currency.as_str())
    .bind(new.payload.price_per_kwh.amount)
    .bind(subscription.monthly_price.as_ref().map(|m| m.amount))
    .bind(subscription.initial_price.as_ref().map(|m| m.amount))
    .bind(new.version)
    .bind(new.valid_from)
    .fetch_one(&mut *conn)
    .await;

    match result {
        Ok(row) => to_record(row),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            if db_err.constraint() == Some(OPEN_KEY_INDEX) {
                Err(ConflictError::AlreadyActive(new.key.clone()).into())
            } else {
                // Version number taken: someone else wrote this key since we read it.
                Err(StorageError::ConcurrentModification {
                    key: new.key.clone(),
                    expected_version: new.version - 1,
                }
                .into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Close an open version, provided it is still open at the version we read
pub async fn close_version(
    conn: &mut PgConnection,
    current: &PricingRecord,
    at: DateTime<Utc>,
) -> Result<PricingRecord> {
    let row = sqlx::query_as::<_, PricingRow>(&format!(
        r#"
        UPDATE pricing
        SET valid_to = $3
        WHERE id = $1
          AND version = $2
          AND valid_to IS NULL
        RETURNING {COLUMNS}
        "#
    ))
    .bind(current.id().as_uuid())
    .bind(current.version())
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => to_record(row),
        None => Err(StorageError::ConcurrentModification {
            key: current.key().clone(),
            expected_version: current.version(),
        }
        .into()),
    }
}
