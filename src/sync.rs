//! One pass over a pricing source: extract every card, validate it, and feed
//! it to the version manager.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PricingError;
use crate::pricing::countries;
use crate::pricing::extract::extract;
use crate::pricing::models::{PricingCandidate, PricingRecord};
use crate::pricing::services::{UpdateOutcome, VersionManager};
use crate::pricing::store::PricingStore;
use crate::retry::RetryPolicy;
use crate::source::{PricingSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Counts of what a sync did, per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub provider: String,
    pub observed_at: Option<DateTime<Utc>>,
    pub inserted: usize,
    pub versioned: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Cards of retired models, left out of the history
    pub retired: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::NoChange { .. } => self.unchanged += 1,
            UpdateOutcome::Versioned { previous: None, .. } => self.inserted += 1,
            UpdateOutcome::Versioned { previous: Some(_), .. } => self.versioned += 1,
        }
    }
}

/// Sync every card of `source`, observed at the source's own timestamp or
/// `fallback_at`.
///
/// Cards of `retired_models` are ignored so a retired model is never
/// reopened by a source that still lists it. Cards that fail extraction or
/// validation, and observations rejected as conflicts, are logged and skipped. Storage failures that outlast the retry
/// policy abort the sync.
pub async fn sync_source<S, P>(
    manager: &VersionManager<S>,
    source: &P,
    fallback_at: DateTime<Utc>,
    policy: &RetryPolicy,
    retired_models: &[String],
) -> Result<SyncReport, SyncError>
where
    S: PricingStore,
    P: PricingSource + ?Sized,
{
    let provider = source.provider();
    let at = source.observed_at().unwrap_or(fallback_at);
    let mut report = SyncReport {
        provider: provider.to_string(),
        observed_at: Some(at),
        ..Default::default()
    };

    for label in source.countries().await? {
        let cards = source.cards(&label).await?;
        let Some(country) = countries::resolve(&label) else {
            warn!(country = %label, cards = cards.len(), "Skipping unknown country");
            report.skipped += cards.len();
            continue;
        };
        debug!(country, cards = cards.len(), "Syncing country");

        for card in cards {
            if retired_models.iter().any(|name| name.trim() == card.model_name.trim()) {
                debug!(country, model = %card.model_name, "Ignoring retired model");
                report.retired += 1;
                continue;
            }

            let extracted = match extract(&card, country) {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(country, model = %card.model_name, error = %e, "Skipping unreadable card");
                    report.skipped += 1;
                    continue;
                }
            };

            let mut raw = extracted.into_raw(country, provider);
            raw.observed_at = Some(at);
            let candidate = match PricingCandidate::new(raw) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(country, model = %card.model_name, error = %e, "Skipping invalid pricing");
                    report.skipped += 1;
                    continue;
                }
            };

            match manager.update_with_retry(&candidate, policy).await {
                Ok(outcome) => report.record(&outcome),
                Err(PricingError::Conflict(e)) => {
                    warn!(key = %candidate.key(), error = %e, "Skipping conflicting observation");
                    report.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!(
        provider,
        inserted = report.inserted,
        versioned = report.versioned,
        unchanged = report.unchanged,
        skipped = report.skipped,
        retired = report.retired,
        "Pricing sync complete"
    );
    Ok(report)
}

/// Sync `source`, then close any version of `retired_models` still open for
/// its provider, at the same observation time.
pub async fn sync_and_retire<S, P>(
    manager: &VersionManager<S>,
    source: &P,
    fallback_at: DateTime<Utc>,
    policy: &RetryPolicy,
    retired_models: &[String],
) -> Result<(SyncReport, Vec<PricingRecord>), SyncError>
where
    S: PricingStore,
    P: PricingSource + ?Sized,
{
    let report = sync_source(manager, source, fallback_at, policy, retired_models).await?;
    if retired_models.is_empty() {
        return Ok((report, Vec::new()));
    }
    let at = report.observed_at.unwrap_or(fallback_at);
    let retired = manager
        .retire_models(source.provider(), retired_models, at)
        .await?;
    Ok((report, retired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::memory::MemoryPricingStore;
    use crate::pricing::models::PricingKey;
    use crate::source::SnapshotSource;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn snapshot(observed_at: &str, power_price: &str) -> SnapshotSource {
        let json = format!(
            r#"{{
                "provider": "Ionity",
                "observed_at": "{observed_at}",
                "countries": [
                    {{ "country": "Germany", "cards": [
                        "Passport Power\n{power_price}\nplus €7.99 for the first month; then €11.99 per month.*",
                        "Direct\n€0.69/kWh\nPay on-site without any monthly fees."
                    ] }},
                    {{ "country": "Atlantis", "cards": [
                        "Direct\n€0.69/kWh\nPay on-site without any monthly fees."
                    ] }},
                    {{ "country": "FR", "cards": [
                        "Direct\n$0.69/kWh\nPay on-site without any monthly fees.",
                        "Motion\nfree\nPay on-site without any monthly fees."
                    ] }}
                ]
            }}"#
        );
        SnapshotSource::from_json_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_sync_counts_each_outcome() {
        let manager = VersionManager::new(MemoryPricingStore::new());
        let fallback = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let policy = RetryPolicy::immediate(3);

        let first = sync_source(&manager, &snapshot("2025-05-01T10:05:00Z", "€0.35/kWh"), fallback, &policy, &[])
            .await
            .unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.versioned, 0);
        // Atlantis card, FR in USD, unreadable price
        assert_eq!(first.skipped, 3);

        let second = sync_source(&manager, &snapshot("2025-05-01T11:00:00Z", "€0.39/kWh"), fallback, &policy, &[])
            .await
            .unwrap();
        assert_eq!(second.versioned, 1);
        assert_eq!(second.unchanged, 1);

        let key = PricingKey::new("DE", "Ionity", "Passport Power").unwrap();
        let current = manager.get_current(&key).await.unwrap().unwrap();
        assert_eq!(current.version(), 2);
        assert_eq!(current.payload().price_per_kwh.amount, dec!(0.39));
        assert_eq!(
            current.valid_from(),
            Utc.with_ymd_and_hms(2025, 5, 1, 11, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_skipped() {
        let manager = VersionManager::new(MemoryPricingStore::new());
        let fallback = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let policy = RetryPolicy::immediate(1);

        sync_source(&manager, &snapshot("2025-05-01T12:00:00Z", "€0.35/kWh"), fallback, &policy, &[])
            .await
            .unwrap();
        let stale = sync_source(&manager, &snapshot("2025-05-01T09:00:00Z", "€0.39/kWh"), fallback, &policy, &[])
            .await
            .unwrap();

        // Passport Power changed price but predates the current record.
        assert_eq!(stale.versioned, 0);
        assert_eq!(stale.unchanged, 1);
        assert_eq!(stale.skipped, 4);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_after_retries() {
        let manager = VersionManager::new(MemoryPricingStore::new());
        let fallback = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        manager.store().fail_next_write();
        let report = sync_source(
            &manager,
            &snapshot("2025-05-01T10:00:00Z", "€0.35/kWh"),
            fallback,
            &RetryPolicy::immediate(2),
            &[],
        )
        .await
        .unwrap();
        assert_eq!(report.inserted, 2);

        manager.store().fail_next_write();
        let err = sync_source(
            &manager,
            &snapshot("2025-05-01T11:00:00Z", "€0.39/kWh"),
            fallback,
            &RetryPolicy::immediate(1),
            &[],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Pricing(ref e) if e.is_retryable()));
    }

    #[tokio::test]
    async fn test_retired_model_stays_retired_across_runs() {
        let manager = VersionManager::new(MemoryPricingStore::new());
        let fallback = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let policy = RetryPolicy::immediate(1);
        let retired = vec!["Passport Power".to_string()];

        sync_source(&manager, &snapshot("2025-05-01T10:00:00Z", "€0.39/kWh"), fallback, &policy, &[])
            .await
            .unwrap();

        for hour in 11..15 {
            let observed_at = format!("2025-05-01T{hour}:00:00Z");
            let (report, closed) = sync_and_retire(
                &manager,
                &snapshot(&observed_at, "€0.39/kWh"),
                fallback,
                &policy,
                &retired,
            )
            .await
            .unwrap();
            assert_eq!(report.retired, 1);
            assert_eq!(report.inserted, 0);
            assert_eq!(closed.len(), usize::from(hour == 11));
        }

        let key = PricingKey::new("DE", "Ionity", "Passport Power").unwrap();
        let history = manager.get_history(&key).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].valid_to(),
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 11, 0, 0).unwrap())
        );
    }
}
