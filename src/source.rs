//! Where pricing cards come from.
//!
//! A `PricingSource` lists the countries a provider publishes tariffs for and
//! the raw cards shown for each. `SnapshotSource` replays a scrape saved as
//! JSON:
//!
//! ```json
//! {
//!   "provider": "Ionity",
//!   "observed_at": "2025-05-01T10:05:00Z",
//!   "countries": [
//!     { "country": "Germany", "cards": [
//!       "Passport Power\n€0.39/kWh\nplus €7.99 for the first month; then €11.99 per month.*",
//!       { "model_name": "Direct", "price_text": "€0.69/kWh",
//!         "subscription_text": "Pay on-site without any monthly fees." }
//!     ] }
//!   ]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::pricing::extract::{ExtractError, RawPricingCard};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed card for {country}: {source}")]
    Card {
        country: String,
        #[source]
        source: ExtractError,
    },

    #[error("Country not present in source: {0}")]
    UnknownCountry(String),

    #[error("Country listed more than once in snapshot: {0}")]
    DuplicateCountry(String),
}

#[async_trait]
pub trait PricingSource: Send + Sync {
    fn provider(&self) -> &str;

    /// When the cards were observed, if the source knows.
    fn observed_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Country labels as the source prints them (code or English name).
    async fn countries(&self) -> Result<Vec<String>, SourceError>;

    async fn cards(&self, country: &str) -> Result<Vec<RawPricingCard>, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotCard {
    Fields(RawPricingCard),
    Block(String),
}

#[derive(Debug, Deserialize)]
struct SnapshotCountry {
    country: String,
    #[serde(default)]
    cards: Vec<SnapshotCard>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    provider: String,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
    countries: Vec<SnapshotCountry>,
}

/// Pricing cards loaded from a saved JSON snapshot
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    provider: String,
    observed_at: Option<DateTime<Utc>>,
    countries: Vec<(String, Vec<RawPricingCard>)>,
}

impl SnapshotSource {
    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;

        let mut countries: Vec<(String, Vec<RawPricingCard>)> =
            Vec::with_capacity(snapshot.countries.len());
        for entry in snapshot.countries {
            if countries
                .iter()
                .any(|(label, _)| label.trim().eq_ignore_ascii_case(entry.country.trim()))
            {
                return Err(SourceError::DuplicateCountry(entry.country));
            }
            let cards = entry
                .cards
                .into_iter()
                .map(|card| match card {
                    SnapshotCard::Fields(card) => Ok(card),
                    SnapshotCard::Block(block) => RawPricingCard::from_block(&block),
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| SourceError::Card {
                    country: entry.country.clone(),
                    source,
                })?;
            countries.push((entry.country, cards));
        }

        Ok(Self {
            provider: snapshot.provider,
            observed_at: snapshot.observed_at,
            countries,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&json)
    }
}

#[async_trait]
impl PricingSource for SnapshotSource {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    async fn countries(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.countries.iter().map(|(label, _)| label.clone()).collect())
    }

    async fn cards(&self, country: &str) -> Result<Vec<RawPricingCard>, SourceError> {
        self.countries
            .iter()
            .find(|(label, _)| label == country)
            .map(|(_, cards)| cards.clone())
            .ok_or_else(|| SourceError::UnknownCountry(country.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SNAPSHOT: &str = r#"{
        "provider": "Ionity",
        "observed_at": "2025-05-01T10:05:00Z",
        "countries": [
            { "country": "Germany", "cards": [
                "Passport Power\n€0.39/kWh\nplus €7.99 for the first month; then €11.99 per month.*",
                { "model_name": "Direct", "price_text": "€0.69/kWh",
                  "subscription_text": "Pay on-site without any monthly fees." }
            ] },
            { "country": "CH" }
        ]
    }"#;

    #[tokio::test]
    async fn test_snapshot_accepts_blocks_and_fields() {
        let source = SnapshotSource::from_json_str(SNAPSHOT).unwrap();
        assert_eq!(source.provider(), "Ionity");
        assert_eq!(
            source.observed_at(),
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 10, 5, 0).unwrap())
        );
        assert_eq!(source.countries().await.unwrap(), vec!["Germany", "CH"]);

        let cards = source.cards("Germany").await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].model_name, "Passport Power");
        assert_eq!(cards[1].price_text, "€0.69/kWh");

        assert!(source.cards("CH").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_country() {
        let source = SnapshotSource::from_json_str(SNAPSHOT).unwrap();
        assert!(matches!(
            source.cards("France").await,
            Err(SourceError::UnknownCountry(_))
        ));
    }

    #[test]
    fn test_malformed_block_names_country() {
        let json = r#"{ "provider": "Ionity", "countries": [
            { "country": "DE", "cards": ["Passport Power"] }
        ] }"#;
        match SnapshotSource::from_json_str(json) {
            Err(SourceError::Card { country, .. }) => assert_eq!(country, "DE"),
            other => panic!("expected card error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_country_is_rejected() {
        let json = r#"{ "provider": "Ionity", "countries": [
            { "country": "Germany", "cards": [] },
            { "country": "germany", "cards": [
                "Direct\n€0.69/kWh\nPay on-site without any monthly fees."
            ] }
        ] }"#;
        match SnapshotSource::from_json_str(json) {
            Err(SourceError::DuplicateCountry(country)) => assert_eq!(country, "germany"),
            other => panic!("expected duplicate country, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            SnapshotSource::from_json_str("{"),
            Err(SourceError::Json(_))
        ));
    }
}
