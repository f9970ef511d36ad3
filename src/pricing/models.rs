//! Pricing records and their validated building blocks.
//!
//! Every type here is valid by construction: the only way to obtain a
//! `PricingCandidate` is `PricingCandidate::new`, which enforces the
//! country/currency table, non-negative amounts and the currency cross-check.
//! `PricingRow` is the sqlx view of a stored version and is re-validated when
//! converted back into a `PricingRecord`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ValidationError;

use super::countries;
use super::validity::{self, floor_to_hour};

/// Opaque storage identifier. Never part of price comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::MissingField("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::MalformedCurrency(code.to_string()));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 3166-1 alpha-2 code of a country present in the country table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CountryCode(&'static str);

impl CountryCode {
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::MissingField("country"));
        }
        countries::by_code(code)
            .map(|c| Self(c.code))
            .ok_or_else(|| ValidationError::UnknownCountry(code.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn allows(&self, currency: &Currency) -> bool {
        countries::currency_allowed(self.0, currency.as_str())
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Non-negative amount in a given currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    fn validated(
        field: &'static str,
        raw: &RawMoney,
        expected: &Currency,
    ) -> Result<Self, ValidationError> {
        if raw.amount.is_sign_negative() && !raw.amount.is_zero() {
            return Err(ValidationError::NegativeAmount {
                field,
                amount: raw.amount,
            });
        }
        let currency = Currency::parse(&raw.currency)?;
        if &currency != expected {
            return Err(ValidationError::CurrencyMismatch {
                field,
                expected: expected.to_string(),
                found: currency.to_string(),
            });
        }
        Ok(Self {
            amount: raw.amount,
            currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Recurring-cost structure of a pricing plan. Absent means no such charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionTerms {
    pub monthly_price: Option<Money>,
    pub initial_price: Option<Money>,
}

impl SubscriptionTerms {
    pub fn is_free(&self) -> bool {
        self.monthly_price.is_none() && self.initial_price.is_none()
    }
}

/// Identity of a tariff: unique only together with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PricingKey {
    pub country: CountryCode,
    pub provider: String,
    pub model_name: String,
}

impl PricingKey {
    pub fn new(country: &str, provider: &str, model_name: &str) -> Result<Self, ValidationError> {
        let country = CountryCode::parse(country)?;
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(ValidationError::MissingField("provider"));
        }
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(ValidationError::MissingField("model_name"));
        }
        Ok(Self {
            country,
            provider: provider.to_string(),
            model_name: model_name.to_string(),
        })
    }
}

impl fmt::Display for PricingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.country, self.provider, self.model_name)
    }
}

/// The compared part of a record: a change here is a price change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingPayload {
    pub price_per_kwh: Money,
    pub subscription: SubscriptionTerms,
    pub currency: Currency,
}

/// Amount plus currency code as produced by extraction, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMoney {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency: String,
}

impl RawMoney {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

/// Unvalidated field values for one observation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPricing {
    pub country: String,
    pub provider: String,
    pub model_name: String,
    pub currency: String,
    pub price_per_kwh: Option<RawMoney>,
    #[serde(default)]
    pub monthly_price: Option<RawMoney>,
    #[serde(default)]
    pub initial_price: Option<RawMoney>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// A validated observation waiting to be compared against storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingCandidate {
    key: PricingKey,
    payload: PricingPayload,
    observed_at: Option<DateTime<Utc>>,
}

impl PricingCandidate {
    /// Validate raw field values into a candidate.
    pub fn new(raw: RawPricing) -> Result<Self, ValidationError> {
        let key = PricingKey::new(&raw.country, &raw.provider, &raw.model_name)?;
        let currency = Currency::parse(&raw.currency)?;
        if !key.country.allows(&currency) {
            return Err(ValidationError::CurrencyNotAllowed {
                country: key.country.to_string(),
                currency: currency.to_string(),
            });
        }

        let price = raw
            .price_per_kwh
            .as_ref()
            .ok_or(ValidationError::MissingField("price_per_kwh"))?;
        let price_per_kwh = Money::validated("price_per_kwh", price, &currency)?;

        let monthly_price = raw
            .monthly_price
            .as_ref()
            .map(|m| Money::validated("monthly_price", m, &currency))
            .transpose()?;
        let initial_price = raw
            .initial_price
            .as_ref()
            .map(|m| Money::validated("initial_price", m, &currency))
            .transpose()?;

        Ok(Self {
            key,
            payload: PricingPayload {
                price_per_kwh,
                subscription: SubscriptionTerms {
                    monthly_price,
                    initial_price,
                },
                currency,
            },
            observed_at: raw.observed_at.map(floor_to_hour),
        })
    }

    pub fn key(&self) -> &PricingKey {
        &self.key
    }

    pub fn payload(&self) -> &PricingPayload {
        &self.payload
    }

    /// Observation instant, already floored to the hour.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(floor_to_hour(observed_at));
        self
    }

    /// Payload equality only: identity and time are ignored.
    pub fn same_price(&self, other: &PricingPayload) -> bool {
        self.payload == *other
    }
}

/// One stored version of a tariff.
#[derive(Debug, Clone, Serialize)]
pub struct PricingRecord {
    id: RecordId,
    key: PricingKey,
    payload: PricingPayload,
    version: i32,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
}

impl PricingRecord {
    pub fn new(
        id: RecordId,
        key: PricingKey,
        payload: PricingPayload,
        version: i32,
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            key,
            payload,
            version,
            valid_from,
            valid_to,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn key(&self) -> &PricingKey {
        &self.key
    }

    pub fn payload(&self) -> &PricingPayload {
        &self.payload
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.valid_to
    }

    /// Open-ended records are the active version of their key.
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Check if this version was in force at the given time
    pub fn is_valid_at(&self, check_time: DateTime<Utc>) -> bool {
        validity::contains(self.valid_from, self.valid_to, check_time)
    }

    pub fn same_price(&self, candidate: &PricingCandidate) -> bool {
        candidate.same_price(&self.payload)
    }

    /// Copy of this record with its window closed at `at`.
    pub fn closed_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            valid_to: Some(at),
            ..self.clone()
        }
    }
}

/// Stored version as it comes back from the `pricing` table
#[derive(Debug, Clone, FromRow)]
pub struct PricingRow {
    pub id: Uuid,
    pub country: String,
    pub provider: String,
    pub pricing_model_name: String,
    pub currency: String,
    pub price_per_kwh: Decimal,
    pub monthly_price: Option<Decimal>,
    pub initial_price: Option<Decimal>,
    pub version: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl TryFrom<PricingRow> for PricingRecord {
    type Error = ValidationError;

    fn try_from(row: PricingRow) -> Result<Self, Self::Error> {
        let money = |amount: Decimal| RawMoney::new(amount, row.currency.clone());
        let candidate = PricingCandidate::new(RawPricing {
            country: row.country.clone(),
            provider: row.provider.clone(),
            model_name: row.pricing_model_name.clone(),
            currency: row.currency.clone(),
            price_per_kwh: Some(money(row.price_per_kwh)),
            monthly_price: row.monthly_price.map(money),
            initial_price: row.initial_price.map(money),
            observed_at: None,
        })?;
        Ok(PricingRecord::new(
            row.id.into(),
            candidate.key,
            candidate.payload,
            row.version,
            row.valid_from,
            row.valid_to,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn raw(country: &str, currency: &str, price: Decimal) -> RawPricing {
        RawPricing {
            country: country.to_string(),
            provider: "Ionity".to_string(),
            model_name: "Passport Power".to_string(),
            currency: currency.to_string(),
            price_per_kwh: Some(RawMoney::new(price, currency)),
            ..Default::default()
        }
    }

    // ==================== construction ====================

    #[test]
    fn test_all_allowed_pairs_construct() {
        for country in countries::COUNTRIES {
            for currency in country.currencies {
                let result = PricingCandidate::new(raw(country.code, currency, dec!(0.35)));
                assert!(result.is_ok(), "{} {}: {:?}", country.code, currency, result);
            }
        }
    }

    #[test]
    fn test_disallowed_pairs_fail() {
        let all_currencies: Vec<&str> = countries::COUNTRIES
            .iter()
            .flat_map(|c| c.currencies.iter().copied())
            .collect();
        for country in countries::COUNTRIES {
            for currency in &all_currencies {
                if country.currencies.contains(currency) {
                    continue;
                }
                let err = PricingCandidate::new(raw(country.code, currency, dec!(1))).unwrap_err();
                assert!(
                    matches!(err, ValidationError::CurrencyNotAllowed { .. }),
                    "{} {}: {:?}",
                    country.code,
                    currency,
                    err
                );
            }
        }
    }

    #[test]
    fn test_fr_usd_fails_regardless_of_price() {
        for price in [dec!(0), dec!(0.39), dec!(1000)] {
            let err = PricingCandidate::new(raw("FR", "USD", price)).unwrap_err();
            assert_eq!(
                err,
                ValidationError::CurrencyNotAllowed {
                    country: "FR".to_string(),
                    currency: "USD".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_negative_price_fails() {
        let err = PricingCandidate::new(raw("DE", "EUR", dec!(-0.01))).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NegativeAmount { field: "price_per_kwh", .. }
        ));
    }

    #[test]
    fn test_zero_price_is_allowed() {
        assert!(PricingCandidate::new(raw("DE", "EUR", dec!(0))).is_ok());
        assert!(PricingCandidate::new(raw("DE", "EUR", dec!(-0))).is_ok());
    }

    #[test]
    fn test_malformed_currency_fails() {
        for code in ["€", "eur", "EURO", "E1R"] {
            let err = PricingCandidate::new(raw("DE", code, dec!(1))).unwrap_err();
            assert_eq!(err, ValidationError::MalformedCurrency(code.to_string()));
        }
    }

    #[test]
    fn test_missing_identity_fields_fail() {
        let mut r = raw("DE", "EUR", dec!(1));
        r.provider = "  ".to_string();
        assert_eq!(
            PricingCandidate::new(r).unwrap_err(),
            ValidationError::MissingField("provider")
        );

        let mut r = raw("DE", "EUR", dec!(1));
        r.model_name = String::new();
        assert_eq!(
            PricingCandidate::new(r).unwrap_err(),
            ValidationError::MissingField("model_name")
        );

        let r = raw("", "EUR", dec!(1));
        assert_eq!(
            PricingCandidate::new(r).unwrap_err(),
            ValidationError::MissingField("country")
        );

        let r = raw("ZZ", "EUR", dec!(1));
        assert_eq!(
            PricingCandidate::new(r).unwrap_err(),
            ValidationError::UnknownCountry("ZZ".to_string())
        );
    }

    #[test]
    fn test_missing_price_fails() {
        let mut r = raw("DE", "EUR", dec!(1));
        r.price_per_kwh = None;
        assert_eq!(
            PricingCandidate::new(r).unwrap_err(),
            ValidationError::MissingField("price_per_kwh")
        );
    }

    #[test]
    fn test_currency_cross_check() {
        let mut r = raw("HU", "EUR", dec!(0.5));
        r.price_per_kwh = Some(RawMoney::new(dec!(180), "HUF"));
        let err = PricingCandidate::new(r).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::CurrencyMismatch { field: "price_per_kwh", .. }
        ));

        let mut r = raw("DE", "EUR", dec!(0.39));
        r.monthly_price = Some(RawMoney::new(dec!(11.99), "GBP"));
        let err = PricingCandidate::new(r).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::CurrencyMismatch { field: "monthly_price", .. }
        ));
    }

    #[test]
    fn test_identity_is_trimmed_and_country_uppercased() {
        let mut r = raw("de", "EUR", dec!(0.39));
        r.model_name = " Passport Power ".to_string();
        let candidate = PricingCandidate::new(r).unwrap();
        assert_eq!(candidate.key().country.as_str(), "DE");
        assert_eq!(candidate.key().model_name, "Passport Power");
        assert_eq!(candidate.key().to_string(), "DE/Ionity/Passport Power");
    }

    #[test]
    fn test_observed_at_is_floored() {
        let mut r = raw("DE", "EUR", dec!(0.39));
        r.observed_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 47, 12).unwrap());
        let candidate = PricingCandidate::new(r).unwrap();
        assert_eq!(
            candidate.observed_at(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap())
        );
    }

    // ==================== payload equality ====================

    #[test]
    fn test_same_price_ignores_identity_and_time() {
        let a = PricingCandidate::new(raw("DE", "EUR", dec!(0.39))).unwrap();
        let mut other = raw("AT", "EUR", dec!(0.390));
        other.model_name = "Passport Motion".to_string();
        other.observed_at = Some(Utc::now());
        let b = PricingCandidate::new(other).unwrap();
        assert!(a.same_price(b.payload()));
    }

    #[test]
    fn test_absent_subscription_differs_from_zero() {
        let a = PricingCandidate::new(raw("DE", "EUR", dec!(0.39))).unwrap();
        let mut r = raw("DE", "EUR", dec!(0.39));
        r.monthly_price = Some(RawMoney::new(dec!(0), "EUR"));
        let b = PricingCandidate::new(r).unwrap();
        assert!(!a.same_price(b.payload()));
        assert!(a.payload().subscription.is_free());
        assert!(!b.payload().subscription.is_free());
    }

    #[test]
    fn test_initial_price_change_is_a_price_change() {
        let mut r = raw("DE", "EUR", dec!(0.39));
        r.monthly_price = Some(RawMoney::new(dec!(11.99), "EUR"));
        r.initial_price = Some(RawMoney::new(dec!(7.99), "EUR"));
        let a = PricingCandidate::new(r.clone()).unwrap();
        r.initial_price = None;
        let b = PricingCandidate::new(r).unwrap();
        assert!(!a.same_price(b.payload()));
    }

    // ==================== stored rows ====================

    #[test]
    fn test_row_roundtrip_revalidates() {
        let row = PricingRow {
            id: Uuid::new_v4(),
            country: "GB".to_string(),
            provider: "Ionity".to_string(),
            pricing_model_name: "Passport Motion".to_string(),
            currency: "GBP".to_string(),
            price_per_kwh: dec!(0.59),
            monthly_price: Some(dec!(5.49)),
            initial_price: None,
            version: 3,
            valid_from: Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap(),
            valid_to: None,
        };
        let record = PricingRecord::try_from(row.clone()).unwrap();
        assert_eq!(record.id().as_uuid(), row.id);
        assert_eq!(record.version(), 3);
        assert!(record.is_current());
        assert_eq!(
            record.payload().subscription.monthly_price.as_ref().map(|m| m.amount),
            Some(dec!(5.49))
        );

        let bad = PricingRow {
            currency: "EUR".to_string(),
            ..row
        };
        assert!(PricingRecord::try_from(bad).is_err());
    }

    #[test]
    fn test_is_valid_at_and_closed_at() {
        let c = PricingCandidate::new(raw("DE", "EUR", dec!(0.39))).unwrap();
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let record = PricingRecord::new(
            RecordId::new(),
            c.key().clone(),
            c.payload().clone(),
            1,
            from,
            None,
        );
        assert!(record.is_valid_at(from));
        let to = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let closed = record.closed_at(to);
        assert!(!closed.is_current());
        assert!(!closed.is_valid_at(to));
        assert_eq!(closed.id(), record.id());
        assert!(closed.same_price(&c));
    }
}
