//! Text extraction for pricing cards.
//!
//! A card is three lines of page text: the model name, the per-kWh price
//! (`€0.39/kWh`, `0.39 €/kWh`, `0,69 CHF/kWh`) and the subscription sentence
//! (`plus €7.99 for the first month; then €11.99 per month.*` or
//! `... without any monthly fees.`). Currency symbols are mapped to ISO codes,
//! using the country where a symbol is ambiguous (`kr`).

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use super::models::{RawMoney, RawPricing};

lazy_static! {
    static ref AMOUNT_REGEX: Regex =
        Regex::new(r"([^\d\s]{1,4})?\s*(\d+(?:[.,]\d+)?)\s*([^\d\s]{1,4})?").unwrap();
    static ref SUBSCRIPTION_REGEX: Regex = Regex::new(
        r"plus\s+([^\d\s]{1,4})?\s*(\d+(?:[.,]\d+)?)\s*([^\d\s]{1,4})?\s+for the first month;\s*then\s+([^\d\s]{1,4})?\s*(\d+(?:[.,]\d+)?)\s*([^\d\s]{1,4})?\s+per month"
    )
    .unwrap();
}

const NO_FEE_MARKER: &str = "without any monthly fees";
const KWH_SUFFIX: &str = "/kWh";

/// Text could not be turned into pricing fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("Could not extract amount and currency from {0:?}")]
    Amount(String),

    #[error("Could not extract subscription price from {0:?}")]
    Subscription(String),

    #[error("Unrecognised currency {symbol:?} for {country}")]
    Currency { symbol: String, country: String },

    #[error("Pricing card is missing its {0}")]
    IncompleteCard(&'static str),
}

/// Raw text of one pricing card as scraped from the page
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawPricingCard {
    pub model_name: String,
    pub price_text: String,
    pub subscription_text: String,
}

impl RawPricingCard {
    /// Split a newline-separated card block into its three lines.
    pub fn from_block(block: &str) -> Result<Self, ExtractError> {
        let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
        let model_name = lines.next().ok_or(ExtractError::IncompleteCard("model name"))?;
        let price_text = lines.next().ok_or(ExtractError::IncompleteCard("price"))?;
        let subscription_text = lines
            .next()
            .ok_or(ExtractError::IncompleteCard("subscription terms"))?;
        Ok(Self {
            model_name: model_name.to_string(),
            price_text: price_text.to_string(),
            subscription_text: subscription_text.to_string(),
        })
    }
}

/// Structured fields of a card, ready to be validated into a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPricing {
    pub model_name: String,
    pub price_per_kwh: RawMoney,
    pub monthly_price: Option<RawMoney>,
    pub initial_price: Option<RawMoney>,
}

impl ExtractedPricing {
    /// Raw field values for `PricingCandidate::new`.
    pub fn into_raw(self, country: &str, provider: &str) -> RawPricing {
        RawPricing {
            country: country.to_string(),
            provider: provider.to_string(),
            model_name: self.model_name,
            currency: self.price_per_kwh.currency.clone(),
            price_per_kwh: Some(self.price_per_kwh),
            monthly_price: self.monthly_price,
            initial_price: self.initial_price,
            observed_at: None,
        }
    }
}

/// Map a printed currency symbol or code to its ISO 4217 code.
pub fn normalize_currency(symbol: &str, country: &str) -> Result<String, ExtractError> {
    let symbol = symbol.trim().trim_end_matches('.');
    let code = match symbol {
        "€" => "EUR",
        "£" => "GBP",
        "$" | "US$" => "USD",
        "C$" => "CAD",
        "SFR" | "SFr" | "Fr" | "CHF" => "CHF",
        "zł" => "PLN",
        "Kč" => "CZK",
        "Ft" => "HUF",
        "lei" => "RON",
        "лв" => "BGN",
        "DKR" => "DKK",
        "kr" | "Kr" => match country {
            "DK" => "DKK",
            "NO" => "NOK",
            "SE" => "SEK",
            "IS" => "ISK",
            _ => {
                return Err(ExtractError::Currency {
                    symbol: symbol.to_string(),
                    country: country.to_string(),
                })
            }
        },
        s if s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            return Ok(s.to_ascii_uppercase());
        }
        _ => {
            return Err(ExtractError::Currency {
                symbol: symbol.to_string(),
                country: country.to_string(),
            })
        }
    };
    Ok(code.to_string())
}

fn parse_amount(text: &str) -> Option<Decimal> {
    text.replace(',', ".").parse().ok()
}

fn money_from(
    prefix: Option<&str>,
    amount: &str,
    postfix: Option<&str>,
    country: &str,
    context: &str,
) -> Result<RawMoney, ExtractError> {
    let amount = parse_amount(amount).ok_or_else(|| ExtractError::Amount(context.to_string()))?;
    let symbol = prefix
        .or(postfix)
        .ok_or_else(|| ExtractError::Amount(context.to_string()))?;
    Ok(RawMoney::new(amount, normalize_currency(symbol, country)?))
}

/// Extract the amount and currency of a price such as `€0.39/kWh`.
pub fn extract_amount_currency(text: &str, country: &str) -> Result<RawMoney, ExtractError> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix(KWH_SUFFIX).unwrap_or(trimmed);
    let caps = AMOUNT_REGEX
        .captures(trimmed)
        .ok_or_else(|| ExtractError::Amount(text.to_string()))?;
    money_from(
        caps.get(1).map(|m| m.as_str()),
        &caps[2],
        caps.get(3).map(|m| m.as_str()),
        country,
        text,
    )
}

/// Extract `(monthly, initial)` subscription prices, or `None` when the plan
/// has no monthly fee.
pub fn extract_subscription(
    text: &str,
    country: &str,
) -> Result<Option<(RawMoney, RawMoney)>, ExtractError> {
    if text.contains(NO_FEE_MARKER) {
        return Ok(None);
    }
    let caps = SUBSCRIPTION_REGEX
        .captures(text)
        .ok_or_else(|| ExtractError::Subscription(text.to_string()))?;

    let initial = money_from(
        caps.get(1).map(|m| m.as_str()),
        &caps[2],
        caps.get(3).map(|m| m.as_str()),
        country,
        text,
    )?;
    // The monthly figure often repeats no symbol; fall back to the first one.
    let monthly_symbol = caps
        .get(4)
        .or_else(|| caps.get(6))
        .map(|m| m.as_str())
        .or_else(|| caps.get(1).or_else(|| caps.get(3)).map(|m| m.as_str()));
    let monthly = money_from(monthly_symbol, &caps[5], None, country, text)?;
    Ok(Some((monthly, initial)))
}

/// Turn a raw card into structured pricing fields for `country` (ISO code).
pub fn extract(card: &RawPricingCard, country: &str) -> Result<ExtractedPricing, ExtractError> {
    let model_name = card.model_name.trim();
    if model_name.is_empty() {
        return Err(ExtractError::IncompleteCard("model name"));
    }
    let price_per_kwh = extract_amount_currency(&card.price_text, country)?;
    let (monthly_price, initial_price) = match extract_subscription(&card.subscription_text, country)? {
        Some((monthly, initial)) => (Some(monthly), Some(initial)),
        None => (None, None),
    };
    Ok(ExtractedPricing {
        model_name: model_name.to_string(),
        price_per_kwh,
        monthly_price,
        initial_price,
    })
}
