//! Countries served by the charging network and the currencies their
//! tariffs may legally be quoted in.

/// A row of the country table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryInfo {
    /// ISO 3166-1 alpha-2 code
    pub code: &'static str,
    /// Name as printed on the operator's country selector
    pub name: &'static str,
    /// ISO 4217 codes accepted for this country
    pub currencies: &'static [&'static str],
}

const EUR: &[&str] = &["EUR"];

pub const COUNTRIES: &[CountryInfo] = &[
    CountryInfo { code: "AT", name: "Austria", currencies: EUR },
    CountryInfo { code: "BE", name: "Belgium", currencies: EUR },
    CountryInfo { code: "BG", name: "Bulgaria", currencies: &["EUR", "BGN"] },
    CountryInfo { code: "CA", name: "Canada", currencies: &["CAD", "USD"] },
    CountryInfo { code: "CH", name: "Switzerland", currencies: &["CHF"] },
    CountryInfo { code: "CY", name: "Cyprus", currencies: EUR },
    CountryInfo { code: "CZ", name: "Czech Republic", currencies: &["CZK"] },
    CountryInfo { code: "DE", name: "Germany", currencies: EUR },
    CountryInfo { code: "DK", name: "Denmark", currencies: &["DKK"] },
    CountryInfo { code: "EE", name: "Estonia", currencies: EUR },
    CountryInfo { code: "ES", name: "Spain", currencies: EUR },
    CountryInfo { code: "FI", name: "Finland", currencies: EUR },
    CountryInfo { code: "FR", name: "France", currencies: EUR },
    CountryInfo { code: "GB", name: "United Kingdom", currencies: &["GBP"] },
    CountryInfo { code: "GR", name: "Greece", currencies: EUR },
    CountryInfo { code: "HR", name: "Croatia", currencies: &["EUR", "HRK"] },
    CountryInfo { code: "HU", name: "Hungary", currencies: &["EUR", "HUF"] },
    CountryInfo { code: "IE", name: "Ireland", currencies: EUR },
    CountryInfo { code: "IS", name: "Iceland", currencies: &["ISK"] },
    CountryInfo { code: "IT", name: "Italy", currencies: EUR },
    CountryInfo { code: "LT", name: "Lithuania", currencies: EUR },
    CountryInfo { code: "LU", name: "Luxembourg", currencies: EUR },
    CountryInfo { code: "LV", name: "Latvia", currencies: EUR },
    CountryInfo { code: "MT", name: "Malta", currencies: EUR },
    CountryInfo { code: "NL", name: "Netherlands", currencies: EUR },
    CountryInfo { code: "NO", name: "Norway", currencies: &["NOK"] },
    CountryInfo { code: "PL", name: "Poland", currencies: &["PLN"] },
    CountryInfo { code: "PT", name: "Portugal", currencies: EUR },
    CountryInfo { code: "RO", name: "Romania", currencies: &["RON"] },
    CountryInfo { code: "SE", name: "Sweden", currencies: &["SEK"] },
    CountryInfo { code: "SI", name: "Slovenia", currencies: EUR },
    CountryInfo { code: "SK", name: "Slovakia", currencies: EUR },
    CountryInfo { code: "US", name: "United States", currencies: &["USD"] },
];

/// Look up a country by its alpha-2 code (case-insensitive).
pub fn by_code(code: &str) -> Option<&'static CountryInfo> {
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// Look up a country by the display name used on the operator's site.
pub fn by_name(name: &str) -> Option<&'static CountryInfo> {
    let name = name.trim();
    COUNTRIES.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Resolve either a code or a display name to the alpha-2 code.
pub fn resolve(label: &str) -> Option<&'static str> {
    by_code(label.trim()).or_else(|| by_name(label)).map(|c| c.code)
}

/// Whether `currency` is allowed for `country` (both as ISO codes).
pub fn currency_allowed(country: &str, currency: &str) -> bool {
    by_code(country).is_some_and(|c| c.currencies.contains(&currency))
}
