//! Pricing history for charging-network tariffs.
//!
//! Each (country, provider, model) key owns a sequence of versioned records
//! whose validity windows never overlap. The `VersionManager` decides whether
//! an observation changes anything and writes the result through a
//! `PricingStore`.

pub mod countries;
pub mod extract;
pub mod memory;
pub mod models;
pub mod queries;
pub mod services;
pub mod store;
pub mod validity;

// Re-export commonly used items
pub use extract::{extract, ExtractError, ExtractedPricing, RawPricingCard};
pub use memory::MemoryPricingStore;
pub use models::{PricingCandidate, PricingKey, PricingRecord, RawMoney, RawPricing};
pub use services::{UpdateOutcome, VersionManager};
pub use store::{PgPricingStore, PricingStore};
