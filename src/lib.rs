pub mod config;
pub mod error;
pub mod pricing;
pub mod retry;
pub mod source;
pub mod sync;

pub use error::{PricingError, Result};
