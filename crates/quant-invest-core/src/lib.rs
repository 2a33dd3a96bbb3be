pub mod error;
pub mod market_data;
pub mod types;

#[cfg(feature = "statistics")]
pub mod statistics;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "screening")]
pub mod screening;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::QuantInvestError;
pub use types::*;

/// Standard result type for all quant-invest operations
pub type QuantInvestResult<T> = Result<T, QuantInvestError>;
