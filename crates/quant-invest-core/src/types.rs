use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fundamental ratios and thresholds. Decimal keeps screening free of f64 noise.
pub type Ratio = Decimal;

/// Composite quality score used for ranking.
pub type Score = Decimal;

/// Annualized rates expressed as decimals (0.02 = 2%).
pub type AnnualRate = f64;

/// Asset identifier (ticker symbol).
pub type AssetId = String;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap Decimal computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(methodology, assumptions, warnings, elapsed_us, result, "rust_decimal_128bit")
}

/// Helper to wrap floating-point computation results with metadata
pub fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(methodology, assumptions, warnings, elapsed_us, result, "ieee754_f64")
}

fn envelope<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
    precision: &str,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_precision_tags() {
        let dec_out = with_metadata("m", &serde_json::json!({}), vec![], 1, 1u8);
        let f64_out = with_metadata_f64("m", &serde_json::json!({}), vec![], 1, 1u8);
        assert_eq!(dec_out.metadata.precision, "rust_decimal_128bit");
        assert_eq!(f64_out.metadata.precision, "ieee754_f64");
        assert_eq!(f64_out.metadata.version, env!("CARGO_PKG_VERSION"));
    }
}
