//! Screen, select, optimize.
//!
//! Runs the fundamental screen over a candidate universe, restricts the price
//! history to the survivors that actually have prices, checks that enough
//! history remains and solves for the max-Sharpe allocation.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::QuantInvestError;
use crate::market_data::PriceMatrix;
use crate::optimization::optimizer::{PortfolioOptimizer, SharpeOptimizationOutput};
use crate::optimization::slsqp::SolverSettings;
use crate::screening::screener::{
    screen_universe, FundamentalMetrics, ScreeningInput, ScreeningOutput, ScreeningThresholds,
};
use crate::statistics::estimator::MissingPricePolicy;
use crate::types::{with_metadata_f64, AnnualRate, AssetId, ComputationOutput};
use crate::QuantInvestResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: ScreeningThresholds,
    pub top_n: usize,
    pub risk_free_rate: AnnualRate,
    /// Minimum number of price rows required before optimizing.
    pub min_observations: usize,
    pub solver: SolverSettings,
    pub missing_price_policy: MissingPricePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            thresholds: ScreeningThresholds::default(),
            top_n: 15,
            risk_free_rate: 0.02,
            min_observations: 30,
            solver: SolverSettings::default(),
            missing_price_policy: MissingPricePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> QuantInvestResult<()> {
        self.thresholds.validate()?;
        self.solver.validate()?;
        if self.top_n == 0 {
            return Err(QuantInvestError::invalid("top_n", "Must be at least 1"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(QuantInvestError::invalid(
                "risk_free_rate",
                "Must be a finite number",
            ));
        }
        if self.min_observations < 2 {
            return Err(QuantInvestError::invalid(
                "min_observations",
                "At least 2 price rows are needed for one return",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub candidates: Vec<FundamentalMetrics>,
    pub prices: PriceMatrix,
    #[serde(default)]
    pub config: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub screening: ScreeningOutput,
    /// Screened tickers with no price column, or an empty one.
    pub missing_prices: Vec<AssetId>,
    /// Columns passed to the optimizer, in ranking order.
    pub optimized_assets: Vec<AssetId>,
    pub price_rows: usize,
    /// `None` when nothing survived screening.
    pub allocation: Option<SharpeOptimizationOutput>,
}

/// Screen the universe and optimize the survivors.
///
/// Returns an empty allocation without optimizing when no candidate passes
/// the screen. Fails with `InsufficientData` when none of the survivors has
/// prices or fewer than `min_observations` price rows remain.
pub fn run_pipeline(input: &PipelineInput) -> QuantInvestResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();
    let config = &input.config;
    config.validate()?;

    let screened = screen_universe(&ScreeningInput {
        candidates: input.candidates.clone(),
        thresholds: config.thresholds,
        top_n: config.top_n,
    })?;
    let mut warnings = screened.warnings;
    let screening = screened.result;
    let tickers = screening.tickers();

    if tickers.is_empty() {
        info!(screened = screening.candidates_screened, "no candidate passed screening");
        let output = PipelineOutput {
            screening,
            missing_prices: Vec::new(),
            optimized_assets: Vec::new(),
            price_rows: 0,
            allocation: None,
        };
        return Ok(finish(start, config, warnings, output));
    }

    let selection = input.prices.select(&tickers)?;
    let (prices, empty) = selection.matrix.drop_empty_columns()?;
    let prices = prices.drop_empty_rows();
    let mut missing_prices = selection.missing;
    missing_prices.extend(empty);
    if !missing_prices.is_empty() {
        warn!(missing = ?missing_prices, "screened tickers without price history");
        warnings.push(format!(
            "No price history for: {}",
            missing_prices.join(", ")
        ));
    }

    if prices.n_rows() < config.min_observations {
        return Err(QuantInvestError::InsufficientData(format!(
            "{} price rows for the screened assets, at least {} required",
            prices.n_rows(),
            config.min_observations
        )));
    }

    let mut optimizer = PortfolioOptimizer::with_settings(config.solver, config.missing_price_policy)?;
    optimizer.set_prices(&prices);
    let outcome = optimizer.optimize(config.risk_free_rate)?;
    let observations = optimizer.estimates().map(|e| e.observations).unwrap_or(0);
    let allocation = SharpeOptimizationOutput::from_outcome(&outcome, observations, &mut warnings);

    info!(
        ranked = tickers.len(),
        optimized = prices.n_assets(),
        status = ?allocation.status,
        "pipeline finished"
    );

    let output = PipelineOutput {
        screening,
        missing_prices,
        optimized_assets: prices.assets().to_vec(),
        price_rows: prices.n_rows(),
        allocation: Some(allocation),
    };
    Ok(finish(start, config, warnings, output))
}

fn finish(
    start: Instant,
    config: &PipelineConfig,
    warnings: Vec<String>,
    output: PipelineOutput,
) -> ComputationOutput<PipelineOutput> {
    let elapsed = start.elapsed().as_micros() as u64;
    with_metadata_f64(
        "Fundamental screen followed by max-Sharpe optimization of the survivors",
        &serde_json::json!({
            "top_n": config.top_n,
            "risk_free_rate": config.risk_free_rate,
            "min_observations": config.min_observations,
            "max_iterations": config.solver.max_iterations,
            "ftol": config.solver.ftol,
            "missing_price_policy": config.missing_price_policy,
        }),
        warnings,
        elapsed,
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::optimizer::OptimizationStatus;
    use rust_decimal_macros::dec;

    fn candidate(ticker: &str, debt_to_equity: rust_decimal::Decimal) -> FundamentalMetrics {
        FundamentalMetrics {
            ticker: ticker.into(),
            roe: Some(dec!(0.20)),
            debt_to_equity: Some(debt_to_equity),
            profit_margin: Some(dec!(0.15)),
            operating_margin: None,
            peg: Some(dec!(1.2)),
        }
    }

    fn prices(assets: &[&str], rows: usize) -> PriceMatrix {
        let data = (0..rows)
            .map(|t| {
                (0..assets.len())
                    .map(|c| Some(100.0 + ((t * (c + 2)) % 7) as f64 + t as f64 * 0.1 * (c + 1) as f64))
                    .collect()
            })
            .collect();
        PriceMatrix::new(assets.iter().map(|s| s.to_string()).collect(), None, data).unwrap()
    }

    #[test]
    fn test_pipeline_optimizes_survivors() {
        let input = PipelineInput {
            candidates: vec![
                candidate("AAA", dec!(0.3)),
                candidate("LEV", dec!(4.0)),
                candidate("BBB", dec!(0.6)),
                candidate("NOPX", dec!(0.2)),
            ],
            prices: prices(&["AAA", "BBB", "LEV"], 60),
            config: PipelineConfig::default(),
        };
        let out = run_pipeline(&input).unwrap();
        let result = &out.result;
        assert_eq!(result.missing_prices, vec!["NOPX".to_string()]);
        assert_eq!(result.optimized_assets, vec!["AAA".to_string(), "BBB".to_string()]);
        let allocation = result.allocation.as_ref().unwrap();
        assert_ne!(allocation.status, OptimizationStatus::NoRecommendation);
        let total: f64 = allocation.weights.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(out.warnings.iter().any(|w| w.contains("NOPX")));
    }

    #[test]
    fn test_nothing_passes_screen() {
        let input = PipelineInput {
            candidates: vec![candidate("LEV", dec!(4.0))],
            prices: prices(&["LEV"], 60),
            config: PipelineConfig::default(),
        };
        let out = run_pipeline(&input).unwrap();
        assert!(out.result.screening.ranked.is_empty());
        assert!(out.result.allocation.is_none());
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let input = PipelineInput {
            candidates: vec![candidate("AAA", dec!(0.3)), candidate("BBB", dec!(0.3))],
            prices: prices(&["AAA", "BBB"], 20),
            config: PipelineConfig::default(),
        };
        assert!(matches!(
            run_pipeline(&input),
            Err(QuantInvestError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let input = PipelineInput {
            candidates: vec![],
            prices: prices(&["AAA"], 5),
            config: PipelineConfig {
                min_observations: 1,
                ..PipelineConfig::default()
            },
        };
        assert!(matches!(
            run_pipeline(&input),
            Err(QuantInvestError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"top_n": 5, "solver": {"max_iterations": 100}}"#).unwrap();
        assert_eq!(config.top_n, 5);
        assert_eq!(config.solver.max_iterations, 100);
        assert_eq!(config.solver.ftol, 1e-9);
        assert_eq!(config.min_observations, 30);
    }
}
