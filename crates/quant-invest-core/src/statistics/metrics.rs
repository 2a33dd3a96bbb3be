use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantInvestError;
use crate::market_data::PriceMatrix;
use crate::statistics::estimator::{mean, sample_covariance, sample_variance};
use crate::statistics::technical;
use crate::types::{with_metadata_f64, AnnualRate, AssetId, ComputationOutput, TRADING_DAYS_PER_YEAR};
use crate::QuantInvestResult;

// ---------------------------------------------------------------------------
// Series metrics
// ---------------------------------------------------------------------------

/// Standard deviations below this are treated as zero dispersion.
const MIN_VOLATILITY: f64 = 1e-12;

/// Sample standard deviation of returns, optionally annualized by sqrt(252).
///
/// Zero for fewer than two observations.
pub fn volatility(returns: &[f64], annualized: bool) -> f64 {
    let vol = sample_variance(returns, mean(returns)).max(0.0).sqrt();
    if annualized {
        vol * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        vol
    }
}

/// Annualized Sharpe ratio of a daily return series.
///
/// Returns 0.0 when the series has no dispersion.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: AnnualRate) -> f64 {
    let vol = volatility(returns, true);
    if vol < MIN_VOLATILITY || !vol.is_finite() {
        return 0.0;
    }
    let excess = mean(returns) * TRADING_DAYS_PER_YEAR - risk_free_rate;
    excess / vol
}

/// Beta of an asset against a market series.
///
/// Series are aligned by position and observations where either side is
/// missing are skipped. Fewer than two aligned observations, or a flat
/// market, give the neutral beta of 1.0.
pub fn beta(returns: &[Option<f64>], market_returns: &[Option<f64>]) -> QuantInvestResult<f64> {
    if returns.len() != market_returns.len() {
        return Err(QuantInvestError::invalid(
            "market_returns",
            format!(
                "Market series has {} observations, asset has {}",
                market_returns.len(),
                returns.len()
            ),
        ));
    }

    let (asset, market): (Vec<f64>, Vec<f64>) = returns
        .iter()
        .zip(market_returns.iter())
        .filter_map(|(a, m)| Some(((*a)?, (*m)?)))
        .unzip();

    if asset.len() < 2 {
        return Ok(1.0);
    }

    let asset_mean = mean(&asset);
    let market_mean = mean(&market);
    let market_var = sample_variance(&market, market_mean);
    if market_var < MIN_VOLATILITY * MIN_VOLATILITY {
        return Ok(1.0);
    }
    Ok(sample_covariance(&asset, &market, asset_mean, market_mean) / market_var)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn default_risk_free_rate() -> AnnualRate {
    0.02
}

fn default_sma_period() -> usize {
    200
}

fn default_rsi_period() -> usize {
    14
}

fn default_hurst_max_lag() -> usize {
    20
}

/// Input for single-asset return and indicator metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMetricsInput {
    pub prices: PriceMatrix,
    pub asset: AssetId,
    /// Optional benchmark column in the same matrix for beta.
    #[serde(default)]
    pub market: Option<AssetId>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: AnnualRate,
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_hurst_max_lag")]
    pub hurst_max_lag: usize,
}

/// Output of single-asset metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMetricsOutput {
    pub asset: AssetId,
    pub observations: usize,
    pub latest_price: Option<f64>,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub beta: Option<f64>,
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub hurst_exponent: Option<f64>,
}

/// Volatility, Sharpe, beta and trend indicators for one asset column.
pub fn calculate_return_metrics(
    input: &ReturnMetricsInput,
) -> QuantInvestResult<ComputationOutput<ReturnMetricsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let series = input.prices.series(&input.asset).ok_or_else(|| {
        QuantInvestError::invalid("asset", format!("'{}' not found in prices", input.asset))
    })?;
    if series.len() < 2 {
        return Err(QuantInvestError::InsufficientData(format!(
            "'{}' has {} prices, at least 2 required",
            input.asset,
            series.len()
        )));
    }

    let returns: Vec<f64> = series.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let annualized_return = mean(&returns) * TRADING_DAYS_PER_YEAR;
    let annualized_volatility = volatility(&returns, true);
    let sharpe = sharpe_ratio(&returns, input.risk_free_rate);

    let beta_value = match input.market {
        Some(ref market) => {
            let cleaned = input.prices.drop_empty_rows();
            let asset_col = column_returns(&cleaned, &input.asset)?;
            let market_col = column_returns(&cleaned, market)?;
            Some(beta(&asset_col, &market_col)?)
        }
        None => None,
    };

    let sma = technical::simple_moving_average(&series, input.sma_period)?
        .last()
        .copied()
        .flatten();
    if sma.is_none() {
        warnings.push(format!(
            "SMA({}) unavailable: only {} prices",
            input.sma_period,
            series.len()
        ));
    }
    let rsi = technical::relative_strength_index(&series, input.rsi_period)?
        .last()
        .copied()
        .flatten();
    let hurst_exponent = technical::hurst_exponent(&series, input.hurst_max_lag);
    if hurst_exponent.is_none() {
        warnings.push("Hurst exponent undefined for this series".into());
    }

    let output = ReturnMetricsOutput {
        asset: input.asset.clone(),
        observations: returns.len(),
        latest_price: series.last().copied(),
        annualized_return,
        annualized_volatility,
        sharpe_ratio: sharpe,
        beta: beta_value,
        sma,
        rsi,
        hurst_exponent,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Return metrics (annualized 252-day volatility, Sharpe, beta, SMA, RSI, Hurst)",
        &serde_json::json!({
            "risk_free_rate": input.risk_free_rate,
            "market": input.market,
            "sma_period": input.sma_period,
            "rsi_period": input.rsi_period,
            "hurst_max_lag": input.hurst_max_lag,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn column_returns(prices: &PriceMatrix, asset: &str) -> QuantInvestResult<Vec<Option<f64>>> {
    let col = prices.column(asset).ok_or_else(|| {
        QuantInvestError::invalid("market", format!("'{}' not found in prices", asset))
    })?;
    Ok(col
        .windows(2)
        .map(|w| match (w[0], w[1]) {
            (Some(p0), Some(p1)) => Some((p1 - p0) / p0),
            _ => None,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
